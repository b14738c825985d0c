//! Last-known-good value per source.
//!
//! Backed by a [`DashMap`] so writers for different sources land on
//! different shards and rarely contend.  Values are reference-counted, so a
//! read only holds a shard lock long enough to clone an [`Arc`](std::sync::Arc) and a write
//! only long enough to swap one in.  Readers therefore see either the previous
//! committed value or the new one, never a partially built value.
//!
//! Only [`Cache::get`] and [`Cache::set`] are exposed; there is
//! no iteration over live entries.

use dashmap::DashMap;

use crate::source::RawValue;

#[derive(Default)]
pub struct Cache {
    entries: DashMap<String, RawValue>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last successfully fetched value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<RawValue> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Replace the value for `name`.  Last write wins.
    pub fn set(&self, name: &str, value: RawValue) {
        self.entries.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn read_u32(cache: &Cache, name: &str) -> Option<u32> {
        cache.get(name).and_then(|v| v.downcast_ref::<u32>().copied())
    }

    #[test]
    fn missing_key_is_absent() {
        let cache = Cache::new();
        assert!(cache.get("weather").is_none());
    }

    #[test]
    fn last_write_wins() {
        let cache = Cache::new();
        cache.set("weather", Arc::new(1u32));
        cache.set("weather", Arc::new(2u32));
        assert_eq!(read_u32(&cache, "weather"), Some(2));
    }

    #[test]
    fn keys_are_independent() {
        let cache = Cache::new();
        cache.set("a", Arc::new(1u32));
        cache.set("b", Arc::new(2u32));
        cache.set("a", Arc::new(3u32));
        assert_eq!(read_u32(&cache, "b"), Some(2));
    }

    #[test]
    fn reader_keeps_old_value_after_overwrite() {
        let cache = Cache::new();
        cache.set("a", Arc::new(1u32));
        let held = cache.get("a").unwrap();
        cache.set("a", Arc::new(2u32));
        assert_eq!(held.downcast_ref::<u32>(), Some(&1));
        assert_eq!(read_u32(&cache, "a"), Some(2));
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        // Each committed value is a pair of equal numbers; a torn write would
        // show up as a mismatched pair.
        let cache = Arc::new(Cache::new());
        cache.set("pair", Arc::new((0u64, 0u64)));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last_seen = 0;
                    while !done.load(Ordering::Relaxed) {
                        let value = cache.get("pair").expect("value present");
                        let &(a, b) = value.downcast_ref::<(u64, u64)>().expect("pair type");
                        assert_eq!(a, b, "torn read");
                        assert!(a >= last_seen, "went backwards");
                        last_seen = a;
                    }
                })
            })
            .collect();

        for i in 1..=5_000u64 {
            cache.set("pair", Arc::new((i, i)));
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
