//! Background refresh scheduling.
//!
//! Every source gets its own worker thread, so a slow or failing upstream
//! only ever delays itself.  Each worker:
//!
//! 1. fetches once immediately (cold start) and reports back over an
//!    [`mpsc`] channel,
//! 2. then loops forever: sleep in coarse ticks until the source's
//!    [`Cadence`](crate::cadence::Cadence) says it is due, fetch, repeat.
//!
//! A successful fetch replaces the source's cache entry; a failed one is
//! logged and leaves the previous entry alone.  No lock is held while a fetch
//! is in flight, and one worker never runs two fetches at once.
//!
//! ## For contributors
//!
//! Fetches are blocking I/O.  Per-fetch time limits come from the HTTP client
//! each source is built with (see `source::registry`), not from the
//! scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::source::Feed;

/// Handle to the running refresh workers.
pub struct Scheduler {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Ask every worker to exit at its next tick and wait for them.
    ///
    /// A worker in the middle of a fetch finishes that fetch first.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("refresh worker panicked");
            }
        }
    }
}

/// Spawn one refresh worker per source.
///
/// Returns once every source has attempted its first fetch, so the cache is
/// as full as it is going to get before anyone reads it.
pub fn spawn(
    sources: &[Arc<dyn Feed>],
    cache: Arc<Cache>,
    tick: Duration,
) -> std::io::Result<Scheduler> {
    let stop = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::channel();

    let mut workers = Vec::with_capacity(sources.len());
    for src in sources {
        let src = Arc::clone(src);
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        let ready = ready_tx.clone();

        let handle = thread::Builder::new()
            .name(format!("refresh-{}", src.name()))
            .spawn(move || run(src, cache, stop, tick, ready))?;
        workers.push(handle);
    }
    drop(ready_tx);

    let mut fetched = 0;
    let mut failed = 0;
    for _ in 0..sources.len() {
        match ready_rx.recv() {
            Ok(true) => fetched += 1,
            Ok(false) => failed += 1,
            // Every sender is gone: a worker died before reporting.
            Err(_) => break,
        }
    }
    info!(fetched, failed, "initial fetch complete");

    Ok(Scheduler { stop, workers })
}

/// Fetch one source and commit the result.  Returns whether it succeeded.
pub fn refresh(src: &dyn Feed, cache: &Cache) -> bool {
    info!(source = src.name(), "Updating");
    match src.fetch() {
        Ok(raw) => {
            cache.set(src.name(), raw);
            true
        }
        Err(e) => {
            error!(source = src.name(), error = %e, "Failed to update");
            false
        }
    }
}

fn run(
    src: Arc<dyn Feed>,
    cache: Arc<Cache>,
    stop: Arc<AtomicBool>,
    tick: Duration,
    ready: mpsc::Sender<bool>,
) {
    let cadence = src.cadence();
    let mut last_fire = Local::now();

    let ok = refresh(src.as_ref(), &cache);
    // The receiver is gone once `spawn` has returned; nothing to do then.
    let _ = ready.send(ok);
    drop(ready);

    loop {
        let now = Local::now();
        let mut next = cadence.next_after(&last_fire);
        if next <= now {
            // Fell behind (slow fetch, clock jump): skip missed firings.
            next = cadence.next_after(&now);
        }
        debug!(source = src.name(), next = %next, "next refresh");

        if !sleep_until(next, tick, &stop) {
            debug!(source = src.name(), "refresh worker stopping");
            return;
        }
        last_fire = next;
        refresh(src.as_ref(), &cache);
    }
}

/// Sleep until `when` in steps of at most `tick`.  Returns `false` if asked
/// to stop first.
fn sleep_until(when: DateTime<Local>, tick: Duration, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        match (when - Local::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => thread::sleep(remaining.min(tick)),
            _ => return true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use crate::cadence::Cadence;
    use crate::error::FetchError;
    use crate::source::DataSource;

    const TICK: Duration = Duration::from_millis(5);

    /// Counts its calls; fetch `n` returns `Ok(n)` until `fail_after`.
    struct Scripted {
        name: &'static str,
        interval: Duration,
        delay: Duration,
        fail_after: Option<usize>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl Scripted {
        fn new(name: &'static str, interval: Duration) -> Self {
            Self {
                name,
                interval,
                delay: Duration::ZERO,
                fail_after: None,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                overlapped: AtomicBool::new(false),
            }
        }

        fn failing_after(mut self, successes: usize) -> Self {
            self.fail_after = Some(successes);
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataSource for Scripted {
        type Raw = usize;
        type View = usize;

        fn name(&self) -> &str {
            self.name
        }

        fn cadence(&self) -> Cadence {
            Cadence::Every(self.interval)
        }

        fn fetch(&self) -> Result<usize, FetchError> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.fail_after {
                Some(limit) if n > limit => Err(FetchError::Empty(format!("call {n}"))),
                _ => Ok(n),
            }
        }

        fn format(&self, raw: &usize, _now: DateTime<Local>) -> usize {
            *raw
        }
    }

    fn cached(cache: &Cache, name: &str) -> Option<usize> {
        cache
            .get(name)
            .and_then(|v| v.downcast_ref::<usize>().copied())
    }

    #[test]
    fn cold_start_fills_cache_before_returning() {
        let a = Arc::new(Scripted::new("a", Duration::from_secs(3600)));
        let b = Arc::new(Scripted::new("b", Duration::from_secs(3600)).failing_after(0));
        let feeds: Vec<Arc<dyn Feed>> = vec![a.clone(), b.clone()];
        let cache = Arc::new(Cache::new());

        let scheduler = spawn(&feeds, Arc::clone(&cache), TICK).unwrap();

        assert_eq!(cached(&cache, "a"), Some(1));
        assert_eq!(cached(&cache, "b"), None);
        assert_eq!(b.calls(), 1);
        scheduler.shutdown();
    }

    #[test]
    fn failures_keep_last_good_value() {
        let a = Arc::new(Scripted::new("a", Duration::from_millis(20)).failing_after(1));
        let feeds: Vec<Arc<dyn Feed>> = vec![a.clone()];
        let cache = Arc::new(Cache::new());

        let scheduler = spawn(&feeds, Arc::clone(&cache), TICK).unwrap();
        thread::sleep(Duration::from_millis(250));
        scheduler.shutdown();

        assert!(a.calls() >= 3, "schedule kept running: {} calls", a.calls());
        assert_eq!(cached(&cache, "a"), Some(1));
    }

    #[test]
    fn failing_source_does_not_disturb_others() {
        let broken = Arc::new(Scripted::new("broken", Duration::from_millis(20)).failing_after(0));
        let healthy = Arc::new(Scripted::new("healthy", Duration::from_millis(20)));
        let feeds: Vec<Arc<dyn Feed>> = vec![broken.clone(), healthy.clone()];
        let cache = Arc::new(Cache::new());

        let scheduler = spawn(&feeds, Arc::clone(&cache), TICK).unwrap();
        thread::sleep(Duration::from_millis(250));
        scheduler.shutdown();

        assert_eq!(cached(&cache, "broken"), None);
        let latest = cached(&cache, "healthy").unwrap();
        assert!(latest >= 3, "healthy source kept refreshing, saw {latest}");
        assert_eq!(latest, healthy.calls());
    }

    #[test]
    fn slow_source_does_not_delay_others() {
        let slow = Arc::new(Scripted::new("slow", Duration::from_millis(10)).slow(Duration::from_millis(300)));
        let fast = Arc::new(Scripted::new("fast", Duration::from_millis(20)));
        let feeds: Vec<Arc<dyn Feed>> = vec![slow.clone(), fast.clone()];
        let cache = Arc::new(Cache::new());

        let scheduler = spawn(&feeds, Arc::clone(&cache), TICK).unwrap();
        let before = fast.calls();
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(200) {
            thread::sleep(TICK);
        }
        let during = fast.calls() - before;
        scheduler.shutdown();

        assert!(during >= 4, "fast source refreshed {during} times while slow one was fetching");
    }

    #[test]
    fn a_source_never_fetches_concurrently_with_itself() {
        let a = Arc::new(Scripted::new("a", Duration::from_millis(1)).slow(Duration::from_millis(15)));
        let feeds: Vec<Arc<dyn Feed>> = vec![a.clone()];
        let cache = Arc::new(Cache::new());

        let scheduler = spawn(&feeds, cache, Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(150));
        scheduler.shutdown();

        assert!(a.calls() >= 3);
        assert!(!a.overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn shutdown_stops_refreshing() {
        let a = Arc::new(Scripted::new("a", Duration::from_millis(10)));
        let feeds: Vec<Arc<dyn Feed>> = vec![a.clone()];
        let scheduler = spawn(&feeds, Arc::new(Cache::new()), TICK).unwrap();

        thread::sleep(Duration::from_millis(50));
        scheduler.shutdown();
        let after = a.calls();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(a.calls(), after);
    }

    #[test]
    fn refresh_reports_outcome() {
        let ok = Scripted::new("ok", Duration::from_secs(60));
        let bad = Scripted::new("bad", Duration::from_secs(60)).failing_after(0);
        let cache = Cache::new();

        assert!(refresh(&ok, &cache));
        assert!(!refresh(&bad, &cache));
        assert_eq!(cached(&cache, "ok"), Some(1));
        assert!(cache.get("bad").is_none());
    }
}
