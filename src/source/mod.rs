//! Data source abstraction layer.
//!
//! This module defines the [`DataSource`] trait, its type-erased twin
//! [`Feed`], and the static [`registry`] of concrete feeds.  Concrete source
//! implementations live in sub-modules, one per upstream.
//!
//! ## For contributors: adding a new source
//!
//! 1. Create a new file in this directory (e.g. `tides.rs`).
//! 2. Define a struct holding its configuration and implement [`DataSource`]
//!    for it: pick a `Raw` type for what `fetch()` returns and a `View` type
//!    for what `format()` renders.
//! 3. Add `mod tides;` below and push an instance in [`registry`].
//!
//! That's it: the scheduler, cache and HTTP server are all source-agnostic.

mod bus;
mod date;
mod recurrence;
mod recycling;
mod weather;

pub use bus::BusSource;
pub use date::DateSource;
pub use recycling::{KeywordMatcher, RecyclingSource};
pub use weather::WeatherSource;

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use serde_json::Value;

use crate::cadence::Cadence;
use crate::config::Config;
use crate::error::{ConfigError, FetchError, FormatError};

/// A raw fetched value as it sits in the cache.
pub type RawValue = Arc<dyn Any + Send + Sync>;

/// Trait that every data source must implement.
///
/// The scheduler calls [`fetch()`](DataSource::fetch) on the source's own
/// background thread according to [`cadence()`](DataSource::cadence).  The
/// server calls [`format()`](DataSource::format) on every request, so the
/// rendered view reflects the request time rather than the fetch time.
///
/// Sources keep no mutable state between calls.
///
/// ## Implementing a new source
///
/// ```ignore
/// pub struct MySource { /* config fields */ }
///
/// impl DataSource for MySource {
///     type Raw = u32;
///     type View = String;
///
///     fn name(&self) -> &str { "my_source" }
///     fn cadence(&self) -> Cadence { Cadence::every_minutes(5) }
///     fn fetch(&self) -> Result<u32, FetchError> { Ok(42) }
///     fn format(&self, raw: &u32, _now: DateTime<Local>) -> String { raw.to_string() }
/// }
/// ```
pub trait DataSource: Send + Sync + 'static {
    /// What `fetch()` produces and the cache stores.
    type Raw: Send + Sync + 'static;
    /// What `format()` renders for the JSON snapshot.
    type View: Serialize;

    /// Stable key used in the cache and in the served JSON.
    fn name(&self) -> &str;

    /// How often the scheduler refreshes this source.
    fn cadence(&self) -> Cadence;

    /// Retrieve the current value from upstream.  May block on I/O.
    fn fetch(&self) -> Result<Self::Raw, FetchError>;

    /// Render a cached value relative to `now`.  Must be cheap and pure.
    fn format(&self, raw: &Self::Raw, now: DateTime<Local>) -> Self::View;
}

/// Object-safe view of a [`DataSource`], used wherever sources of different
/// types sit side by side.
///
/// Every `DataSource` is a `Feed` through the blanket impl below; there is
/// no reason to implement this trait by hand.
pub trait Feed: Send + Sync {
    fn name(&self) -> &str;
    fn cadence(&self) -> Cadence;
    fn fetch(&self) -> Result<RawValue, FetchError>;
    fn format(&self, raw: &RawValue, now: DateTime<Local>) -> Result<Value, FormatError>;
}

impl<S: DataSource> Feed for S {
    fn name(&self) -> &str {
        DataSource::name(self)
    }

    fn cadence(&self) -> Cadence {
        DataSource::cadence(self)
    }

    fn fetch(&self) -> Result<RawValue, FetchError> {
        let raw = DataSource::fetch(self)?;
        Ok(Arc::new(raw))
    }

    fn format(&self, raw: &RawValue, now: DateTime<Local>) -> Result<Value, FormatError> {
        let raw = raw
            .downcast_ref::<S::Raw>()
            .ok_or_else(|| FormatError::RawType(DataSource::name(self).to_string()))?;
        Ok(serde_json::to_value(DataSource::format(self, raw, now))?)
    }
}

/// Build the reference deployment's feeds, in the order they are served.
pub fn registry(config: &Config) -> Result<Vec<Arc<dyn Feed>>, ConfigError> {
    let client = http_client(config.fetch_timeout)?;

    let sources: Vec<Arc<dyn Feed>> = vec![
        Arc::new(DateSource),
        Arc::new(BusSource::new(
            client.clone(),
            config.transit_url.clone(),
            config.bus_stop_ids.clone(),
        )),
        Arc::new(WeatherSource::new(
            client.clone(),
            config.weather_url.clone(),
            config.pirate_api_key.clone(),
            config.lat_long.clone(),
        )),
        Arc::new(RecyclingSource::new(
            client,
            config.recycling_calendar_url.clone(),
            config.recycling_matcher.clone(),
            config.lookahead_days,
        )),
    ];

    Ok(sources)
}

pub(crate) fn ensure_unique_names(sources: &[Arc<dyn Feed>]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for src in sources {
        if !seen.insert(src.name()) {
            return Err(ConfigError::DuplicateSource(src.name().to_string()));
        }
    }
    Ok(())
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, ConfigError> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("dashboard-server/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::invalid("HTTP client", e.to_string()))
}

/// Hour and minute without a leading zero on the hour, e.g. `9:05`.
pub(crate) fn clock_time<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.format("%-H:%M").to_string()
}

/// Long day label used by the date and recycling feeds, e.g. `Saturday 17 October`.
pub(crate) const DAY_LABEL: &str = "%A %d %B";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl DataSource for Fixed {
        type Raw = u32;
        type View = String;

        fn name(&self) -> &str {
            self.0
        }

        fn cadence(&self) -> Cadence {
            Cadence::every_minutes(1)
        }

        fn fetch(&self) -> Result<u32, FetchError> {
            Ok(7)
        }

        fn format(&self, raw: &u32, _now: DateTime<Local>) -> String {
            format!("value {raw}")
        }
    }

    #[test]
    fn feed_round_trips_through_erased_value() {
        let feed: Arc<dyn Feed> = Arc::new(Fixed("fixed"));
        let raw = feed.fetch().unwrap();
        let json = feed.format(&raw, Local::now()).unwrap();
        assert_eq!(json, Value::String("value 7".into()));
    }

    #[test]
    fn format_rejects_foreign_raw_type() {
        let feed: Arc<dyn Feed> = Arc::new(Fixed("fixed"));
        let wrong: RawValue = Arc::new("not a u32".to_string());
        let err = feed.format(&wrong, Local::now()).unwrap_err();
        assert!(matches!(err, FormatError::RawType(name) if name == "fixed"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let sources: Vec<Arc<dyn Feed>> = vec![
            Arc::new(Fixed("a")),
            Arc::new(Fixed("b")),
            Arc::new(Fixed("a")),
        ];
        let err = ensure_unique_names(&sources).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSource(name) if name == "a"));
    }

    #[test]
    fn clock_time_drops_leading_zero() {
        let t = chrono::Utc.with_ymd_and_hms(2026, 10, 17, 9, 5, 0).unwrap();
        assert_eq!(clock_time(&t), "9:05");
    }
}
