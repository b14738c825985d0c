//! Refresh cadences.
//!
//! A [`Cadence`] answers one question: given the instant a source last
//! fired, when should it fire next?  Two shapes cover every feed:
//!
//! * [`Cadence::Every`]: a fixed repeating interval.
//! * [`Cadence::DailyAt`]: once per day at a local wall-clock time.
//!
//! The computation is generic over the time zone so tests can pin it to
//! `Utc` or a fixed offset while the scheduler runs it in `Local`.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fire every `Duration`, measured from the previous firing.
    Every(Duration),
    /// Fire once a day at this wall-clock time in the instant's time zone.
    DailyAt(NaiveTime),
}

impl Cadence {
    pub fn every_minutes(minutes: u64) -> Self {
        Self::Every(Duration::from_secs(minutes * 60))
    }

    pub fn midnight() -> Self {
        Self::DailyAt(NaiveTime::MIN)
    }

    /// The first firing strictly after `last`.
    pub fn next_after<Tz: TimeZone>(&self, last: &DateTime<Tz>) -> DateTime<Tz> {
        match *self {
            Self::Every(interval) => {
                let step = chrono::Duration::from_std(interval)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                last.clone() + step
            }
            Self::DailyAt(at) => next_daily(last, at),
        }
    }
}

fn next_daily<Tz: TimeZone>(last: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = last.timezone();
    let mut day = last.date_naive();

    loop {
        let naive = day.and_time(at);
        // A wall-clock time skipped by a DST jump fires an hour later instead.
        let candidate = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                    .earliest()
            });

        if let Some(fire) = candidate {
            if fire > *last {
                return fire;
            }
        }

        day = match day.succ_opt() {
            Some(next) => next,
            None => return last.clone() + chrono::Duration::days(1),
        };
    }
}
