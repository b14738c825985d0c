//! Expansion of iCalendar recurrence rules for all-day events.
//!
//! Covers what waste collection calendars use: `FREQ` of `DAILY`, `WEEKLY`,
//! `MONTHLY` or `YEARLY`, with `INTERVAL`, `COUNT`, `UNTIL`, `WKST` and a
//! plain-weekday `BYDAY` on weekly rules.  Any other rule part is rejected so
//! that a rule is never half-understood.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// A parsed `RRULE` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rule {
    freq: Frequency,
    interval: u32,
    count: Option<u32>,
    until: Option<NaiveDate>,
    by_day: Vec<Weekday>,
}

impl Rule {
    pub(crate) fn parse(value: &str) -> Result<Self, String> {
        let mut freq = None;
        let mut interval = 1;
        let mut count = None;
        let mut until = None;
        let mut by_day = Vec::new();

        for part in value.split(';').filter(|p| !p.is_empty()) {
            let (key, val) = part
                .split_once('=')
                .ok_or_else(|| format!("rule part {part:?} has no value"))?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(match val.to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        "YEARLY" => Frequency::Yearly,
                        other => return Err(format!("unsupported FREQ {other:?}")),
                    })
                }
                "INTERVAL" => {
                    interval = val
                        .parse()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| format!("bad INTERVAL {val:?}"))?;
                }
                "COUNT" => {
                    count = Some(val.parse().map_err(|_| format!("bad COUNT {val:?}"))?);
                }
                "UNTIL" => {
                    until = Some(parse_date(val).ok_or_else(|| format!("bad UNTIL {val:?}"))?);
                }
                "BYDAY" => {
                    by_day = val
                        .split(',')
                        .map(|d| weekday(d).ok_or_else(|| format!("unsupported BYDAY {d:?}")))
                        .collect::<Result<_, _>>()?;
                }
                // Weeks always start on Monday.
                "WKST" => {}
                other => return Err(format!("unsupported rule part {other}")),
            }
        }

        let freq = freq.ok_or("rule has no FREQ")?;
        if !by_day.is_empty() && freq != Frequency::Weekly {
            return Err("BYDAY is only supported on weekly rules".into());
        }
        by_day.sort_by_key(|d| d.num_days_from_monday());
        by_day.dedup();

        Ok(Self {
            freq,
            interval,
            count,
            until,
            by_day,
        })
    }

    /// Every occurrence starting at `start` that falls before `end`, in order.
    ///
    /// `COUNT` is applied from `start`, so occurrences before the caller's
    /// window still use up the count.
    pub(crate) fn occurrences(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        let mut emitted = 0u32;

        for period in 0u32.. {
            let Some(step) = period.checked_mul(self.interval) else {
                break;
            };
            let Some((anchor, candidates)) = self.period(start, step) else {
                break;
            };
            if anchor >= end || self.until.is_some_and(|until| anchor > until) {
                break;
            }

            for date in candidates {
                if date < start {
                    continue;
                }
                if date >= end || self.until.is_some_and(|until| date > until) {
                    return out;
                }
                if self.count.is_some_and(|count| emitted >= count) {
                    return out;
                }
                emitted += 1;
                out.push(date);
            }
        }
        out
    }

    /// The first day of the `step`th period after `start`'s, and the dates
    /// the rule produces in it.
    fn period(&self, start: NaiveDate, step: u32) -> Option<(NaiveDate, Vec<NaiveDate>)> {
        match self.freq {
            Frequency::Daily => {
                let date = start.checked_add_days(Days::new(step.into()))?;
                Some((date, vec![date]))
            }
            Frequency::Weekly => {
                let monday = start
                    .checked_sub_days(Days::new(start.weekday().num_days_from_monday().into()))?
                    .checked_add_days(Days::new(u64::from(step) * 7))?;
                let days = if self.by_day.is_empty() {
                    vec![start.weekday()]
                } else {
                    self.by_day.clone()
                };
                let dates = days
                    .iter()
                    .filter_map(|d| {
                        monday.checked_add_days(Days::new(d.num_days_from_monday().into()))
                    })
                    .collect();
                Some((monday, dates))
            }
            Frequency::Monthly => {
                let months = start.month0().checked_add(step)?;
                let year = start.year().checked_add(i32::try_from(months / 12).ok()?)?;
                let month = months % 12 + 1;
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                // A day that does not exist in this month (the 31st in
                // April) produces no occurrence.
                let dates = NaiveDate::from_ymd_opt(year, month, start.day())
                    .into_iter()
                    .collect();
                Some((first, dates))
            }
            Frequency::Yearly => {
                let year = start.year().checked_add(i32::try_from(step).ok()?)?;
                let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
                let dates = NaiveDate::from_ymd_opt(year, start.month(), start.day())
                    .into_iter()
                    .collect();
                Some((first, dates))
            }
        }
    }
}

/// Dates listed in `EXDATE` or `RDATE` values, which may be comma separated
/// and may carry a time part.  Unreadable entries are skipped.
pub(crate) fn date_list<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeSet<NaiveDate> {
    values
        .into_iter()
        .flat_map(|v| v.split(','))
        .filter_map(parse_date)
        .collect()
}

/// `YYYYMMDD`, optionally followed by `T...`.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let digits = value.trim().get(..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

fn weekday(code: &str) -> Option<Weekday> {
    Some(match code.trim().to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    })
}
