//! Next waste collection from the council's iCalendar feed.
//!
//! Only all-day events count.  Recurring events are expanded over the
//! lookahead window (`RRULE`, `RDATE`, `EXDATE`, and moved occurrences marked
//! with `RECURRENCE-ID`).  Each candidate is classified by looking for a
//! keyword in its summary, and the earliest one wins.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Days, Local, NaiveDate};
use icalendar::{Calendar, CalendarComponent, Component, DatePerhapsTime, Event, EventLike};
use serde::Serialize;
use tracing::{debug, warn};

use super::recurrence::{date_list, Rule};
use super::{DataSource, DAY_LABEL};
use crate::cadence::Cadence;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionKind {
    Recycling,
    #[serde(rename = "General Waste")]
    GeneralWaste,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub date: NaiveDate,
    pub kind: CollectionKind,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CollectionView {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: CollectionKind,
}

/// Decides whether an event summary marks a recycling collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatcher {
    keyword: String,
    ignore_case: bool,
}

impl KeywordMatcher {
    pub fn new(keyword: impl Into<String>, ignore_case: bool) -> Self {
        let keyword = keyword.into();
        let keyword = if ignore_case {
            keyword.to_lowercase()
        } else {
            keyword
        };
        Self {
            keyword,
            ignore_case,
        }
    }

    pub fn classify(&self, summary: &str) -> CollectionKind {
        let hit = if self.ignore_case {
            summary.to_lowercase().contains(&self.keyword)
        } else {
            summary.contains(&self.keyword)
        };
        if hit {
            CollectionKind::Recycling
        } else {
            CollectionKind::GeneralWaste
        }
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new("RECYCLING", false)
    }
}

pub struct RecyclingSource {
    client: reqwest::blocking::Client,
    calendar_url: String,
    matcher: KeywordMatcher,
    lookahead_days: u64,
}

impl RecyclingSource {
    pub fn new(
        client: reqwest::blocking::Client,
        calendar_url: impl Into<String>,
        matcher: KeywordMatcher,
        lookahead_days: u64,
    ) -> Self {
        Self {
            client,
            calendar_url: calendar_url.into(),
            matcher,
            lookahead_days,
        }
    }
}

/// Pick the earliest all-day occurrence dated in
/// `[today, today + lookahead_days)`.
pub(crate) fn next_collection(
    ics: &str,
    today: NaiveDate,
    lookahead_days: u64,
    matcher: &KeywordMatcher,
) -> Result<Collection, FetchError> {
    let calendar: Calendar = ics
        .parse()
        .map_err(|e| FetchError::Calendar(format!("{e}")))?;
    let end = today
        .checked_add_days(Days::new(lookahead_days))
        .unwrap_or(NaiveDate::MAX);

    let events: Vec<&Event> = calendar
        .components
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(event),
            _ => None,
        })
        .collect();

    // Occurrences of a series that were moved by a separate override event.
    let moved: HashSet<(&str, NaiveDate)> = events
        .iter()
        .filter_map(|event| match (event.get_uid(), event.get_recurrence_id()) {
            (Some(uid), Some(DatePerhapsTime::Date(date))) => Some((uid, date)),
            _ => None,
        })
        .collect();

    events
        .iter()
        .flat_map(|event| {
            let summary = event.get_summary().unwrap_or_default().trim();
            let kind = matcher.classify(summary);
            occurrences(event, end, &moved)
                .into_iter()
                .filter(move |date| *date >= today)
                .map(move |date| Collection { date, kind })
        })
        .min_by_key(|collection| collection.date)
        .ok_or_else(|| {
            FetchError::Empty(format!("no collection within {lookahead_days} days"))
        })
}

/// Dates before `end` on which an all-day event occurs.  Timed events have
/// none.
fn occurrences<'a>(
    event: &'a Event,
    end: NaiveDate,
    moved: &HashSet<(&'a str, NaiveDate)>,
) -> BTreeSet<NaiveDate> {
    let Some(DatePerhapsTime::Date(start)) = event.get_start() else {
        return BTreeSet::new();
    };
    let uid = event.get_uid().unwrap_or_default();

    let mut dates = match event.property_value("RRULE").map(Rule::parse) {
        None => BTreeSet::from([start]),
        Some(Ok(rule)) => rule.occurrences(start, end).into_iter().collect(),
        Some(Err(reason)) => {
            warn!(uid, %reason, "ignoring recurrence rule");
            BTreeSet::from([start])
        }
    };
    dates.extend(listed_dates(event, "RDATE"));
    for excluded in listed_dates(event, "EXDATE") {
        dates.remove(&excluded);
    }
    if event.get_recurrence_id().is_none() {
        dates.retain(|date| !moved.contains(&(uid, *date)));
    }
    dates.retain(|date| *date < end);
    dates
}

fn listed_dates(event: &Event, key: &str) -> BTreeSet<NaiveDate> {
    date_list(
        event
            .multi_properties()
            .get(key)
            .into_iter()
            .flatten()
            .map(|property| property.value()),
    )
}

impl DataSource for RecyclingSource {
    type Raw = Collection;
    type View = CollectionView;

    fn name(&self) -> &str {
        "recycling"
    }

    fn cadence(&self) -> Cadence {
        Cadence::midnight()
    }

    fn fetch(&self) -> Result<Collection, FetchError> {
        debug!(url = %self.calendar_url, "fetching collection calendar");
        let ics = self
            .client
            .get(&self.calendar_url)
            .send()?
            .error_for_status()?
            .text()?;
        next_collection(
            &ics,
            Local::now().date_naive(),
            self.lookahead_days,
            &self.matcher,
        )
    }

    fn format(&self, raw: &Collection, _now: DateTime<Local>) -> CollectionView {
        CollectionView {
            date: raw.date.format(DAY_LABEL).to_string(),
            kind: raw.kind,
        }
    }
}
