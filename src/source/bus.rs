//! Live bus departures for a set of stops.
//!
//! The raw value keeps absolute due instants; [`format_due`] turns them into
//! "due" / "N mins" / clock-time text against the request time, so the same
//! cached fetch reads differently a few minutes later.
//!
//! ## Transit payload
//!
//! The provider is queried once per stop at `transit_url` with `{stop_id}`
//! substituted, and answers:
//!
//! ```json
//! { "name": "Carfax Tower",
//!   "departures": [ { "route": "4", "destination": "Abingdon",
//!                     "due": "2026-10-17T10:05:00+01:00" } ] }
//! ```

use chrono::{DateTime, Local, TimeZone};
use serde::Deserialize;
use tracing::debug;

use super::{clock_time, DataSource};
use crate::cadence::Cadence;
use crate::error::FetchError;

/// One departure as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub route: String,
    pub destination: String,
    pub due: DateTime<Local>,
}

/// All upcoming departures for one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopDepartures {
    pub name: String,
    pub departures: Vec<Departure>,
}

/// Rendered stop: `buses` is a list of `[route, destination, due-text]`.
#[derive(Debug, serde::Serialize, PartialEq)]
pub struct StopView {
    pub name: String,
    pub buses: Vec<(String, String, String)>,
}

#[derive(Debug, Deserialize)]
struct StopPayload {
    name: String,
    #[serde(default)]
    departures: Vec<DeparturePayload>,
}

#[derive(Debug, Deserialize)]
struct DeparturePayload {
    route: String,
    destination: String,
    due: String,
}

pub struct BusSource {
    client: reqwest::blocking::Client,
    /// URL template containing `{stop_id}`.
    url_template: String,
    stop_ids: Vec<String>,
}

impl BusSource {
    pub fn new(
        client: reqwest::blocking::Client,
        url_template: impl Into<String>,
        stop_ids: Vec<String>,
    ) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            stop_ids,
        }
    }

    fn stop_url(&self, stop_id: &str) -> String {
        self.url_template.replace("{stop_id}", stop_id)
    }

    fn fetch_stop(&self, stop_id: &str) -> Result<StopDepartures, FetchError> {
        let url = self.stop_url(stop_id);
        debug!(stop_id, %url, "fetching departures");
        let body = self.client.get(&url).send()?.error_for_status()?.bytes()?;
        parse_stop(&body)
    }
}

/// Parse one stop's JSON payload (no I/O, so tests can feed it directly).
pub(crate) fn parse_stop(body: &[u8]) -> Result<StopDepartures, FetchError> {
    let payload: StopPayload = serde_json::from_slice(body)?;

    let departures = payload
        .departures
        .into_iter()
        .map(|d| {
            let due = DateTime::parse_from_rfc3339(&d.due)
                .map_err(|e| FetchError::Malformed(format!("due time {:?}: {e}", d.due)))?
                .with_timezone(&Local);
            Ok::<_, FetchError>(Departure {
                route: d.route,
                destination: d.destination,
                due,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StopDepartures {
        name: payload.name,
        departures,
    })
}

/// Render a due instant relative to `now`.
///
/// * at or before `now` → `"due"`
/// * under 61 seconds → `"1 min"`
/// * up to an hour → minutes rounded up, `"N mins"`
/// * further out → the due clock time, e.g. `"11:10"`
///
/// Works in milliseconds so a fraction of a second still rounds up.
pub fn format_due<Tz: TimeZone>(due: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let millis = (due.clone() - now.clone()).num_milliseconds();

    if millis <= 0 {
        return "due".to_string();
    }
    if millis < 61_000 {
        return "1 min".to_string();
    }
    let minutes = (millis + 59_999) / 60_000;
    if minutes <= 60 {
        return format!("{minutes} mins");
    }
    clock_time(due)
}

impl DataSource for BusSource {
    type Raw = Vec<StopDepartures>;
    type View = Vec<StopView>;

    fn name(&self) -> &str {
        "bus_stops"
    }

    fn cadence(&self) -> Cadence {
        Cadence::every_minutes(1)
    }

    fn fetch(&self) -> Result<Vec<StopDepartures>, FetchError> {
        self.stop_ids
            .iter()
            .map(|id| self.fetch_stop(id))
            .collect()
    }

    fn format(&self, raw: &Vec<StopDepartures>, now: DateTime<Local>) -> Vec<StopView> {
        raw.iter()
            .map(|stop| StopView {
                name: stop.name.clone(),
                buses: stop
                    .departures
                    .iter()
                    .map(|d| {
                        (
                            d.route.clone(),
                            d.destination.clone(),
                            format_due(&d.due, &now),
                        )
                    })
                    .collect(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
