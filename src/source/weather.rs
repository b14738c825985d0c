//! Current conditions from the Pirate Weather forecast API.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{clock_time, DataSource};
use crate::cadence::Cadence;
use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Chance of precipitation, 0.0 to 1.0.
    pub rain_probability: f64,
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WeatherView {
    pub temperature: String,
    pub rain: String,
    pub sun: SunEvent,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SunEvent {
    pub event: &'static str,
    pub time: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    currently: Currently,
    daily: Daily,
}

#[derive(Debug, Deserialize)]
struct Currently {
    temperature: f64,
    #[serde(rename = "precipProbability")]
    precip_probability: f64,
}

#[derive(Debug, Deserialize)]
struct Daily {
    #[serde(default)]
    data: Vec<Day>,
}

#[derive(Debug, Deserialize)]
struct Day {
    #[serde(rename = "sunriseTime")]
    sunrise_time: i64,
    #[serde(rename = "sunsetTime")]
    sunset_time: i64,
}

pub struct WeatherSource {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    lat_long: String,
}

impl WeatherSource {
    pub fn new(
        client: reqwest::blocking::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        lat_long: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            lat_long: lat_long.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/{}/{}?units=uk&exclude=hourly,minutely,alerts",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            self.lat_long
        )
    }
}

pub(crate) fn parse_forecast(body: &[u8]) -> Result<WeatherReading, FetchError> {
    let forecast: ForecastResponse = serde_json::from_slice(body)?;
    let today = forecast
        .daily
        .data
        .first()
        .ok_or_else(|| FetchError::Empty("forecast has no daily data".into()))?;

    Ok(WeatherReading {
        temperature: forecast.currently.temperature,
        rain_probability: forecast.currently.precip_probability,
        sunrise: from_unix(today.sunrise_time)?,
        sunset: from_unix(today.sunset_time)?,
    })
}

fn from_unix(secs: i64) -> Result<DateTime<Local>, FetchError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&Local))
        .ok_or_else(|| FetchError::Malformed(format!("timestamp {secs} out of range")))
}

/// Between sunrise and sunset the next event is sunset; otherwise sunrise.
pub fn next_sun_event<Tz: TimeZone>(
    sunrise: &DateTime<Tz>,
    sunset: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> SunEvent
where
    Tz::Offset: std::fmt::Display,
{
    if sunrise < now && now < sunset {
        SunEvent {
            event: "Sunset",
            time: clock_time(sunset),
        }
    } else {
        SunEvent {
            event: "Sunrise",
            time: clock_time(sunrise),
        }
    }
}

impl DataSource for WeatherSource {
    type Raw = WeatherReading;
    type View = WeatherView;

    fn name(&self) -> &str {
        "weather"
    }

    fn cadence(&self) -> Cadence {
        Cadence::every_minutes(15)
    }

    fn fetch(&self) -> Result<WeatherReading, FetchError> {
        let body = self
            .client
            .get(self.url())
            .send()?
            .error_for_status()?
            .bytes()?;
        parse_forecast(&body)
    }

    fn format(&self, raw: &WeatherReading, now: DateTime<Local>) -> WeatherView {
        WeatherView {
            temperature: format!("{:.0}", raw.temperature),
            rain: format!("{:.0}%", raw.rain_probability * 100.0),
            sun: next_sun_event(&raw.sunrise, &raw.sunset, &now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, h, m, 0).unwrap()
    }

    #[test]
    fn daytime_shows_sunset() {
        let ev = next_sun_event(&utc(7, 24), &utc(18, 5), &utc(12, 0));
        assert_eq!(ev.event, "Sunset");
        assert_eq!(ev.time, "18:05");
    }

    #[test]
    fn night_shows_sunrise() {
        let before = next_sun_event(&utc(7, 24), &utc(18, 5), &utc(5, 0));
        let after = next_sun_event(&utc(7, 24), &utc(18, 5), &utc(22, 0));
        assert_eq!(before.event, "Sunrise");
        assert_eq!(before.time, "7:24");
        assert_eq!(after.event, "Sunrise");
    }

    #[test]
    fn parse_forecast_extracts_today() {
        let body = br#"{
            "currently": {"temperature": 12.6, "precipProbability": 0.4},
            "daily": {"data": [
                {"sunriseTime": 1792218240, "sunsetTime": 1792257900},
                {"sunriseTime": 1792304700, "sunsetTime": 1792344240}
            ]}
        }"#;
        let reading = parse_forecast(body).unwrap();
        assert_eq!(reading.temperature, 12.6);
        assert_eq!(reading.rain_probability, 0.4);
        assert_eq!(reading.sunrise.timestamp(), 1792218240);
        assert_eq!(reading.sunset.timestamp(), 1792257900);
    }

    #[test]
    fn parse_forecast_without_days_is_empty() {
        let body = br#"{"currently": {"temperature": 1.0, "precipProbability": 0.0}, "daily": {"data": []}}"#;
        assert!(matches!(parse_forecast(body), Err(FetchError::Empty(_))));
    }

    #[test]
    fn format_rounds_values() {
        let source = WeatherSource::new(reqwest::blocking::Client::new(), "u", "k", "1,2");
        let now = Local::now();
        let reading = WeatherReading {
            temperature: 12.6,
            rain_probability: 0.35,
            sunrise: now - chrono::Duration::hours(2),
            sunset: now + chrono::Duration::hours(3),
        };
        let view = source.format(&reading, now);
        assert_eq!(view.temperature, "13");
        assert_eq!(view.rain, "35%");
        assert_eq!(view.sun.event, "Sunset");
    }

    #[test]
    fn url_includes_key_and_location() {
        let source = WeatherSource::new(
            reqwest::blocking::Client::new(),
            "https://api.pirateweather.net/forecast/",
            "KEY",
            "51.75,-1.25",
        );
        assert_eq!(
            source.url(),
            "https://api.pirateweather.net/forecast/KEY/51.75,-1.25?units=uk&exclude=hourly,minutely,alerts"
        );
    }
}
