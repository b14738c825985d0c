//! Command-line and environment configuration.
//!
//! Every setting can come from a flag or an environment variable; flags win,
//! then the environment, then the default.  [`Config::from_cli`] validates the
//! parsed values so that a bad setting stops the process before anything
//! starts fetching.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::source::KeywordMatcher;

pub const DEFAULT_WEATHER_URL: &str = "https://api.pirateweather.net/forecast";

#[derive(Debug, Parser)]
#[command(
    name = "dashboard-server",
    about = "Serve date, bus, weather and recycling feeds as one JSON document"
)]
pub struct Cli {
    /// Port to listen on.
    #[arg(short, long, env = "DASHBOARD_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Bus stop ID (repeatable; comma separated in the environment).
    #[arg(
        short = 'b',
        long = "bus-stop-id",
        env = "BUS_STOP_IDS",
        value_delimiter = ',',
        required = true
    )]
    pub bus_stop_ids: Vec<String>,

    /// Latitude and longitude for the weather forecast, as `lat,long`.
    #[arg(short, long, env = "LAT_LONG")]
    pub lat_long: String,

    /// API key for Pirate Weather.
    #[arg(short = 'k', long, env = "PIRATE_API_KEY", hide_env_values = true)]
    pub pirate_api_key: String,

    /// URL of the waste collection iCalendar feed.
    #[arg(short, long, env = "RECYCLING_CALENDAR_URL")]
    pub recycling_calendar_url: String,

    /// Log filter directive, e.g. `info` or `dashboard_server=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Departures URL template; `{stop_id}` is replaced per stop.  The
    /// endpoint must serve the JSON shape `parse_stop` reads; there is no
    /// default provider.
    #[arg(short, long, env = "TRANSIT_URL")]
    pub transit_url: String,

    /// Base URL of the forecast API.
    #[arg(long, env = "WEATHER_URL", default_value = DEFAULT_WEATHER_URL)]
    pub weather_url: String,

    /// Give up on an upstream request after this many seconds.
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 5)]
    pub fetch_timeout_secs: u64,

    /// Summary keyword marking a recycling collection.
    #[arg(long, env = "RECYCLING_KEYWORD", default_value = "RECYCLING")]
    pub recycling_keyword: String,

    /// Match the recycling keyword regardless of case.
    #[arg(long, env = "RECYCLING_IGNORE_CASE")]
    pub recycling_ignore_case: bool,

    /// How many days ahead to look for the next collection.
    #[arg(long, env = "LOOKAHEAD_DAYS", default_value_t = 30)]
    pub lookahead_days: u64,

    /// Scheduler sleep granularity in milliseconds.
    #[arg(long, env = "TICK_MILLIS", default_value_t = 1000)]
    pub tick_millis: u64,
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bus_stop_ids: Vec<String>,
    pub lat_long: String,
    pub pirate_api_key: String,
    pub recycling_calendar_url: String,
    pub log_level: String,
    pub transit_url: String,
    pub weather_url: String,
    pub fetch_timeout: Duration,
    pub recycling_matcher: KeywordMatcher,
    pub lookahead_days: u64,
    pub tick: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let bus_stop_ids: Vec<String> = cli
            .bus_stop_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if bus_stop_ids.is_empty() {
            return Err(ConfigError::invalid("bus stop IDs", "none provided"));
        }

        let lat_long = normalize_lat_long(&cli.lat_long)?;

        if !cli.transit_url.contains("{stop_id}") {
            return Err(ConfigError::invalid(
                "transit URL",
                "must contain a {stop_id} placeholder",
            ));
        }

        EnvFilter::try_new(&cli.log_level)
            .map_err(|e| ConfigError::invalid("LOG_LEVEL", format!("{:?}: {e}", cli.log_level)))?;

        if cli.fetch_timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch timeout", "must be at least 1 second"));
        }
        if cli.tick_millis == 0 {
            return Err(ConfigError::invalid("tick", "must be at least 1 millisecond"));
        }
        if cli.lookahead_days == 0 {
            return Err(ConfigError::invalid("lookahead days", "must be at least 1"));
        }

        Ok(Self {
            port: cli.port,
            bus_stop_ids,
            lat_long,
            pirate_api_key: cli.pirate_api_key,
            recycling_calendar_url: cli.recycling_calendar_url,
            log_level: cli.log_level,
            transit_url: cli.transit_url,
            weather_url: cli.weather_url,
            fetch_timeout: Duration::from_secs(cli.fetch_timeout_secs),
            recycling_matcher: KeywordMatcher::new(cli.recycling_keyword, cli.recycling_ignore_case),
            lookahead_days: cli.lookahead_days,
            tick: Duration::from_millis(cli.tick_millis),
        })
    }
}

/// Check `lat,long` and strip any whitespace around the parts.
fn normalize_lat_long(value: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::invalid("lat-long", format!("{value:?} is not `lat,long`"));

    let (lat_text, long_text) = value.split_once(',').ok_or_else(invalid)?;
    let (lat_text, long_text) = (lat_text.trim(), long_text.trim());
    let lat: f64 = lat_text.parse().map_err(|_| invalid())?;
    let long: f64 = long_text.parse().map_err(|_| invalid())?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&long) {
        return Err(invalid());
    }
    Ok(format!("{lat_text},{long_text}"))
}
