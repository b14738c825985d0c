use std::sync::Arc;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use tracing::error;

use crate::cache::Cache;
use crate::error::ConfigError;
use crate::source::{ensure_unique_names, Feed};

/// Everything the scheduler writes and the server reads.
pub struct App {
    /// Registered sources, in serving order.
    sources: Vec<Arc<dyn Feed>>,
    /// Last good raw value per source name.
    cache: Arc<Cache>,
}

impl App {
    pub fn new(sources: Vec<Arc<dyn Feed>>) -> Result<Self, ConfigError> {
        ensure_unique_names(&sources)?;
        Ok(Self {
            sources,
            cache: Arc::new(Cache::new()),
        })
    }

    pub fn sources(&self) -> &[Arc<dyn Feed>] {
        &self.sources
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Format every cached value against `now`.
    ///
    /// Sources with nothing cached yet are left out, as are values that fail
    /// to encode; neither affects the other keys.
    pub fn snapshot(&self, now: DateTime<Local>) -> Map<String, Value> {
        let mut out = Map::new();
        for src in &self.sources {
            let Some(raw) = self.cache.get(src.name()) else {
                continue;
            };
            match src.format(&raw, now) {
                Ok(value) => {
                    out.insert(src.name().to_string(), value);
                }
                Err(e) => error!(source = src.name(), error = %e, "failed to format"),
            }
        }
        out
    }
}
