//! Error types for the three failure classes the server distinguishes.
//!
//! * [`FetchError`]: a source could not retrieve or parse its upstream data.
//!   Caught per source by the scheduler; never reaches a client.
//! * [`ConfigError`]: a setting is missing or invalid.  Fatal at start-up.
//! * [`FormatError`]: a cached value could not be turned into JSON.  This is
//!   a programming defect; the snapshot omits the key and logs it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("calendar parse error: {0}")]
    Calendar(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("no data: {0}")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("duplicate source name: {0}")]
    DuplicateSource(String),
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("cached value for {0} has an unexpected type")]
    RawType(String),

    #[error("JSON encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
