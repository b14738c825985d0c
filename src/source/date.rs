//! Today's date, refreshed at local midnight.

use chrono::{DateTime, Local};

use super::{DataSource, DAY_LABEL};
use crate::cadence::Cadence;
use crate::error::FetchError;

pub struct DateSource;

impl DateSource {
    pub fn label_for(now: DateTime<Local>) -> String {
        now.format(DAY_LABEL).to_string()
    }
}

impl DataSource for DateSource {
    type Raw = String;
    type View = String;

    fn name(&self) -> &str {
        "date"
    }

    fn cadence(&self) -> Cadence {
        Cadence::midnight()
    }

    fn fetch(&self) -> Result<String, FetchError> {
        Ok(Self::label_for(Local::now()))
    }

    // Already fully formed at fetch time.
    fn format(&self, raw: &String, _now: DateTime<Local>) -> String {
        raw.clone()
    }
}
