//! Date dimension generation.
//!
//! Rows are a pure function of `(start, end, granularity)`; nothing here touches storage.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::{DataSet, Value, TIMESTAMP_FORMAT};
use crate::warehouse::TargetTable;

/// Interval length of one date dimension row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    #[default]
    Hour,
    Day,
}

impl Granularity {
    pub fn step(self) -> TimeDelta {
        match self {
            Granularity::Minute => TimeDelta::minutes(1),
            Granularity::Hour => TimeDelta::hours(1),
            Granularity::Day => TimeDelta::days(1),
        }
    }

    /// Start of the interval containing `ts`.
    pub fn truncate(self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = ts.date();
        let (h, m) = match self {
            Granularity::Minute => (ts.hour(), ts.minute()),
            Granularity::Hour => (ts.hour(), 0),
            Granularity::Day => (0, 0),
        };
        date.and_hms_opt(h, m, 0).unwrap_or(ts)
    }

    /// Date dimension key of the interval containing `ts`.
    pub fn date_id(self, ts: NaiveDateTime) -> String {
        self.truncate(ts).format(TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        })
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minute" | "min" | "t" => Ok(Granularity::Minute),
            "hour" | "h" => Ok(Granularity::Hour),
            "day" | "d" => Ok(Granularity::Day),
            other => Err(format!("unknown granularity '{other}' (expected minute, hour or day)")),
        }
    }
}

/// One row per interval from `start` through `end`, both ends included.
///
/// `start` is truncated to the granularity first so keys line up with [`Granularity::date_id`].
/// `start > end` yields no rows. Columns follow [`TargetTable::DimDate`].
pub fn generate_date_dimension(start: NaiveDateTime, end: NaiveDateTime, granularity: Granularity) -> DataSet {
    let mut rows = Vec::new();
    let step = granularity.step();
    let mut current = granularity.truncate(start);
    while current <= end {
        rows.push(date_row(current));
        match current.checked_add_signed(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    DataSet::new(TargetTable::DimDate.schema(), rows)
}

fn date_row(ts: NaiveDateTime) -> Vec<Value> {
    vec![
        Value::Utf8(ts.format(TIMESTAMP_FORMAT).to_string()),
        Value::Timestamp(ts),
        Value::Utf8(ts.format("%A").to_string()),
        Value::Int64(i64::from(ts.day())),
        Value::Int64(i64::from(ts.hour())),
        Value::Int64(i64::from(ts.iso_week().week())),
        Value::Utf8(ts.format("%B").to_string()),
        Value::Int64(i64::from((ts.month() - 1) / 3 + 1)),
        Value::Int64(i64::from(ts.year())),
    ]
}
