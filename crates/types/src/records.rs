//! Derived records emitted by the stream processor

use crate::errors::{Result, TypesError};
use crate::observation::SOURCE_DATE_FORMAT;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one tumbling window of one station
///
/// `window_end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    pub station: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl WindowKey {
    /// Create a window key; the window must have positive length
    pub fn new(
        station: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Self> {
        if window_start >= window_end {
            return Err(TypesError::InvalidWindow {
                start: window_start.timestamp_millis(),
                end: window_end.timestamp_millis(),
            });
        }
        Ok(Self {
            station: station.into(),
            window_start,
            window_end,
        })
    }

    /// Length of the window
    pub fn length(&self) -> Duration {
        self.window_end.signed_duration_since(self.window_start)
    }

    /// Whether the instant falls inside `[start, end)`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.window_start && instant < self.window_end
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{} - {})",
            self.station,
            self.window_start.format(SOURCE_DATE_FORMAT),
            self.window_end.format(SOURCE_DATE_FORMAT)
        )
    }
}

/// Maximum temperature of one station over one closed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub station: String,
    pub window_key: WindowKey,
    pub max_temperature: f64,
    /// Event time of the observation that first reached the maximum
    pub source_timestamp: DateTime<Utc>,
}

impl AggregatedRecord {
    pub fn new(
        window_key: WindowKey,
        max_temperature: f64,
        source_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            station: window_key.station.clone(),
            window_key,
            max_temperature,
            source_timestamp,
        }
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_key.window_end
    }

    /// The source timestamp rendered in the station date grammar
    pub fn source_date(&self) -> String {
        self.source_timestamp.format(SOURCE_DATE_FORMAT).to_string()
    }
}

/// Heat warning raised when a station stays above the threshold twice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningEvent {
    pub station: String,
    pub first_date: DateTime<Utc>,
    pub second_date: DateTime<Utc>,
    pub message: String,
}

impl WarningEvent {
    /// Build a warning from the two records that completed a match
    pub fn from_match(threshold: f64, first: &AggregatedRecord, second: &AggregatedRecord) -> Self {
        let message = format!(
            "Warning: WBAN:{}:Temperatures exceeded {} degrees on:{} and {}.",
            first.station,
            threshold,
            first.source_date(),
            second.source_date()
        );
        Self {
            station: first.station.clone(),
            first_date: first.source_timestamp,
            second_date: second.source_timestamp,
            message,
        }
    }
}

impl fmt::Display for WarningEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
