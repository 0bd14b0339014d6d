//! Station observation types

use crate::errors::{Result, TypesError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date grammar used by weather stations (`yyyy-MM-ddTHH:mm:ss`, no zone)
pub const SOURCE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parsing grammar; `%.f` also accepts an optional fractional second
const PARSE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parses a station date string into an event time
///
/// Station dates carry no time zone and are interpreted as UTC, so daily
/// windows align with calendar days.
pub fn parse_event_time(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), PARSE_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| TypesError::MalformedTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// A weather reading as produced by the source
///
/// The date is kept as the raw string the station reported; it is only
/// parsed once the record reaches the timestamp extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// WBAN station identifier
    pub station: String,
    /// Measurement time as reported by the station
    pub date: String,
    /// Temperature in degrees Celsius, absent when the sensor reported nothing
    pub temperature: Option<f64>,
}

impl WeatherObservation {
    /// Create a new raw observation
    pub fn new(
        station: impl Into<String>,
        date: impl Into<String>,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            station: station.into(),
            date: date.into(),
            temperature,
        }
    }

    /// Whether the reading carries a temperature value
    pub fn has_temperature(&self) -> bool {
        self.temperature.is_some()
    }
}

/// An observation with its event time resolved
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    station: String,
    timestamp: DateTime<Utc>,
    temperature: Option<f64>,
}

impl Observation {
    /// Create an observation, rejecting empty station identifiers
    pub fn new(
        station: impl Into<String>,
        timestamp: DateTime<Utc>,
        temperature: Option<f64>,
    ) -> Result<Self> {
        let station = station.into();
        if station.is_empty() {
            return Err(TypesError::EmptyStation);
        }
        Ok(Self {
            station,
            timestamp,
            temperature,
        })
    }

    /// Parse a raw source record
    pub fn from_source(raw: &WeatherObservation) -> Result<Self> {
        let timestamp = parse_event_time(&raw.date)?;
        Self::new(raw.station.clone(), timestamp, raw.temperature)
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Event time in milliseconds since the epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature {
            Some(t) => write!(
                f,
                "{}@{} {}C",
                self.station,
                self.timestamp.format(SOURCE_DATE_FORMAT),
                t
            ),
            None => write!(
                f,
                "{}@{} n/a",
                self.station,
                self.timestamp.format(SOURCE_DATE_FORMAT)
            ),
        }
    }
}
