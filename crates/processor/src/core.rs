//! Core event processing traits
//!
//! This module provides the stateless building blocks that sit in front of the
//! stateful stages:
//! - EventFilter: predicate deciding whether a record enters the pipeline
//! - EventTimeExtractor: resolves the event timestamp of a record
//! - KeyExtractor: resolves the aggregation key of a record
//!
//! Each stage is a named type so the pipeline can be assembled without
//! closures, with a single trait call per stage.

use crate::error::Result;
use chrono::{DateTime, Utc};
use heatwatch_types::{Observation, WeatherObservation};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Trait for selecting which records enter the pipeline
pub trait EventFilter<T> {
    /// Returns true if the record should be processed
    fn accept(&self, event: &T) -> bool;
}

/// Trait for extracting event timestamps from events
pub trait EventTimeExtractor<T> {
    /// Extract the event timestamp from the event
    fn extract_event_time(&self, event: &T) -> Result<DateTime<Utc>>;
}

/// Trait for extracting aggregation keys from events
pub trait KeyExtractor<T> {
    /// Extract the aggregation key from the event
    fn extract_key<'a>(&self, event: &'a T) -> &'a str;
}

/// Drops readings where the station reported no usable temperature
///
/// NaN and infinite values count as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonNullTemperatureFilter;

impl EventFilter<WeatherObservation> for NonNullTemperatureFilter {
    fn accept(&self, event: &WeatherObservation) -> bool {
        event.temperature.is_some_and(f64::is_finite)
    }
}

impl EventFilter<Observation> for NonNullTemperatureFilter {
    fn accept(&self, event: &Observation) -> bool {
        event.temperature().is_some_and(f64::is_finite)
    }
}

/// Parses the station date of a source record
///
/// Assumes the source is time-ordered; a record whose date cannot be parsed
/// is a fatal input error rather than a skipped record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AscendingTimestampExtractor;

impl AscendingTimestampExtractor {
    /// Resolve the full observation for a source record
    pub fn extract(&self, event: &WeatherObservation) -> Result<Observation> {
        Ok(Observation::from_source(event)?)
    }
}

impl EventTimeExtractor<WeatherObservation> for AscendingTimestampExtractor {
    fn extract_event_time(&self, event: &WeatherObservation) -> Result<DateTime<Utc>> {
        Ok(heatwatch_types::parse_event_time(&event.date)?)
    }
}

/// Keys observations by their WBAN station identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct StationKeyExtractor;

impl KeyExtractor<Observation> for StationKeyExtractor {
    fn extract_key<'a>(&self, event: &'a Observation) -> &'a str {
        event.station()
    }
}

impl KeyExtractor<WeatherObservation> for StationKeyExtractor {
    fn extract_key<'a>(&self, event: &'a WeatherObservation) -> &'a str {
        &event.station
    }
}

/// Deterministic shard for a key
///
/// The same key always maps to the same shard for a given shard count, so
/// per-station state is only ever touched by one worker. The hash is only
/// stable within one process; do not persist shard assignments.
pub fn shard_for(key: &str, shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProcessorError, WatermarkError};

    #[test]
    fn test_null_temperature_filtered() {
        let filter = NonNullTemperatureFilter;
        assert!(filter.accept(&WeatherObservation::new("S1", "2024-07-01T00:00:00", Some(20.0))));
        assert!(!filter.accept(&WeatherObservation::new("S1", "2024-07-01T00:00:00", None)));
    }

    #[test]
    fn test_non_finite_temperature_filtered() {
        let filter = NonNullTemperatureFilter;
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let raw = WeatherObservation::new("S1", "2024-07-01T00:00:00", Some(bad));
            assert!(!filter.accept(&raw));
            let obs = AscendingTimestampExtractor.extract(&raw).unwrap();
            assert!(!filter.accept(&obs));
        }
    }

    #[test]
    fn test_extractor_reports_malformed_timestamp() {
        let raw = WeatherObservation::new("S1", "not-a-date", Some(20.0));
        let err = AscendingTimestampExtractor.extract_event_time(&raw).unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Watermark(WatermarkError::MalformedTimestamp { .. })
        ));
    }

    #[test]
    fn test_station_key() {
        let raw = WeatherObservation::new("03812", "2024-07-01T00:00:00", Some(20.0));
        let obs = AscendingTimestampExtractor.extract(&raw).unwrap();
        assert_eq!(StationKeyExtractor.extract_key(&obs), "03812");
        assert_eq!(StationKeyExtractor.extract_key(&raw), "03812");
    }

    #[test]
    fn test_shard_for_is_stable() {
        for station in ["S1", "S2", "03812", "94846"] {
            let shard = shard_for(station, 4);
            assert!(shard < 4);
            assert_eq!(shard, shard_for(station, 4));
        }
        assert_eq!(shard_for("S1", 1), 0);
    }
}
