//! Core types and data models for the heatwatch pipeline
//!
//! This crate provides the records that flow between the source, the stream
//! processor and the sinks: raw station observations, parsed observations,
//! daily aggregates and heat warnings.

pub mod errors;
pub mod observation;
pub mod records;

pub use errors::{Result, TypesError};
pub use observation::{parse_event_time, Observation, WeatherObservation, SOURCE_DATE_FORMAT};
pub use records::{AggregatedRecord, WarningEvent, WindowKey};
