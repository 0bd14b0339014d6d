//! Prometheus metrics for the stream processor
//!
//! Counters and gauges for every observable pipeline outcome: filtered and
//! late observations, emitted windows and warnings, expired partial matches
//! and sink delivery results. Metric names follow Prometheus conventions.

mod labels;
mod pipeline;
mod registry;

pub use labels::{ObservationLabels, ObservationResult, SinkChannel, SinkLabels, SinkOutcome};
pub use pipeline::{MetricsSnapshot, PipelineMetrics};
pub use registry::MetricsRegistry;

use thiserror::Error;

/// Errors that can occur in the metrics subsystem
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metric encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
