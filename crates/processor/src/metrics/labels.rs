//! Label management for Prometheus metrics
//!
//! Label values are closed enums so every series name is known up front.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to an incoming observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum ObservationResult {
    Ingested,
    Filtered,
    LateDropped,
}

impl fmt::Display for ObservationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationResult::Ingested => write!(f, "ingested"),
            ObservationResult::Filtered => write!(f, "filtered"),
            ObservationResult::LateDropped => write!(f, "late_dropped"),
        }
    }
}

/// Output channel of the sink dispatcher
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EncodeLabelValue,
)]
pub enum SinkChannel {
    Aggregates,
    Warnings,
}

impl SinkChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkChannel::Aggregates => "aggregates",
            SinkChannel::Warnings => "warnings",
        }
    }
}

impl fmt::Display for SinkChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one delivery step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum SinkOutcome {
    Delivered,
    Retried,
    Failed,
}

impl fmt::Display for SinkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkOutcome::Delivered => write!(f, "delivered"),
            SinkOutcome::Retried => write!(f, "retried"),
            SinkOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct ObservationLabels {
    pub result: ObservationResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct SinkLabels {
    pub channel: SinkChannel,
    pub outcome: SinkOutcome,
}
