//! Error types for the stream processor
//!
//! This module provides error handling for all processor operations:
//! watermarking, windowing, pattern matching and sink delivery.
//!
//! Severity follows the pipeline contract: timestamp errors are fatal because
//! they break event-time ordering for every station, late events are dropped
//! and counted, and sink errors are retried before being surfaced.

use heatwatch_types::TypesError;
use thiserror::Error;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Window-related errors
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Watermark generation errors
    #[error("watermark error: {0}")]
    Watermark(#[from] WatermarkError),

    /// Pattern matching errors
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// Sink delivery errors
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Invalid record contents
    #[error("invalid record: {0}")]
    Record(TypesError),

    /// Configuration errors
    #[error("configuration error: {source}")]
    Configuration {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Execution errors
    #[error("execution error: {source}")]
    Execution {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic error for unexpected conditions
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ProcessorError {
    /// Whether the error must halt ingestion
    pub fn is_fatal(&self) -> bool {
        match self {
            ProcessorError::Window(WindowError::LateEvent { .. }) => false,
            ProcessorError::Sink(err) => !err.is_retryable(),
            _ => true,
        }
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        ProcessorError::Configuration {
            source: msg.into().into(),
        }
    }
}

impl From<TypesError> for ProcessorError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::MalformedTimestamp { value, reason } => {
                ProcessorError::Watermark(WatermarkError::MalformedTimestamp { value, reason })
            }
            other => ProcessorError::Record(other),
        }
    }
}

/// Window assignment and management errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    /// Event arrived after the watermark passed it
    #[error("late event: event timestamp {event_time} is before watermark {watermark}, late by {late_by}ms")]
    LateEvent {
        event_time: i64,
        watermark: i64,
        late_by: i64,
    },

    /// Window size is invalid
    #[error("invalid window size: {size}ms, must be greater than 0")]
    InvalidWindowSize { size: u64 },
}

/// Watermark generation and propagation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WatermarkError {
    /// The timestamp string could not be parsed
    #[error("malformed timestamp '{value}': {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// Event time went backwards under a failing ordering policy
    #[error("timestamp ordering violation: event time {event_time} is before watermark {watermark}")]
    OrderingViolation { event_time: i64, watermark: i64 },

    /// Watermark went backwards
    #[error("watermark regression: new watermark {new_watermark} is before current {current_watermark}")]
    WatermarkRegression {
        current_watermark: i64,
        new_watermark: i64,
    },
}

/// Pattern matcher errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    /// Threshold must be a finite number
    #[error("invalid pattern threshold: {threshold}")]
    InvalidThreshold { threshold: f64 },

    /// Bound must be positive
    #[error("invalid pattern bound: {bound_ms}ms, must be greater than 0")]
    InvalidBound { bound_ms: u64 },
}

/// Sink delivery errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// Recoverable delivery failure, eligible for retry
    #[error("transient sink failure on {channel}: {reason}")]
    Transient { channel: String, reason: String },

    /// Unrecoverable delivery failure
    #[error("fatal sink failure on {channel}: {reason}")]
    Fatal { channel: String, reason: String },

    /// Retries exhausted
    #[error("delivery on {channel} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        channel: String,
        attempts: u32,
        last_error: String,
    },

    /// Dispatcher queue has no free capacity
    #[error("sink queue full on {channel}")]
    QueueFull { channel: String },

    /// Dispatcher is shut down
    #[error("sink channel {channel} is closed")]
    Closed { channel: String },
}

impl SinkError {
    pub fn transient(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::Transient {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::Fatal {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Only transient failures and a full queue may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transient { .. } | SinkError::QueueFull { .. })
    }
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for window operations
pub type WindowResult<T> = std::result::Result<T, WindowError>;

/// Result type alias for watermark operations
pub type WatermarkResult<T> = std::result::Result<T, WatermarkError>;

/// Result type alias for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ProcessorError {
    fn from(err: anyhow::Error) -> Self {
        ProcessorError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        let err = WindowError::InvalidWindowSize { size: 0 };
        assert!(err.to_string().contains("invalid window size"));
    }

    #[test]
    fn test_malformed_timestamp_is_fatal() {
        let err: ProcessorError = TypesError::MalformedTimestamp {
            value: "yesterday".to_string(),
            reason: "input contains invalid characters".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            ProcessorError::Watermark(WatermarkError::MalformedTimestamp { .. })
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_late_event_is_not_fatal() {
        let err: ProcessorError = WindowError::LateEvent {
            event_time: 900,
            watermark: 1000,
            late_by: 100,
        }
        .into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_sink_error_retryable() {
        assert!(SinkError::transient("warnings", "connection reset").is_retryable());
        assert!(!SinkError::fatal("warnings", "syntax error").is_retryable());
        assert!(!SinkError::Closed {
            channel: "aggregates".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_watermark_error_display() {
        let err = WatermarkError::WatermarkRegression {
            current_watermark: 1000,
            new_watermark: 900,
        };
        assert!(err.to_string().contains("regression"));
    }
}
