//! Configuration types for the stream processor
//!
//! This module provides configuration structures for the processor stages:
//! windowing and lateness, the heat pattern, and sink delivery. Durations are
//! expressed in milliseconds so the structures serialize cleanly from YAML
//! and environment variables.

use crate::error::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DAY_MS: u64 = 86_400_000;

/// Main processor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Heat pattern configuration
    #[serde(default)]
    pub pattern: PatternConfig,

    /// Sink delivery configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Number of shard workers; 1 runs the single-threaded executor
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Capacity of the input channel and of each shard queue
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Emit open windows when the pipeline shuts down
    #[serde(default)]
    pub flush_on_shutdown: bool,
}

fn default_parallelism() -> usize {
    1
}

fn default_buffer_size() -> usize {
    1024
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            pattern: PatternConfig::default(),
            sink: SinkConfig::default(),
            parallelism: default_parallelism(),
            buffer_size: default_buffer_size(),
            flush_on_shutdown: false,
        }
    }
}

impl ProcessorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.pattern.validate()?;
        self.sink.validate()?;

        if self.parallelism == 0 {
            return Err(ProcessorError::Configuration {
                source: "parallelism must be greater than 0".into(),
            });
        }

        if self.buffer_size == 0 {
            return Err(ProcessorError::Configuration {
                source: "buffer_size must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// What to do with an event whose timestamp is behind the watermark
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LatePolicy {
    /// Discard the event, log it and count it
    #[default]
    Drop,
    /// Halt the pipeline with an ordering violation
    Fail,
}

/// Tumbling window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in milliseconds
    #[serde(default = "default_window_length")]
    pub length_ms: u64,

    /// Out-of-orderness tolerated before an event counts as late (milliseconds)
    #[serde(default)]
    pub lateness_ms: u64,

    /// Handling of late events
    #[serde(default)]
    pub late_policy: LatePolicy,
}

fn default_window_length() -> u64 {
    DAY_MS
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length_ms: default_window_length(),
            lateness_ms: 0,
            late_policy: LatePolicy::Drop,
        }
    }
}

impl WindowConfig {
    /// Create a tumbling window configuration
    pub fn tumbling(length_ms: u64) -> Self {
        Self {
            length_ms,
            ..Default::default()
        }
    }

    /// Validate window configuration
    pub fn validate(&self) -> Result<()> {
        if self.length_ms == 0 {
            return Err(ProcessorError::Configuration {
                source: "window length_ms must be greater than 0".into(),
            });
        }
        if self.length_ms > i64::MAX as u64 || self.lateness_ms > i64::MAX as u64 {
            return Err(ProcessorError::Configuration {
                source: "window durations exceed the supported range".into(),
            });
        }
        Ok(())
    }

    pub fn length(&self) -> Duration {
        Duration::from_millis(self.length_ms)
    }

    pub fn lateness(&self) -> Duration {
        Duration::from_millis(self.lateness_ms)
    }
}

/// Heat pattern configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Daily maximum at or above which a day qualifies
    #[serde(default = "default_threshold")]
    pub threshold_celsius: f64,

    /// Maximum distance between the two qualifying window ends (milliseconds)
    #[serde(default = "default_bound")]
    pub bound_ms: u64,
}

fn default_threshold() -> f64 {
    38.0
}

fn default_bound() -> u64 {
    2 * DAY_MS
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            threshold_celsius: default_threshold(),
            bound_ms: default_bound(),
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_celsius.is_finite() {
            return Err(ProcessorError::Configuration {
                source: "pattern threshold_celsius must be finite".into(),
            });
        }
        if self.bound_ms == 0 || self.bound_ms > i64::MAX as u64 {
            return Err(ProcessorError::Configuration {
                source: "pattern bound_ms must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn bound(&self) -> Duration {
        Duration::from_millis(self.bound_ms)
    }
}

/// Behaviour after a sink exhausts its retries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkFailurePolicy {
    /// Log and count the failure, keep delivering later items
    #[default]
    Continue,
    /// Stop the channel and report the failure at shutdown
    Halt,
}

/// Delivery guarantee of the aggregate channel
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryGuarantee {
    /// Single attempt, failures are not retried
    AtMostOnce,
    /// Retry on failure; the store may see duplicates
    #[default]
    AtLeastOnce,
}

/// Sink delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Maximum warnings per relational write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Inactivity after which a partial warning batch is flushed (milliseconds)
    #[serde(default = "default_batch_interval")]
    pub batch_interval_ms: u64,

    /// Retries for a failed warning batch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retries for a failed aggregate write
    #[serde(default = "default_max_retries")]
    pub aggregate_max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Capacity of each dispatcher queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Behaviour after retries are exhausted
    #[serde(default)]
    pub on_failure: SinkFailurePolicy,

    /// Guarantee applied to aggregate writes
    #[serde(default)]
    pub aggregate_guarantee: DeliveryGuarantee,
}

fn default_batch_size() -> usize {
    1000
}
fn default_batch_interval() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_backoff() -> u64 {
    100
}
fn default_max_backoff() -> u64 {
    10_000
}
fn default_queue_capacity() -> usize {
    10_000
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval(),
            max_retries: default_max_retries(),
            aggregate_max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            queue_capacity: default_queue_capacity(),
            on_failure: SinkFailurePolicy::Continue,
            aggregate_guarantee: DeliveryGuarantee::AtLeastOnce,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ProcessorError::Configuration {
                source: "sink batch_size must be greater than 0".into(),
            });
        }
        if self.batch_interval_ms == 0 {
            return Err(ProcessorError::Configuration {
                source: "sink batch_interval_ms must be greater than 0".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ProcessorError::Configuration {
                source: "sink queue_capacity must be greater than 0".into(),
            });
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(ProcessorError::Configuration {
                source: "sink max_backoff_ms must not be below base_backoff_ms".into(),
            });
        }
        Ok(())
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
