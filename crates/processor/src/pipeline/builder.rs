//! Stream pipeline builder for fluent API configuration
//!
//! This module assembles a [`StreamPipeline`] from a [`ProcessorConfig`] plus
//! per-field overrides and the two output stores.

use crate::config::{LatePolicy, ProcessorConfig, SinkFailurePolicy};
use crate::error::{ProcessorError, Result};
use crate::metrics::{MetricsRegistry, PipelineMetrics};
use crate::pipeline::engine::WeatherPipeline;
use crate::pipeline::executor::StreamExecutor;
use crate::pipeline::sharded::ShardedExecutor;
use crate::sink::{
    AnalyticalStore, InMemoryAnalyticalStore, InMemoryRelationalStore, RelationalStore,
    SinkDispatcher,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Configuration for a stream processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name for identification
    pub name: String,

    /// Processor configuration
    pub processor: ProcessorConfig,

    /// Description of the pipeline
    pub description: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "heatwatch".to_string(),
            processor: ProcessorConfig::default(),
            description: None,
        }
    }
}

impl PipelineConfig {
    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ProcessorError::Configuration {
                source: "pipeline name cannot be empty".into(),
            });
        }

        self.processor.validate()?;
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for constructing stream processing pipelines
///
/// # Example
///
/// ```rust
/// use processor::pipeline::StreamPipelineBuilder;
/// use std::time::Duration;
///
/// # fn example() -> anyhow::Result<()> {
/// let pipeline = StreamPipelineBuilder::new()
///     .with_name("daily-heat")
///     .with_threshold(38.0)
///     .with_pattern_bound(Duration::from_secs(2 * 24 * 3600))
///     .with_lateness(Duration::from_secs(3600))
///     .with_batch_size(500)
///     .build()?;
///
/// assert_eq!(pipeline.config().processor.sink.batch_size, 500);
/// # Ok(())
/// # }
/// ```
pub struct StreamPipelineBuilder {
    config: PipelineConfig,
    analytical: Option<Arc<dyn AnalyticalStore>>,
    relational: Option<Arc<dyn RelationalStore>>,
    metrics: Option<PipelineMetrics>,
}

impl Default for StreamPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamPipelineBuilder {
    /// Create a new pipeline builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            analytical: None,
            relational: None,
            metrics: None,
        }
    }

    /// Start from a loaded processor configuration
    pub fn from_config(processor: ProcessorConfig) -> Self {
        Self::new().with_config(processor)
    }

    pub fn with_config(mut self, processor: ProcessorConfig) -> Self {
        self.config.processor = processor;
        self
    }

    /// Set the pipeline name
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the pipeline description
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Set the number of shard workers
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.config.processor.parallelism = parallelism;
        self
    }

    /// Set the capacity of the input channels
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.processor.buffer_size = buffer_size;
        self
    }

    /// Set the tumbling window length
    pub fn with_window_length(mut self, length: Duration) -> Self {
        self.config.processor.window.length_ms = millis(length);
        self
    }

    /// Hold the watermark back by `lateness` behind the newest event
    ///
    /// # Example
    ///
    /// ```rust
    /// # use processor::pipeline::StreamPipelineBuilder;
    /// # use std::time::Duration;
    /// let builder = StreamPipelineBuilder::new()
    ///     .with_lateness(Duration::from_secs(10 * 60));
    /// ```
    pub fn with_lateness(mut self, lateness: Duration) -> Self {
        self.config.processor.window.lateness_ms = millis(lateness);
        self
    }

    pub fn with_late_policy(mut self, policy: LatePolicy) -> Self {
        self.config.processor.window.late_policy = policy;
        self
    }

    /// Set the temperature a daily maximum must reach to qualify
    pub fn with_threshold(mut self, celsius: f64) -> Self {
        self.config.processor.pattern.threshold_celsius = celsius;
        self
    }

    /// Set the largest allowed distance between two matched window ends
    pub fn with_pattern_bound(mut self, bound: Duration) -> Self {
        self.config.processor.pattern.bound_ms = millis(bound);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.processor.sink.batch_size = batch_size;
        self
    }

    /// Flush a partial warning batch after this much inactivity
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.config.processor.sink.batch_interval_ms = millis(interval);
        self
    }

    /// Set the re-attempts of the warning channel
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.processor.sink.max_retries = retries;
        self
    }

    pub fn with_sink_failure_policy(mut self, policy: SinkFailurePolicy) -> Self {
        self.config.processor.sink.on_failure = policy;
        self
    }

    /// Emit open windows instead of discarding them at end of input
    pub fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.config.processor.flush_on_shutdown = flush;
        self
    }

    /// Set the store receiving aggregated records
    pub fn with_analytical_store(mut self, store: Arc<dyn AnalyticalStore>) -> Self {
        self.analytical = Some(store);
        self
    }

    /// Set the store receiving warnings
    pub fn with_relational_store(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.relational = Some(store);
        self
    }

    /// Export the pipeline metrics through `registry`
    pub fn with_metrics_registry(mut self, registry: &MetricsRegistry) -> Self {
        self.metrics = Some(PipelineMetrics::registered(registry));
        self
    }

    /// Build the pipeline with the configured settings
    ///
    /// Stores that were not set fall back to in-memory ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<StreamPipeline> {
        self.config.validate()?;

        let analytical = self.analytical.unwrap_or_else(|| {
            warn!("No analytical store configured, records are kept in memory");
            Arc::new(InMemoryAnalyticalStore::new())
        });
        let relational = self.relational.unwrap_or_else(|| {
            warn!("No relational store configured, warnings are kept in memory");
            Arc::new(InMemoryRelationalStore::new())
        });

        Ok(StreamPipeline {
            config: Arc::new(self.config),
            analytical,
            relational,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

/// A configured stream processing pipeline
///
/// Creates the synchronous core or one of the executors. Executors spawn the
/// sink workers and must be created inside a tokio runtime.
#[derive(Clone)]
pub struct StreamPipeline {
    config: Arc<PipelineConfig>,
    analytical: Arc<dyn AnalyticalStore>,
    relational: Arc<dyn RelationalStore>,
    metrics: PipelineMetrics,
}

impl StreamPipeline {
    /// Get the pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the pipeline name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the pipeline description
    pub fn description(&self) -> Option<&str> {
        self.config.description.as_deref()
    }

    /// Metrics shared by everything this pipeline creates
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Create the single-threaded core without any sink
    pub fn create_pipeline(&self) -> Result<WeatherPipeline> {
        WeatherPipeline::new(&self.config.processor, self.metrics.clone())
    }

    fn start_dispatcher(&self) -> SinkDispatcher {
        SinkDispatcher::start(
            &self.config.processor.sink,
            Arc::clone(&self.analytical),
            Arc::clone(&self.relational),
            self.metrics.clone(),
        )
    }

    /// Create a single-worker executor
    pub fn create_executor(&self) -> Result<StreamExecutor> {
        let pipeline = self.create_pipeline()?;
        let processor = &self.config.processor;
        Ok(StreamExecutor::new(
            self.name(),
            pipeline,
            self.start_dispatcher(),
            processor.flush_on_shutdown,
            processor.buffer_size,
        ))
    }

    /// Create an executor with one worker per configured shard
    pub fn create_sharded_executor(&self) -> Result<ShardedExecutor> {
        ShardedExecutor::new(
            self.name(),
            self.config.processor.clone(),
            self.start_dispatcher(),
            self.metrics.clone(),
        )
    }
}

impl std::fmt::Debug for StreamPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPipeline")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let pipeline = StreamPipelineBuilder::new().build().unwrap();
        assert_eq!(pipeline.name(), "heatwatch");
        assert_eq!(pipeline.config().processor, ProcessorConfig::default());
    }

    #[test]
    fn test_builder_with_name() {
        let pipeline = StreamPipelineBuilder::new()
            .with_name("test-pipeline")
            .with_description("Daily maxima")
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "test-pipeline");
        assert_eq!(pipeline.description(), Some("Daily maxima"));
    }

    #[test]
    fn test_builder_duration_overrides() {
        let pipeline = StreamPipelineBuilder::new()
            .with_window_length(Duration::from_secs(3600))
            .with_lateness(Duration::from_secs(60))
            .with_pattern_bound(Duration::from_secs(7200))
            .with_batch_interval(Duration::from_millis(50))
            .build()
            .unwrap();

        let processor = &pipeline.config().processor;
        assert_eq!(processor.window.length_ms, 3_600_000);
        assert_eq!(processor.window.lateness_ms, 60_000);
        assert_eq!(processor.pattern.bound_ms, 7_200_000);
        assert_eq!(processor.sink.batch_interval_ms, 50);
    }

    #[test]
    fn test_builder_fluent_api() {
        let pipeline = StreamPipelineBuilder::new()
            .with_threshold(35.5)
            .with_parallelism(4)
            .with_buffer_size(64)
            .with_batch_size(10)
            .with_max_retries(2)
            .with_late_policy(LatePolicy::Fail)
            .with_sink_failure_policy(SinkFailurePolicy::Halt)
            .with_flush_on_shutdown(true)
            .build()
            .unwrap();

        let processor = &pipeline.config().processor;
        assert_eq!(processor.pattern.threshold_celsius, 35.5);
        assert_eq!(processor.parallelism, 4);
        assert_eq!(processor.buffer_size, 64);
        assert_eq!(processor.sink.batch_size, 10);
        assert_eq!(processor.sink.max_retries, 2);
        assert_eq!(processor.window.late_policy, LatePolicy::Fail);
        assert_eq!(processor.sink.on_failure, SinkFailurePolicy::Halt);
        assert!(processor.flush_on_shutdown);
    }

    #[test]
    fn test_pipeline_validation_fails_on_empty_name() {
        let result = StreamPipelineBuilder::new().with_name("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_validation_fails_on_zero_window() {
        let result = StreamPipelineBuilder::new()
            .with_window_length(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_registry_exports_pipeline_metrics() {
        let registry = MetricsRegistry::new();
        let pipeline = StreamPipelineBuilder::new()
            .with_metrics_registry(&registry)
            .build()
            .unwrap();

        pipeline.metrics().record_warning();
        let text = registry.encode().unwrap();
        assert!(text.contains("heatwatch_warnings_emitted"));
    }

    #[tokio::test]
    async fn test_pipeline_create_executor() {
        let pipeline = StreamPipelineBuilder::new().build().unwrap();
        let executor = pipeline.create_executor().unwrap();
        assert_eq!(executor.name(), "heatwatch");

        let (tx, handle) = executor.spawn();
        drop(tx);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stats.events_received, 0);
    }
}
