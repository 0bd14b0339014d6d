//! Stream processing pipeline module
//!
//! This module wires the processing stages into runnable pipelines:
//! - [`WeatherPipeline`]: the synchronous, deterministic core
//! - [`StreamExecutor`]: a single async worker feeding the sink dispatcher
//! - [`ShardedExecutor`]: stations spread over several workers by key hash
//! - [`StreamPipelineBuilder`]: fluent construction from configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use processor::pipeline::StreamPipelineBuilder;
//! use heatwatch_types::WeatherObservation;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = StreamPipelineBuilder::new()
//!     .with_name("daily-heat")
//!     .with_parallelism(4)
//!     .build()?;
//!
//! let (input, handle) = pipeline.create_sharded_executor()?.spawn();
//! input.send(WeatherObservation::new("725030", "2024-07-01T12:00:00", Some(39.4))).await?;
//! drop(input);
//!
//! let report = handle.await??;
//! println!("{:?}", report.dispatch);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod engine;
pub mod executor;
pub mod sharded;

pub use builder::{PipelineConfig, StreamPipeline, StreamPipelineBuilder};
pub use engine::{StationStage, StepOutput, WeatherPipeline};
pub use executor::{ExecutionReport, ExecutorStats, StreamExecutor};
pub use sharded::ShardedExecutor;
