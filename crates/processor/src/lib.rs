//! Event-time stream processor for station temperature readings
//!
//! This crate turns a near-ordered stream of weather observations into
//! daily maximum temperatures per station and raises heat warnings when a
//! station reaches the threshold twice within a bounded time.

pub mod aggregation;
pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod pattern;
pub mod pipeline;
pub mod sink;
pub mod telemetry;
pub mod watermark;
pub mod window;

// Re-export commonly used types
pub use core::{
    AscendingTimestampExtractor, EventFilter, EventTimeExtractor, KeyExtractor,
    NonNullTemperatureFilter, StationKeyExtractor,
};

pub use window::{
    OnWatermarkTrigger, TriggerResult, TumblingWindowAssigner, Window, WindowAssigner,
    WindowBounds, WindowTrigger,
};

pub use aggregation::{IngestOutcome, KeyedWindowAggregator, MaxByAggregator};

pub use pattern::{PartialMatch, PatternMatcher, PatternState};

pub use watermark::{Watermark, WatermarkCoordinator, WatermarkGenerator, WatermarkTracker};

pub use error::{
    PatternError, ProcessorError, SinkError, WatermarkError, WindowError,
    Result as ProcessorResult,
};

pub use config::{
    DeliveryGuarantee, LatePolicy, PatternConfig, ProcessorConfig, SinkConfig,
    SinkFailurePolicy, WindowConfig,
};

pub use pipeline::{
    ExecutionReport, ExecutorStats, PipelineConfig, ShardedExecutor, StepOutput,
    StreamExecutor, StreamPipeline, StreamPipelineBuilder, WeatherPipeline,
};

pub use sink::{
    AnalyticalStore, DispatchReport, InMemoryAnalyticalStore, InMemoryRelationalStore,
    RelationalStore, SinkDispatcher,
};

pub use metrics::{MetricsRegistry, MetricsSnapshot, PipelineMetrics};
