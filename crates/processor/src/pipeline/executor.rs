//! Stream executor for running the weather pipeline
//!
//! This module drives [`WeatherPipeline`] from an async source channel and
//! hands every closed window and warning to the [`SinkDispatcher`].

use crate::error::{ProcessorError, Result, SinkError};
use crate::pipeline::engine::{StepOutput, WeatherPipeline};
use crate::sink::{DispatchReport, SinkDispatcher};
use heatwatch_types::WeatherObservation;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Statistics for the stream executor
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExecutorStats {
    /// Source records received
    pub events_received: u64,

    /// Aggregated records handed to the dispatcher
    pub records_emitted: u64,

    /// Warnings handed to the dispatcher
    pub warnings_emitted: u64,

    /// Last watermark seen by the executor
    pub current_watermark: i64,

    /// Wall-clock run time in milliseconds
    pub elapsed_ms: u64,
}

impl ExecutorStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_events_received(&mut self) {
        self.events_received += 1;
    }

    /// Count the outputs of one step
    pub fn add_output(&mut self, output: &StepOutput) {
        self.records_emitted += output.records.len() as u64;
        self.warnings_emitted += output.warnings.len() as u64;
    }

    pub fn update_watermark(&mut self, watermark: i64) {
        self.current_watermark = watermark;
    }

    /// Fold the stats of another worker into these
    pub fn merge(&mut self, other: &ExecutorStats) {
        self.events_received += other.events_received;
        self.records_emitted += other.records_emitted;
        self.warnings_emitted += other.warnings_emitted;
        self.current_watermark = self.current_watermark.max(other.current_watermark);
    }

    /// Get events per second
    pub fn events_per_second(&self) -> f64 {
        if self.elapsed_ms > 0 {
            self.events_received as f64 * 1000.0 / self.elapsed_ms as f64
        } else {
            0.0
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub stats: ExecutorStats,
    pub dispatch: DispatchReport,
}

/// Hand one step's outputs to the dispatcher, waiting for queue capacity
pub(crate) async fn dispatch_output(dispatcher: &SinkDispatcher, output: StepOutput) -> Result<()> {
    for record in output.records {
        dispatcher.enqueue_aggregate(record).await?;
    }
    for warning in output.warnings {
        dispatcher.enqueue_warning(warning).await?;
    }
    Ok(())
}

/// Settle a run once the dispatcher has drained
///
/// A halted sink channel fails the run with the error that halted it, which
/// also replaces the `Closed` error seen by an enqueue racing the halt.
pub(crate) fn settle(
    outcome: Result<()>,
    stats: ExecutorStats,
    dispatch: DispatchReport,
) -> Result<ExecutionReport> {
    let halted = dispatch.aggregates.halted || dispatch.warnings.halted;
    let sink_failure = dispatch.first_error().cloned().map(ProcessorError::Sink);

    match outcome {
        Err(ProcessorError::Sink(SinkError::Closed { channel })) => {
            Err(sink_failure.unwrap_or(ProcessorError::Sink(SinkError::Closed { channel })))
        }
        Err(err) => Err(err),
        Ok(()) if halted => Err(sink_failure.unwrap_or_else(|| {
            ProcessorError::Unexpected("sink channel halted without an error".to_string())
        })),
        Ok(()) => Ok(ExecutionReport { stats, dispatch }),
    }
}

/// Single-worker executor
///
/// Reads source records until the channel closes, runs them through the
/// pipeline and queues the outputs. A fatal processing error stops
/// ingestion; open windows and partial matches are then discarded.
///
/// # Example
///
/// ```rust,no_run
/// use processor::pipeline::StreamPipelineBuilder;
/// use heatwatch_types::WeatherObservation;
///
/// # async fn example() -> anyhow::Result<()> {
/// let executor = StreamPipelineBuilder::new()
///     .with_name("daily-max")
///     .with_threshold(38.0)
///     .build()?
///     .create_executor()?;
///
/// let (input, handle) = executor.spawn();
/// input.send(WeatherObservation::new("S1", "2024-07-01T12:00:00", Some(40.0))).await?;
/// drop(input);
///
/// let report = handle.await??;
/// println!("{} records emitted", report.stats.records_emitted);
/// # Ok(())
/// # }
/// ```
pub struct StreamExecutor {
    name: String,
    pipeline: WeatherPipeline,
    dispatcher: SinkDispatcher,
    flush_on_shutdown: bool,
    buffer_size: usize,
    stats: ExecutorStats,
}

impl StreamExecutor {
    pub fn new(
        name: impl Into<String>,
        pipeline: WeatherPipeline,
        dispatcher: SinkDispatcher,
        flush_on_shutdown: bool,
        buffer_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline,
            dispatcher,
            flush_on_shutdown,
            buffer_size: buffer_size.max(1),
            stats: ExecutorStats::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run on a background task fed by the returned sender
    ///
    /// Dropping the sender ends the input and lets the run complete.
    pub fn spawn(
        self,
    ) -> (
        mpsc::Sender<WeatherObservation>,
        JoinHandle<Result<ExecutionReport>>,
    ) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        (tx, tokio::spawn(self.run(rx)))
    }

    /// Process records until the input closes or a fatal error occurs
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<WeatherObservation>,
    ) -> Result<ExecutionReport> {
        info!(pipeline = %self.name, "Starting stream executor");
        let started = Instant::now();

        let mut outcome = self.consume(&mut input).await;
        if outcome.is_ok() {
            outcome = self.finish().await;
        } else {
            input.close();
            let discarded = self.pipeline.open_windows();
            if self.pipeline.finish(false).is_ok() {
                debug!(open_windows = discarded, "Discarded pipeline state after failure");
            }
        }

        let StreamExecutor {
            name,
            dispatcher,
            mut stats,
            ..
        } = self;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        let dispatch = dispatcher.shutdown().await;
        let result = settle(outcome, stats, dispatch);
        match &result {
            Ok(report) => info!(
                pipeline = %name,
                events = report.stats.events_received,
                records = report.stats.records_emitted,
                warnings = report.stats.warnings_emitted,
                "Stream executor finished"
            ),
            Err(e) => error!(pipeline = %name, error = %e, "Stream executor failed"),
        }
        result
    }

    async fn consume(&mut self, input: &mut mpsc::Receiver<WeatherObservation>) -> Result<()> {
        while let Some(event) = input.recv().await {
            trace!(station = %event.station, date = %event.date, "Processing event");
            self.stats.inc_events_received();

            let output = self.pipeline.process(&event).map_err(|e| {
                error!(
                    station = %event.station,
                    date = %event.date,
                    error = %e,
                    "Halting on fatal input error"
                );
                e
            })?;
            self.stats
                .update_watermark(self.pipeline.watermark().timestamp);
            self.emit(output).await?;
        }
        debug!("Input channel closed");
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let output = self.pipeline.finish(self.flush_on_shutdown)?;
        self.emit(output).await
    }

    async fn emit(&mut self, output: StepOutput) -> Result<()> {
        if output.is_empty() {
            return Ok(());
        }
        self.stats.add_output(&output);
        dispatch_output(&self.dispatcher, output).await
    }
}
