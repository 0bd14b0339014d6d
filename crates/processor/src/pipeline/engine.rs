//! Synchronous processing core
//!
//! [`WeatherPipeline`] runs one source record at a time through
//! filter, timestamp extraction, window aggregation, watermark advance and
//! pattern matching. It performs no I/O and reads no clock, so a fixed input
//! sequence always yields the same outputs.

use crate::aggregation::{IngestOutcome, KeyedWindowAggregator};
use crate::config::ProcessorConfig;
use crate::core::{AscendingTimestampExtractor, EventFilter, NonNullTemperatureFilter};
use crate::error::Result;
use crate::metrics::{ObservationResult, PipelineMetrics};
use crate::pattern::PatternMatcher;
use crate::watermark::{Watermark, WatermarkGenerator, WatermarkTracker};
use heatwatch_types::{AggregatedRecord, Observation, WarningEvent, WeatherObservation};
use tracing::{debug, trace};

/// Outputs produced by one processing step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Windows closed by the step, ordered by window end then station
    pub records: Vec<AggregatedRecord>,
    /// Warnings completed by those windows
    pub warnings: Vec<WarningEvent>,
}

impl StepOutput {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.warnings.is_empty()
    }

    pub fn extend(&mut self, other: StepOutput) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
    }
}

/// Per-station state: open windows and partial matches
///
/// Only ever touched by the worker owning its stations. Watermarks are
/// supplied from outside, which lets several shards follow one global
/// watermark.
#[derive(Debug)]
pub struct StationStage {
    aggregator: KeyedWindowAggregator,
    matcher: PatternMatcher,
    metrics: PipelineMetrics,
    open_windows: usize,
}

impl StationStage {
    pub fn new(config: &ProcessorConfig, metrics: PipelineMetrics) -> Result<Self> {
        Ok(Self {
            aggregator: KeyedWindowAggregator::from_config(&config.window)?,
            matcher: PatternMatcher::from_config(&config.pattern)?,
            metrics,
            open_windows: 0,
        })
    }

    /// Add an observation to its window
    pub fn ingest(&mut self, observation: &Observation) -> Result<IngestOutcome> {
        let outcome = self.aggregator.ingest(observation)?;
        match outcome {
            IngestOutcome::Ingested => {
                self.metrics.record_observation(ObservationResult::Ingested);
                self.sync_open_windows();
            }
            IngestOutcome::LateEventDropped(_) => {
                self.metrics.record_observation(ObservationResult::LateDropped);
            }
            IngestOutcome::InvalidReading => {
                self.metrics.record_observation(ObservationResult::Filtered);
            }
        }
        Ok(outcome)
    }

    /// Close the windows the watermark reached, match them, then expire
    /// partial matches that can no longer complete
    pub fn apply_watermark(&mut self, watermark: Watermark) -> Result<StepOutput> {
        let records = self.aggregator.on_watermark(watermark)?;
        let output = self.match_records(records);

        let expired = self.matcher.on_watermark(watermark);
        if expired > 0 {
            self.metrics.record_partials_expired(expired);
        }
        self.sync_open_windows();

        if !output.is_empty() {
            debug!(
                watermark = %watermark,
                records = output.records.len(),
                warnings = output.warnings.len(),
                "Watermark produced output"
            );
        }
        Ok(output)
    }

    /// Empty all state at shutdown
    ///
    /// With `flush` the open windows are emitted and matched like closed ones;
    /// partial matches are always discarded.
    pub fn finish(&mut self, flush: bool) -> Result<StepOutput> {
        let records = self.aggregator.drain(flush)?;
        let output = self.match_records(records);
        let discarded = self.matcher.drain();
        self.sync_open_windows();

        debug!(
            flushed = output.records.len(),
            partial_matches_discarded = discarded,
            "Station stage finished"
        );
        Ok(output)
    }

    pub fn watermark(&self) -> Watermark {
        self.aggregator.watermark()
    }

    pub fn open_windows(&self) -> usize {
        self.aggregator.open_windows()
    }

    pub fn partial_matches(&self) -> usize {
        self.matcher.partial_matches()
    }

    fn match_records(&mut self, records: Vec<AggregatedRecord>) -> StepOutput {
        let warnings: Vec<WarningEvent> = records
            .iter()
            .filter_map(|record| self.matcher.on_record(record))
            .collect();

        self.metrics.record_windows_emitted(records.len());
        for _ in &warnings {
            self.metrics.record_warning();
        }
        StepOutput { records, warnings }
    }

    fn sync_open_windows(&mut self) {
        let open = self.aggregator.open_windows();
        if open != self.open_windows {
            self.metrics
                .adjust_open_windows(open as i64 - self.open_windows as i64);
            self.open_windows = open;
        }
    }
}

/// Single-threaded weather pipeline
///
/// # Example
///
/// ```rust
/// use processor::config::ProcessorConfig;
/// use processor::metrics::PipelineMetrics;
/// use processor::pipeline::WeatherPipeline;
/// use heatwatch_types::WeatherObservation;
///
/// # fn main() -> processor::ProcessorResult<()> {
/// let mut pipeline = WeatherPipeline::new(&ProcessorConfig::default(), PipelineMetrics::new())?;
///
/// pipeline.process(&WeatherObservation::new("S1", "2024-07-01T12:00:00", Some(40.0)))?;
/// let next_day = WeatherObservation::new("S1", "2024-07-02T12:00:00", Some(39.0));
/// let output = pipeline.process(&next_day)?;
///
/// assert_eq!(output.records.len(), 1);
/// assert_eq!(output.records[0].max_temperature, 40.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WeatherPipeline {
    filter: NonNullTemperatureFilter,
    extractor: AscendingTimestampExtractor,
    tracker: WatermarkTracker,
    stage: StationStage,
    metrics: PipelineMetrics,
}

impl WeatherPipeline {
    pub fn new(config: &ProcessorConfig, metrics: PipelineMetrics) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            filter: NonNullTemperatureFilter,
            extractor: AscendingTimestampExtractor,
            tracker: WatermarkTracker::new(config.window.lateness(), config.window.late_policy),
            stage: StationStage::new(config, metrics.clone())?,
            metrics,
        })
    }

    /// Process one source record
    ///
    /// Errors are fatal for the whole stream: a malformed timestamp, or an
    /// out-of-order event under the failing late policy. Late events under the
    /// dropping policy are counted and yield an empty output.
    pub fn process(&mut self, event: &WeatherObservation) -> Result<StepOutput> {
        if !self.filter.accept(event) {
            trace!(
                station = %event.station,
                date = %event.date,
                "Filtered reading without temperature"
            );
            self.metrics.record_observation(ObservationResult::Filtered);
            return Ok(StepOutput::default());
        }

        let observation = self.extractor.extract(event)?;
        let event_time = observation.timestamp_millis();
        self.tracker.check_order(event_time)?;

        if self.stage.ingest(&observation)?.is_dropped() {
            return Ok(StepOutput::default());
        }

        match self.tracker.on_event(event_time) {
            Some(watermark) => {
                self.metrics.set_watermark(watermark);
                self.stage.apply_watermark(watermark)
            }
            None => Ok(StepOutput::default()),
        }
    }

    /// Process a sequence of records, collecting every output in order
    pub fn process_all<'a, I>(&mut self, events: I) -> Result<StepOutput>
    where
        I: IntoIterator<Item = &'a WeatherObservation>,
    {
        let mut output = StepOutput::default();
        for event in events {
            output.extend(self.process(event)?);
        }
        Ok(output)
    }

    /// Drain the pipeline at end of input
    pub fn finish(&mut self, flush: bool) -> Result<StepOutput> {
        self.stage.finish(flush)
    }

    pub fn watermark(&self) -> Watermark {
        self.tracker.current_watermark()
    }

    pub fn open_windows(&self) -> usize {
        self.stage.open_windows()
    }

    pub fn partial_matches(&self) -> usize {
        self.stage.partial_matches()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}
