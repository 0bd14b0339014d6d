//! Keyed tumbling-window aggregation
//!
//! One [`MaxByAggregator`] is kept per `(station, window)` until the
//! watermark reaches the window end, at which point the window is emitted as
//! an [`AggregatedRecord`] exactly once and its accumulator discarded.

use super::maxby::MaxByAggregator;
use super::trait_::Aggregator;
use crate::config::WindowConfig;
use crate::core::{KeyExtractor, StationKeyExtractor};
use crate::error::{Result, WindowError, WindowResult};
use crate::watermark::Watermark;
use crate::window::{
    OnWatermarkTrigger, TriggerResult, TumblingWindowAssigner, Window, WindowAssigner,
    WindowTrigger,
};
use chrono::Duration;
use heatwatch_types::{AggregatedRecord, Observation, WindowKey};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Result of routing one observation into the aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The observation updated its window accumulator
    Ingested,
    /// The observation was behind the watermark and discarded
    LateEventDropped(WindowError),
    /// The observation carried no finite temperature and was discarded
    InvalidReading,
}

impl IngestOutcome {
    /// Whether the observation left every window untouched
    pub fn is_dropped(&self) -> bool {
        !matches!(self, IngestOutcome::Ingested)
    }
}

/// Daily maximum per station over tumbling event-time windows
#[derive(Debug)]
pub struct KeyedWindowAggregator {
    assigner: TumblingWindowAssigner,
    trigger: OnWatermarkTrigger,
    keys: StationKeyExtractor,
    windows: HashMap<WindowKey, MaxByAggregator>,
    watermark: Watermark,
}

impl KeyedWindowAggregator {
    /// Create an aggregator with windows of the given length
    pub fn new(window_length: Duration) -> WindowResult<Self> {
        if window_length <= Duration::zero() {
            return Err(WindowError::InvalidWindowSize {
                size: window_length.num_milliseconds().max(0) as u64,
            });
        }
        Ok(Self {
            assigner: TumblingWindowAssigner::new(window_length),
            trigger: OnWatermarkTrigger::new(),
            keys: StationKeyExtractor,
            windows: HashMap::new(),
            watermark: Watermark::min(),
        })
    }

    /// Create an aggregator from window configuration
    pub fn from_config(config: &WindowConfig) -> WindowResult<Self> {
        let length = Duration::from_std(config.length())
            .map_err(|_| WindowError::InvalidWindowSize { size: config.length_ms })?;
        Self::new(length)
    }

    /// Route an observation to the accumulator of its window
    ///
    /// Observations older than the watermark are dropped: their window has
    /// either been emitted already or can no longer be reached. Readings
    /// without a finite temperature are rejected before any window is
    /// created.
    pub fn ingest(&mut self, observation: &Observation) -> Result<IngestOutcome> {
        if !observation.temperature().is_some_and(f64::is_finite) {
            warn!(
                station = observation.station(),
                temperature = ?observation.temperature(),
                "Dropping reading without a finite temperature"
            );
            return Ok(IngestOutcome::InvalidReading);
        }

        let event_time = observation.timestamp_millis();
        if event_time < self.watermark.timestamp {
            let late = WindowError::LateEvent {
                event_time,
                watermark: self.watermark.timestamp,
                late_by: self.watermark.timestamp.saturating_sub(event_time),
            };
            warn!(
                station = observation.station(),
                event_time = event_time,
                watermark = self.watermark.timestamp,
                "Dropping late event"
            );
            return Ok(IngestOutcome::LateEventDropped(late));
        }

        let station = self.keys.extract_key(observation);
        for window in self.assigner.assign_windows(observation.timestamp()) {
            let key = window.key_for(station);
            trace!(window = %key, temperature = ?observation.temperature(), "Updating window");
            self.windows
                .entry(key)
                .or_insert_with(MaxByAggregator::new)
                .update(observation.clone())?;
        }
        Ok(IngestOutcome::Ingested)
    }

    /// Close every window the watermark has reached
    ///
    /// Records are returned ordered by window end, then station. A watermark
    /// that does not advance closes nothing.
    pub fn on_watermark(&mut self, watermark: Watermark) -> Result<Vec<AggregatedRecord>> {
        if watermark <= self.watermark {
            return Ok(Vec::new());
        }
        self.watermark = watermark;

        let trigger = self.trigger;
        let closed: Vec<WindowKey> = self
            .windows
            .keys()
            .filter(|key| {
                trigger.on_watermark(&Window::from(*key), watermark) == TriggerResult::FireAndPurge
            })
            .cloned()
            .collect();

        let records = self.emit(closed);
        if !records.is_empty() {
            debug!(
                watermark = %watermark,
                closed = records.len(),
                open = self.windows.len(),
                "Closed windows"
            );
        }
        Ok(records)
    }

    /// Empty the aggregator at shutdown
    ///
    /// Open windows are emitted only when `flush` is set; otherwise they are
    /// discarded as incomplete.
    pub fn drain(&mut self, flush: bool) -> Result<Vec<AggregatedRecord>> {
        let mut fired = Vec::new();
        for key in self.windows.keys() {
            if self.trigger.on_shutdown(&Window::from(key), flush) == TriggerResult::FireAndPurge {
                fired.push(key.clone());
            }
        }

        let records = self.emit(fired);
        let discarded = self.windows.len();
        self.windows.clear();
        debug!(
            flushed = records.len(),
            discarded = discarded,
            "Drained window aggregator"
        );
        Ok(records)
    }

    /// Number of windows still accumulating
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    /// Watermark last applied to this aggregator
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Remove and finalize the given windows
    ///
    /// A window that cannot be finalized is discarded on its own; the other
    /// windows are still emitted.
    fn emit(&mut self, mut keys: Vec<WindowKey>) -> Vec<AggregatedRecord> {
        keys.sort_by(|a, b| {
            a.window_end
                .cmp(&b.window_end)
                .then_with(|| a.station.cmp(&b.station))
        });

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(finalized) = self.windows.get(&key).map(|agg| agg.finalize()) else {
                continue;
            };
            self.windows.remove(&key);
            match finalized {
                Ok(max) => records.push(AggregatedRecord::new(key, max.temperature, max.timestamp)),
                Err(e) => warn!(window = %key, error = %e, "Discarding window without a maximum"),
            }
        }
        records
    }
}
