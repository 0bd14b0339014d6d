use super::labels::{ObservationLabels, ObservationResult, SinkChannel, SinkLabels, SinkOutcome};
use super::registry::MetricsRegistry;
use crate::watermark::Watermark;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use serde::{Deserialize, Serialize};

/// Counters and gauges describing one pipeline
///
/// Clones share the same underlying series, so a single instance can be
/// handed to the executor and to both sink workers.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    observations: Family<ObservationLabels, Counter>,
    windows_emitted: Counter,
    warnings_emitted: Counter,
    partial_matches_expired: Counter,
    sink_events: Family<SinkLabels, Counter>,
    watermark: Gauge,
    open_windows: Gauge,
}

impl PipelineMetrics {
    /// Metrics that are not exported anywhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics registered in the given registry
    pub fn registered(registry: &MetricsRegistry) -> Self {
        let metrics = Self::new();
        metrics.register(registry);
        metrics
    }

    pub fn register(&self, registry: &MetricsRegistry) {
        registry.register(
            "heatwatch_observations",
            "Observations seen by the pipeline, by result",
            self.observations.clone(),
        );
        registry.register(
            "heatwatch_windows_emitted",
            "Daily windows closed and emitted",
            self.windows_emitted.clone(),
        );
        registry.register(
            "heatwatch_warnings_emitted",
            "Heat warnings produced by the pattern matcher",
            self.warnings_emitted.clone(),
        );
        registry.register(
            "heatwatch_partial_matches_expired",
            "Partial pattern matches discarded at their deadline",
            self.partial_matches_expired.clone(),
        );
        registry.register(
            "heatwatch_sink_events",
            "Sink delivery attempts, by channel and outcome",
            self.sink_events.clone(),
        );
        registry.register(
            "heatwatch_watermark_millis",
            "Current event-time watermark in epoch milliseconds",
            self.watermark.clone(),
        );
        registry.register(
            "heatwatch_open_windows",
            "Windows still accumulating",
            self.open_windows.clone(),
        );
    }

    pub fn record_observation(&self, result: ObservationResult) {
        self.observations
            .get_or_create(&ObservationLabels { result })
            .inc();
    }

    pub fn record_windows_emitted(&self, count: usize) {
        self.windows_emitted.inc_by(count as u64);
    }

    pub fn record_warning(&self) {
        self.warnings_emitted.inc();
    }

    pub fn record_partials_expired(&self, count: usize) {
        self.partial_matches_expired.inc_by(count as u64);
    }

    pub fn record_sink(&self, channel: SinkChannel, outcome: SinkOutcome, count: u64) {
        self.sink_events
            .get_or_create(&SinkLabels { channel, outcome })
            .inc_by(count);
    }

    pub fn set_watermark(&self, watermark: Watermark) {
        self.watermark.set(watermark.timestamp);
    }

    /// Shift the open window gauge; shards report their own deltas
    pub fn adjust_open_windows(&self, delta: i64) {
        self.open_windows.inc_by(delta);
    }

    fn observation_count(&self, result: ObservationResult) -> u64 {
        self.observations
            .get_or_create(&ObservationLabels { result })
            .get()
    }

    fn sink_count(&self, channel: SinkChannel, outcome: SinkOutcome) -> u64 {
        self.sink_events
            .get_or_create(&SinkLabels { channel, outcome })
            .get()
    }

    /// Point-in-time copy of every value
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            observations_ingested: self.observation_count(ObservationResult::Ingested),
            observations_filtered: self.observation_count(ObservationResult::Filtered),
            late_events_dropped: self.observation_count(ObservationResult::LateDropped),
            windows_emitted: self.windows_emitted.get(),
            warnings_emitted: self.warnings_emitted.get(),
            partial_matches_expired: self.partial_matches_expired.get(),
            aggregates_delivered: self.sink_count(SinkChannel::Aggregates, SinkOutcome::Delivered),
            aggregates_failed: self.sink_count(SinkChannel::Aggregates, SinkOutcome::Failed),
            warnings_delivered: self.sink_count(SinkChannel::Warnings, SinkOutcome::Delivered),
            warnings_failed: self.sink_count(SinkChannel::Warnings, SinkOutcome::Failed),
            sink_retries: self.sink_count(SinkChannel::Aggregates, SinkOutcome::Retried)
                + self.sink_count(SinkChannel::Warnings, SinkOutcome::Retried),
            watermark_millis: self.watermark.get(),
            open_windows: self.open_windows.get(),
        }
    }
}

/// Serializable copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub observations_ingested: u64,
    pub observations_filtered: u64,
    pub late_events_dropped: u64,
    pub windows_emitted: u64,
    pub warnings_emitted: u64,
    pub partial_matches_expired: u64,
    pub aggregates_delivered: u64,
    pub aggregates_failed: u64,
    pub warnings_delivered: u64,
    pub warnings_failed: u64,
    pub sink_retries: u64,
    pub watermark_millis: i64,
    pub open_windows: i64,
}
