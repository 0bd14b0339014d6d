use super::retry::RetryPolicy;
use super::{AnalyticalStore, RelationalStore};
use crate::config::{SinkConfig, SinkFailurePolicy};
use crate::error::{SinkError, SinkResult};
use crate::metrics::{PipelineMetrics, SinkChannel, SinkOutcome};
use heatwatch_types::{AggregatedRecord, WarningEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Delivery totals of one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelReport {
    /// Records acknowledged by the store
    pub delivered: u64,
    /// Records given up on after retries or a fatal error
    pub failed: u64,
    /// Re-attempts made
    pub retries: u64,
    /// Records left queued when the channel halted
    pub abandoned: u64,
    /// Whether the worker stopped on a failure
    pub halted: bool,
    #[serde(skip)]
    pub first_error: Option<SinkError>,
}

impl ChannelReport {
    fn record_failure(&mut self, error: SinkError, count: u64) {
        self.failed += count;
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }
}

/// Delivery totals returned by [`SinkDispatcher::shutdown`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub aggregates: ChannelReport,
    pub warnings: ChannelReport,
}

impl DispatchReport {
    /// First unrecoverable error, aggregates first
    pub fn first_error(&self) -> Option<&SinkError> {
        self.aggregates
            .first_error
            .as_ref()
            .or(self.warnings.first_error.as_ref())
    }

    /// Whether every enqueued record was delivered
    pub fn is_clean(&self) -> bool {
        self.first_error().is_none()
            && self.aggregates.abandoned == 0
            && self.warnings.abandoned == 0
    }
}

/// Decouples the processing loop from the output stores
///
/// Owns one bounded queue and one worker task per channel. Must be created
/// inside a tokio runtime.
pub struct SinkDispatcher {
    aggregate_tx: mpsc::Sender<AggregatedRecord>,
    warning_tx: mpsc::Sender<WarningEvent>,
    aggregate_worker: JoinHandle<ChannelReport>,
    warning_worker: JoinHandle<ChannelReport>,
}

impl SinkDispatcher {
    /// Spawn both channel workers
    pub fn start(
        config: &SinkConfig,
        analytical: Arc<dyn AnalyticalStore>,
        relational: Arc<dyn RelationalStore>,
        metrics: PipelineMetrics,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (aggregate_tx, aggregate_rx) = mpsc::channel(capacity);
        let (warning_tx, warning_rx) = mpsc::channel(capacity);

        let aggregate_worker = tokio::spawn(AggregateWorker {
            rx: aggregate_rx,
            store: analytical,
            policy: RetryPolicy::for_aggregates(config),
            on_failure: config.on_failure,
            metrics: metrics.clone(),
        }.run());

        let warning_worker = tokio::spawn(WarningWorker {
            rx: warning_rx,
            store: relational,
            policy: RetryPolicy::for_warnings(config),
            on_failure: config.on_failure,
            batch_size: config.batch_size.max(1),
            batch_interval: config.batch_interval(),
            metrics,
        }.run());

        info!(
            queue_capacity = capacity,
            batch_size = config.batch_size,
            batch_interval_ms = config.batch_interval_ms,
            "Sink dispatcher started"
        );

        Self {
            aggregate_tx,
            warning_tx,
            aggregate_worker,
            warning_worker,
        }
    }

    /// Queue a record, waiting for capacity when the queue is full
    pub async fn enqueue_aggregate(&self, record: AggregatedRecord) -> SinkResult<()> {
        self.aggregate_tx.send(record).await.map_err(|_| SinkError::Closed {
            channel: SinkChannel::Aggregates.to_string(),
        })
    }

    /// Queue a warning, waiting for capacity when the queue is full
    pub async fn enqueue_warning(&self, warning: WarningEvent) -> SinkResult<()> {
        self.warning_tx.send(warning).await.map_err(|_| SinkError::Closed {
            channel: SinkChannel::Warnings.to_string(),
        })
    }

    /// Queue a record without waiting
    pub fn try_enqueue_aggregate(&self, record: AggregatedRecord) -> SinkResult<()> {
        self.aggregate_tx
            .try_send(record)
            .map_err(|e| try_send_error(e, SinkChannel::Aggregates))
    }

    /// Queue a warning without waiting
    pub fn try_enqueue_warning(&self, warning: WarningEvent) -> SinkResult<()> {
        self.warning_tx
            .try_send(warning)
            .map_err(|e| try_send_error(e, SinkChannel::Warnings))
    }

    /// Close both queues and wait for the workers to drain them
    pub async fn shutdown(self) -> DispatchReport {
        drop(self.aggregate_tx);
        drop(self.warning_tx);

        let aggregates = join_worker(self.aggregate_worker, SinkChannel::Aggregates).await;
        let warnings = join_worker(self.warning_worker, SinkChannel::Warnings).await;

        let report = DispatchReport {
            aggregates,
            warnings,
        };
        info!(
            aggregates_delivered = report.aggregates.delivered,
            aggregates_failed = report.aggregates.failed,
            warnings_delivered = report.warnings.delivered,
            warnings_failed = report.warnings.failed,
            "Sink dispatcher shut down"
        );
        report
    }
}

fn try_send_error<T>(err: TrySendError<T>, channel: SinkChannel) -> SinkError {
    match err {
        TrySendError::Full(_) => SinkError::QueueFull {
            channel: channel.to_string(),
        },
        TrySendError::Closed(_) => SinkError::Closed {
            channel: channel.to_string(),
        },
    }
}

async fn join_worker(handle: JoinHandle<ChannelReport>, channel: SinkChannel) -> ChannelReport {
    match handle.await {
        Ok(report) => report,
        Err(e) => {
            error!(channel = %channel, error = %e, "Sink worker panicked");
            let mut report = ChannelReport {
                halted: true,
                ..Default::default()
            };
            report.record_failure(SinkError::fatal(channel.as_str(), e.to_string()), 0);
            report
        }
    }
}

fn drain_abandoned<T>(rx: &mut mpsc::Receiver<T>) -> u64 {
    rx.close();
    let mut abandoned = 0;
    while rx.try_recv().is_ok() {
        abandoned += 1;
    }
    abandoned
}

struct AggregateWorker {
    rx: mpsc::Receiver<AggregatedRecord>,
    store: Arc<dyn AnalyticalStore>,
    policy: RetryPolicy,
    on_failure: SinkFailurePolicy,
    metrics: PipelineMetrics,
}

impl AggregateWorker {
    async fn run(mut self) -> ChannelReport {
        let channel = SinkChannel::Aggregates;
        let mut report = ChannelReport::default();

        while let Some(record) = self.rx.recv().await {
            let store = &*self.store;
            let record = &record;
            let outcome = self.policy.run(channel, move || store.write(record)).await;

            report.retries += u64::from(outcome.retries);
            self.metrics
                .record_sink(channel, SinkOutcome::Retried, u64::from(outcome.retries));

            match outcome.result {
                Ok(_) => {
                    report.delivered += 1;
                    self.metrics.record_sink(channel, SinkOutcome::Delivered, 1);
                }
                Err(err) => {
                    error!(
                        channel = %channel,
                        station = %record.station,
                        window = %record.window_key,
                        error = %err,
                        "Dropping undeliverable aggregate"
                    );
                    self.metrics.record_sink(channel, SinkOutcome::Failed, 1);
                    report.record_failure(err, 1);
                    if self.on_failure == SinkFailurePolicy::Halt {
                        report.halted = true;
                        break;
                    }
                }
            }
        }

        if report.halted {
            report.abandoned = drain_abandoned(&mut self.rx);
            warn!(channel = %channel, abandoned = report.abandoned, "Sink channel halted");
        }
        report
    }
}

struct WarningWorker {
    rx: mpsc::Receiver<WarningEvent>,
    store: Arc<dyn RelationalStore>,
    policy: RetryPolicy,
    on_failure: SinkFailurePolicy,
    batch_size: usize,
    batch_interval: Duration,
    metrics: PipelineMetrics,
}

impl WarningWorker {
    async fn run(mut self) -> ChannelReport {
        let mut report = ChannelReport::default();
        let mut batch: Vec<WarningEvent> = Vec::with_capacity(self.batch_size.min(1024));

        loop {
            let next = if batch.is_empty() {
                self.rx.recv().await
            } else {
                match timeout(self.batch_interval, self.rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(size = batch.len(), "Flushing warning batch after inactivity");
                        if !self.flush(&mut batch, &mut report).await {
                            break;
                        }
                        continue;
                    }
                }
            };

            match next {
                Some(warning) => {
                    batch.push(warning);
                    if batch.len() >= self.batch_size && !self.flush(&mut batch, &mut report).await
                    {
                        break;
                    }
                }
                None => {
                    if !batch.is_empty() {
                        self.flush(&mut batch, &mut report).await;
                    }
                    break;
                }
            }
        }

        if report.halted {
            report.abandoned = batch.len() as u64 + drain_abandoned(&mut self.rx);
            warn!(
                channel = %SinkChannel::Warnings,
                abandoned = report.abandoned,
                "Sink channel halted"
            );
        }
        report
    }

    /// Write the batch; returns false when the channel must halt
    async fn flush(&self, batch: &mut Vec<WarningEvent>, report: &mut ChannelReport) -> bool {
        let channel = SinkChannel::Warnings;
        let store = &*self.store;
        let warnings = batch.as_slice();
        let outcome = self
            .policy
            .run(channel, move || store.write_batch(warnings))
            .await;

        report.retries += u64::from(outcome.retries);
        self.metrics
            .record_sink(channel, SinkOutcome::Retried, u64::from(outcome.retries));

        let size = batch.len() as u64;
        let keep_going = match outcome.result {
            Ok(_) => {
                report.delivered += size;
                self.metrics.record_sink(channel, SinkOutcome::Delivered, size);
                true
            }
            Err(err) => {
                error!(
                    channel = %channel,
                    size = size,
                    error = %err,
                    "Dropping undeliverable warning batch"
                );
                self.metrics.record_sink(channel, SinkOutcome::Failed, size);
                report.record_failure(err, size);
                if self.on_failure == SinkFailurePolicy::Halt {
                    report.halted = true;
                    false
                } else {
                    true
                }
            }
        };
        batch.clear();
        keep_going
    }
}
