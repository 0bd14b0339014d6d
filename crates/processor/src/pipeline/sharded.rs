//! Multi-worker executor partitioned by station
//!
//! A router task owns filtering, timestamp extraction and the watermark.
//! Observations are routed to a shard chosen by a stable hash of the
//! station; every watermark advance is sent in-band to all shards, so each
//! shard closes windows and expires partial matches at the same point in its
//! own input as the single-worker pipeline would.

use crate::config::ProcessorConfig;
use crate::core::{shard_for, AscendingTimestampExtractor, EventFilter, NonNullTemperatureFilter};
use crate::error::{ProcessorError, Result};
use crate::metrics::{ObservationResult, PipelineMetrics};
use crate::pipeline::engine::StationStage;
use crate::pipeline::executor::{dispatch_output, settle, ExecutionReport, ExecutorStats};
use crate::sink::SinkDispatcher;
use crate::watermark::{Watermark, WatermarkCoordinator, WatermarkGenerator, WatermarkTracker};
use futures::future::join_all;
use heatwatch_types::{Observation, WeatherObservation};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

#[derive(Debug, Clone)]
enum ShardMessage {
    Observation(Observation),
    Watermark(Watermark),
    /// End of input; open windows are emitted only when `flush` is set
    Finish { flush: bool },
}

struct ShardWorker {
    shard: usize,
    rx: mpsc::Receiver<ShardMessage>,
    stage: StationStage,
    dispatcher: Arc<SinkDispatcher>,
    coordinator: Arc<WatermarkCoordinator>,
    stats: ExecutorStats,
}

impl ShardWorker {
    async fn run(mut self) -> Result<ExecutorStats> {
        debug!(shard = self.shard, "Shard worker started");
        let mut finished = false;

        while let Some(message) = self.rx.recv().await {
            match message {
                ShardMessage::Observation(observation) => {
                    self.stage.ingest(&observation)?;
                }
                ShardMessage::Watermark(watermark) => {
                    let output = self.stage.apply_watermark(watermark)?;
                    self.coordinator.update(self.shard as u32, watermark)?;
                    self.stats.update_watermark(watermark.timestamp);
                    self.stats.add_output(&output);
                    dispatch_output(&self.dispatcher, output).await?;
                }
                ShardMessage::Finish { flush } => {
                    let output = self.stage.finish(flush)?;
                    self.stats.add_output(&output);
                    dispatch_output(&self.dispatcher, output).await?;
                    finished = true;
                    break;
                }
            }
        }

        if !finished {
            self.stage.finish(false)?;
            debug!(shard = self.shard, "Shard input closed early, state discarded");
        }
        Ok(self.stats)
    }
}

/// Executor spreading stations over `parallelism` shard workers
///
/// Per-station state is only ever touched by the shard owning the station.
/// The router is the single writer of the watermark; shards report the
/// watermarks they have applied to a [`WatermarkCoordinator`].
pub struct ShardedExecutor {
    name: String,
    config: ProcessorConfig,
    dispatcher: SinkDispatcher,
    metrics: PipelineMetrics,
    coordinator: Arc<WatermarkCoordinator>,
}

impl ShardedExecutor {
    pub fn new(
        name: impl Into<String>,
        config: ProcessorConfig,
        dispatcher: SinkDispatcher,
        metrics: PipelineMetrics,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            dispatcher,
            metrics,
            coordinator: Arc::new(WatermarkCoordinator::new()),
        })
    }

    pub fn parallelism(&self) -> usize {
        self.config.parallelism.max(1)
    }

    /// Watermark progress of every shard
    pub fn coordinator(&self) -> Arc<WatermarkCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Run on a background task fed by the returned sender
    pub fn spawn(
        self,
    ) -> (
        mpsc::Sender<WeatherObservation>,
        JoinHandle<Result<ExecutionReport>>,
    ) {
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        (tx, tokio::spawn(self.run(rx)))
    }

    /// Route records until the input closes or a fatal error occurs
    pub async fn run(
        self,
        mut input: mpsc::Receiver<WeatherObservation>,
    ) -> Result<ExecutionReport> {
        let ShardedExecutor {
            name,
            config,
            dispatcher,
            metrics,
            coordinator,
        } = self;
        let shards = config.parallelism.max(1);
        info!(pipeline = %name, shards = shards, "Starting sharded executor");
        let started = Instant::now();

        let dispatcher = Arc::new(dispatcher);
        let mut senders = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);
        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
            let worker = ShardWorker {
                shard,
                rx,
                stage: StationStage::new(&config, metrics.clone())?,
                dispatcher: Arc::clone(&dispatcher),
                coordinator: Arc::clone(&coordinator),
                stats: ExecutorStats::new(),
            };
            senders.push(tx);
            workers.push(tokio::spawn(worker.run()));
        }

        let mut router = Router {
            filter: NonNullTemperatureFilter,
            extractor: AscendingTimestampExtractor,
            tracker: WatermarkTracker::new(config.window.lateness(), config.window.late_policy),
            senders,
            metrics,
            stats: ExecutorStats::new(),
        };

        let mut outcome = router.route(&mut input).await;
        if outcome.is_ok() {
            let flush = config.flush_on_shutdown;
            router.broadcast(ShardMessage::Finish { flush }).await;
        } else {
            input.close();
        }
        let Router { senders, mut stats, .. } = router;
        drop(senders);

        for (shard, joined) in join_all(workers).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(shard_stats)) => stats.merge(&shard_stats),
                Ok(Err(e)) => {
                    error!(shard = shard, error = %e, "Shard worker failed");
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
                Err(e) => {
                    error!(shard = shard, error = %e, "Shard worker panicked");
                    if outcome.is_ok() {
                        outcome = Err(ProcessorError::Execution { source: Box::new(e) });
                    }
                }
            }
        }
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        let dispatcher = Arc::try_unwrap(dispatcher).map_err(|_| {
            ProcessorError::Unexpected(
                "sink dispatcher still shared after shards stopped".to_string(),
            )
        })?;
        let dispatch = dispatcher.shutdown().await;
        let result = settle(outcome, stats, dispatch);
        if let Err(e) = &result {
            error!(pipeline = %name, error = %e, "Sharded executor failed");
        } else {
            info!(pipeline = %name, "Sharded executor finished");
        }
        result
    }
}

struct Router {
    filter: NonNullTemperatureFilter,
    extractor: AscendingTimestampExtractor,
    tracker: WatermarkTracker,
    senders: Vec<mpsc::Sender<ShardMessage>>,
    metrics: PipelineMetrics,
    stats: ExecutorStats,
}

impl Router {
    async fn route(&mut self, input: &mut mpsc::Receiver<WeatherObservation>) -> Result<()> {
        while let Some(event) = input.recv().await {
            self.stats.inc_events_received();
            if !self.filter.accept(&event) {
                trace!(station = %event.station, "Filtered reading without temperature");
                self.metrics.record_observation(ObservationResult::Filtered);
                continue;
            }

            let observation = self.extractor.extract(&event)?;
            let event_time = observation.timestamp_millis();
            self.tracker.check_order(event_time)?;

            let shard = shard_for(observation.station(), self.senders.len());
            trace!(station = observation.station(), shard = shard, "Routing observation");
            if self.senders[shard]
                .send(ShardMessage::Observation(observation))
                .await
                .is_err()
            {
                debug!(shard = shard, "Shard stopped, ending routing");
                return Ok(());
            }

            if let Some(watermark) = self.tracker.on_event(event_time) {
                self.metrics.set_watermark(watermark);
                if !self.broadcast(ShardMessage::Watermark(watermark)).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Send to every shard; false when a shard has stopped
    async fn broadcast(&self, message: ShardMessage) -> bool {
        let mut delivered = true;
        for tx in &self.senders {
            delivered &= tx.send(message.clone()).await.is_ok();
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{InMemoryAnalyticalStore, InMemoryRelationalStore};

    #[tokio::test]
    async fn test_shards_emit_every_station() {
        let config = ProcessorConfig {
            parallelism: 3,
            ..Default::default()
        };
        let metrics = PipelineMetrics::new();
        let analytical = Arc::new(InMemoryAnalyticalStore::new());
        let relational = Arc::new(InMemoryRelationalStore::new());
        let dispatcher = SinkDispatcher::start(
            &config.sink,
            analytical.clone(),
            relational.clone(),
            metrics.clone(),
        );
        let executor = ShardedExecutor::new("sharded", config, dispatcher, metrics).unwrap();
        let coordinator = executor.coordinator();

        let (tx, handle) = executor.spawn();
        for day in 1..=3 {
            for station in ["S1", "S2", "S3", "S4", "S5"] {
                let date = format!("2024-07-{:02}T12:00:00", day);
                tx.send(WeatherObservation::new(station, date, Some(40.0))).await.unwrap();
            }
        }
        drop(tx);

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stats.events_received, 15);
        assert_eq!(report.stats.records_emitted, 10);
        assert_eq!(report.stats.warnings_emitted, 5);
        assert_eq!(analytical.records().len(), 10);
        assert_eq!(relational.warnings().len(), 5);
        assert!(!coordinator.current_watermark().is_min());
    }

    #[tokio::test]
    async fn test_malformed_timestamp_halts_router() {
        let config = ProcessorConfig {
            parallelism: 2,
            ..Default::default()
        };
        let metrics = PipelineMetrics::new();
        let dispatcher = SinkDispatcher::start(
            &config.sink,
            Arc::new(InMemoryAnalyticalStore::new()),
            Arc::new(InMemoryRelationalStore::new()),
            metrics.clone(),
        );
        let (tx, handle) = ShardedExecutor::new("sharded", config, dispatcher, metrics)
            .unwrap()
            .spawn();
        tx.send(WeatherObservation::new("S1", "2024-07-01", Some(40.0))).await.unwrap();
        drop(tx);

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_fatal());
    }
}
