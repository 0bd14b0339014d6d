//! Delivery guarantees of the sink layer under failing and slow stores

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use heatwatch_types::{AggregatedRecord, WarningEvent, WeatherObservation, WindowKey};
use processor::config::{DeliveryGuarantee, ProcessorConfig, SinkConfig, SinkFailurePolicy};
use processor::error::{ProcessorError, SinkError};
use processor::pipeline::StreamPipelineBuilder;
use processor::sink::{InMemoryAnalyticalStore, InMemoryRelationalStore, SinkDispatcher};
use processor::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;

fn record(station: &str, day: u32, max: f64) -> AggregatedRecord {
    let start = Utc.with_ymd_and_hms(2024, 7, day, 0, 0, 0).unwrap();
    let key = WindowKey::new(station, start, start + ChronoDuration::days(1)).unwrap();
    AggregatedRecord::new(key, max, start + ChronoDuration::hours(12))
}

fn warning(station: &str, day: u32) -> WarningEvent {
    WarningEvent::from_match(38.0, &record(station, day, 40.0), &record(station, day + 1, 40.0))
}

fn fast_sink() -> SinkConfig {
    SinkConfig {
        base_backoff_ms: 1,
        max_backoff_ms: 5,
        batch_interval_ms: 20,
        ..Default::default()
    }
}

fn hot_days(days: u32) -> Vec<WeatherObservation> {
    (1..=days)
        .map(|d| WeatherObservation::new("S1", format!("2024-07-{:02}T12:00:00", d), Some(40.0)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_below_limit_deliver_once() {
    let config = fast_sink();
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    analytical.fail_next(
        config.aggregate_max_retries as usize,
        SinkError::transient("aggregates", "timeout"),
    );
    let dispatcher = SinkDispatcher::start(
        &config,
        analytical.clone(),
        Arc::new(InMemoryRelationalStore::new()),
        PipelineMetrics::new(),
    );

    dispatcher.enqueue_aggregate(record("S1", 1, 40.0)).await.unwrap();
    let report = dispatcher.shutdown().await;

    assert_eq!(analytical.records().len(), 1);
    assert_eq!(analytical.attempts(), u64::from(config.aggregate_max_retries) + 1);
    assert_eq!(report.aggregates.delivered, 1);
    assert_eq!(report.aggregates.retries, u64::from(config.aggregate_max_retries));
    assert!(report.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_continue_with_next_record() {
    let config = SinkConfig {
        aggregate_max_retries: 2,
        ..fast_sink()
    };
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    analytical.fail_next(3, SinkError::transient("aggregates", "unavailable"));
    let dispatcher = SinkDispatcher::start(
        &config,
        analytical.clone(),
        Arc::new(InMemoryRelationalStore::new()),
        PipelineMetrics::new(),
    );

    dispatcher.enqueue_aggregate(record("S1", 1, 40.0)).await.unwrap();
    dispatcher.enqueue_aggregate(record("S1", 2, 41.0)).await.unwrap();
    let report = dispatcher.shutdown().await;

    let delivered = analytical.records();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].max_temperature, 41.0);
    assert_eq!(report.aggregates.failed, 1);
    assert!(!report.aggregates.halted);
    assert!(matches!(
        report.first_error(),
        Some(SinkError::RetriesExhausted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_at_most_once_never_retries_aggregates() {
    let config = SinkConfig {
        aggregate_guarantee: DeliveryGuarantee::AtMostOnce,
        ..fast_sink()
    };
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    analytical.fail_next(1, SinkError::transient("aggregates", "timeout"));
    let dispatcher = SinkDispatcher::start(
        &config,
        analytical.clone(),
        Arc::new(InMemoryRelationalStore::new()),
        PipelineMetrics::new(),
    );

    dispatcher.enqueue_aggregate(record("S1", 1, 40.0)).await.unwrap();
    let report = dispatcher.shutdown().await;

    assert!(analytical.records().is_empty());
    assert_eq!(analytical.attempts(), 1);
    assert_eq!(report.aggregates.retries, 0);
    assert_eq!(report.aggregates.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_warning_batch_retried_in_order() {
    let config = SinkConfig {
        batch_size: 4,
        ..fast_sink()
    };
    let relational = Arc::new(InMemoryRelationalStore::new());
    relational.fail_next(2, SinkError::transient("warnings", "deadlock detected"));
    let dispatcher = SinkDispatcher::start(
        &config,
        Arc::new(InMemoryAnalyticalStore::new()),
        relational.clone(),
        PipelineMetrics::new(),
    );

    let sent: Vec<WarningEvent> = (1..=6).map(|d| warning("S1", d)).collect();
    for w in &sent {
        dispatcher.enqueue_warning(w.clone()).await.unwrap();
    }
    let report = dispatcher.shutdown().await;

    assert_eq!(relational.warnings(), sent);
    let sizes: Vec<usize> = relational.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 2]);
    assert_eq!(report.warnings.delivered, 6);
    assert_eq!(report.warnings.retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_rejects_without_blocking() {
    let config = SinkConfig {
        queue_capacity: 1,
        ..fast_sink()
    };
    let analytical = Arc::new(InMemoryAnalyticalStore::new().with_latency(Duration::from_secs(1)));
    let dispatcher = SinkDispatcher::start(
        &config,
        analytical.clone(),
        Arc::new(InMemoryRelationalStore::new()),
        PipelineMetrics::new(),
    );

    dispatcher.enqueue_aggregate(record("S1", 1, 30.0)).await.unwrap();
    tokio::task::yield_now().await;
    dispatcher.enqueue_aggregate(record("S1", 2, 31.0)).await.unwrap();

    let err = dispatcher
        .try_enqueue_aggregate(record("S1", 3, 32.0))
        .unwrap_err();
    assert!(matches!(err, SinkError::QueueFull { .. }));

    let report = dispatcher.shutdown().await;
    assert_eq!(report.aggregates.delivered, 2);
    assert_eq!(analytical.records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_applies_backpressure_without_loss() {
    let mut config = ProcessorConfig {
        sink: fast_sink(),
        buffer_size: 1,
        flush_on_shutdown: true,
        ..Default::default()
    };
    config.sink.queue_capacity = 1;
    let analytical =
        Arc::new(InMemoryAnalyticalStore::new().with_latency(Duration::from_millis(50)));
    let relational = Arc::new(InMemoryRelationalStore::new());
    let pipeline = StreamPipelineBuilder::from_config(config)
        .with_analytical_store(analytical.clone())
        .with_relational_store(relational.clone())
        .build()
        .unwrap();

    let (tx, handle) = pipeline.create_executor().unwrap().spawn();
    for event in hot_days(20) {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.dispatch.aggregates.delivered, 20);
    assert_eq!(analytical.records().len(), 20);
    assert_eq!(relational.warnings().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_halt_policy_fails_pipeline_run() {
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    analytical.fail_next(1, SinkError::fatal("aggregates", "schema mismatch"));
    let pipeline = StreamPipelineBuilder::new()
        .with_sink_failure_policy(SinkFailurePolicy::Halt)
        .with_analytical_store(analytical.clone())
        .build()
        .unwrap();

    let (tx, handle) = pipeline.create_executor().unwrap().spawn();
    for event in hot_days(5) {
        if tx.send(event).await.is_err() {
            break;
        }
    }
    drop(tx);

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, ProcessorError::Sink(SinkError::Fatal { .. })));
    assert!(analytical.records().is_empty());
}
