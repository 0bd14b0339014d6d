//! End-to-end tests for the weather pipeline and its executors

use heatwatch_types::{AggregatedRecord, WarningEvent, WeatherObservation};
use processor::config::ProcessorConfig;
use processor::error::{ProcessorError, WatermarkError};
use processor::pipeline::{StreamPipelineBuilder, WeatherPipeline};
use processor::sink::{InMemoryAnalyticalStore, InMemoryRelationalStore};
use processor::PipelineMetrics;
use std::collections::BTreeMap;
use std::sync::Arc;

fn obs(station: &str, date: &str, temperature: Option<f64>) -> WeatherObservation {
    WeatherObservation::new(station, date, temperature)
}

fn at(day: u32, hour: u32) -> String {
    format!("2024-07-{:02}T{:02}:00:00", day, hour)
}

fn default_pipeline() -> WeatherPipeline {
    WeatherPipeline::new(&ProcessorConfig::default(), PipelineMetrics::new()).unwrap()
}

/// Deterministic pseudo-random sequence for generated inputs
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn sorted_records(mut records: Vec<AggregatedRecord>) -> Vec<AggregatedRecord> {
    records.sort_by(|a, b| {
        a.window_end()
            .cmp(&b.window_end())
            .then_with(|| a.station.cmp(&b.station))
    });
    records
}

fn sorted_messages(warnings: &[WarningEvent]) -> Vec<String> {
    let mut messages: Vec<String> = warnings.iter().map(|w| w.message.clone()).collect();
    messages.sort();
    messages
}

#[tokio::test]
async fn test_end_to_end_daily_maxima_and_warning() {
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    let relational = Arc::new(InMemoryRelationalStore::new());
    let pipeline = StreamPipelineBuilder::new()
        .with_name("s1-example")
        .with_flush_on_shutdown(true)
        .with_analytical_store(analytical.clone())
        .with_relational_store(relational.clone())
        .build()
        .unwrap();

    let (tx, handle) = pipeline.create_executor().unwrap().spawn();
    tx.send(obs("S1", "2024-07-01T13:00:00", Some(40.0))).await.unwrap();
    tx.send(obs("S1", "2024-07-02T14:00:00", Some(39.0))).await.unwrap();
    tx.send(obs("S1", "2024-07-03T15:00:00", Some(20.0))).await.unwrap();
    drop(tx);

    let report = handle.await.unwrap().unwrap();
    assert!(report.dispatch.is_clean());

    let maxima: Vec<f64> = analytical.records().iter().map(|r| r.max_temperature).collect();
    assert_eq!(maxima, vec![40.0, 39.0, 20.0]);

    let warnings = relational.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "Warning: WBAN:S1:Temperatures exceeded 38 degrees on:2024-07-01T13:00:00 and 2024-07-02T14:00:00."
    );
}

#[test]
fn test_one_record_per_day_with_true_maximum() {
    let mut pipeline = default_pipeline();
    let mut rng = Lcg(7);
    let mut expected: BTreeMap<u32, f64> = BTreeMap::new();
    let mut events = Vec::new();

    for day in 1..=10 {
        for hour in 0..24 {
            let temperature = if rng.next() % 5 == 0 {
                None
            } else {
                Some((rng.next() % 500) as f64 / 10.0)
            };
            if let Some(t) = temperature {
                let max = expected.entry(day).or_insert(f64::MIN);
                *max = max.max(t);
            }
            events.push(obs("725030", &at(day, hour), temperature));
        }
    }

    let mut output = pipeline.process_all(&events).unwrap();
    output.extend(pipeline.finish(true).unwrap());

    let days: Vec<(u32, f64)> = output
        .records
        .iter()
        .map(|r| {
            let day = r.window_key.window_start.format("%d").to_string();
            (day.parse().unwrap(), r.max_temperature)
        })
        .collect();
    let expected: Vec<(u32, f64)> = expected.into_iter().collect();
    assert_eq!(days, expected);
}

#[test]
fn test_late_event_never_reopens_window() {
    let mut pipeline = default_pipeline();

    pipeline.process(&obs("S1", &at(1, 10), Some(30.0))).unwrap();
    let closed = pipeline.process(&obs("S1", &at(2, 10), Some(31.0))).unwrap();
    assert_eq!(closed.records.len(), 1);

    for hour in [11, 12, 23] {
        let replay = pipeline.process(&obs("S1", &at(1, hour), Some(45.0))).unwrap();
        assert!(replay.is_empty());
    }

    let rest = pipeline.process(&obs("S1", &at(3, 10), Some(32.0))).unwrap();
    assert_eq!(rest.records.len(), 1);
    assert_eq!(rest.records[0].max_temperature, 31.0);
    assert_eq!(pipeline.metrics().snapshot().late_events_dropped, 3);
    assert_eq!(pipeline.metrics().snapshot().windows_emitted, 2);
}

#[test]
fn test_null_temperatures_never_emitted() {
    let mut pipeline = default_pipeline();
    let events = vec![
        obs("S1", &at(1, 1), None),
        obs("S2", &at(1, 2), Some(12.0)),
        obs("S1", &at(1, 3), None),
        obs("S2", &at(2, 2), Some(13.0)),
    ];

    let output = pipeline.process_all(&events).unwrap();
    assert_eq!(output.records.len(), 1);
    assert_eq!(output.records[0].station, "S2");
    assert_eq!(pipeline.metrics().snapshot().observations_filtered, 2);
}

#[test]
fn test_nan_reading_does_not_block_other_stations() {
    let mut pipeline = default_pipeline();

    assert!(pipeline.process(&obs("S1", &at(1, 10), Some(40.0))).unwrap().is_empty());
    assert!(pipeline.process(&obs("S2", &at(1, 11), Some(f64::NAN))).unwrap().is_empty());
    assert_eq!(pipeline.open_windows(), 1);

    let next_day = pipeline.process(&obs("S1", &at(2, 10), Some(39.0))).unwrap();
    assert_eq!(next_day.records.len(), 1);
    assert_eq!(next_day.records[0].station, "S1");
    assert_eq!(next_day.records[0].max_temperature, 40.0);
    assert_eq!(pipeline.metrics().snapshot().observations_filtered, 1);
}

#[tokio::test]
async fn test_malformed_timestamp_halts_ingestion() {
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    let pipeline = StreamPipelineBuilder::new()
        .with_analytical_store(analytical.clone())
        .build()
        .unwrap();

    let (tx, handle) = pipeline.create_executor().unwrap().spawn();
    tx.send(obs("S1", &at(1, 10), Some(40.0))).await.unwrap();
    tx.send(obs("S1", &at(2, 10), Some(40.0))).await.unwrap();
    tx.send(obs("S1", "2024-07-03 10:00", Some(40.0))).await.unwrap();
    let _ = tx.send(obs("S1", &at(4, 10), Some(40.0))).await;
    drop(tx);

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::Watermark(WatermarkError::MalformedTimestamp { .. })
    ));
    assert_eq!(analytical.records().len(), 1);
}

#[tokio::test]
async fn test_shutdown_without_flush_discards_open_windows() {
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    let relational = Arc::new(InMemoryRelationalStore::new());
    let pipeline = StreamPipelineBuilder::new()
        .with_analytical_store(analytical.clone())
        .with_relational_store(relational.clone())
        .build()
        .unwrap();

    let (tx, handle) = pipeline.create_executor().unwrap().spawn();
    tx.send(obs("S1", &at(1, 10), Some(40.0))).await.unwrap();
    tx.send(obs("S1", &at(2, 10), Some(40.0))).await.unwrap();
    drop(tx);

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.stats.records_emitted, 1);
    assert_eq!(analytical.records().len(), 1);
    assert!(relational.warnings().is_empty());
    assert_eq!(pipeline.metrics().snapshot().open_windows, 0);
}

#[tokio::test]
async fn test_sharded_output_matches_single_worker() {
    let mut rng = Lcg(42);
    let stations = ["725030", "725033", "744860", "722950", "726580", "727930"];
    let mut events = Vec::new();
    for day in 1..=6 {
        for hour in (0..24).step_by(3) {
            for station in stations {
                let temperature = if rng.next() % 7 == 0 {
                    None
                } else {
                    Some(30.0 + (rng.next() % 120) as f64 / 10.0)
                };
                events.push(obs(station, &at(day, hour), temperature));
            }
        }
    }

    let mut config = ProcessorConfig::default();
    config.window.lateness_ms = 3 * 60 * 60 * 1000;
    config.flush_on_shutdown = true;

    let mut single = WeatherPipeline::new(&config, PipelineMetrics::new()).unwrap();
    let mut expected = single.process_all(&events).unwrap();
    expected.extend(single.finish(true).unwrap());

    config.parallelism = 4;
    let analytical = Arc::new(InMemoryAnalyticalStore::new());
    let relational = Arc::new(InMemoryRelationalStore::new());
    let pipeline = StreamPipelineBuilder::from_config(config)
        .with_analytical_store(analytical.clone())
        .with_relational_store(relational.clone())
        .build()
        .unwrap();
    let (tx, handle) = pipeline.create_sharded_executor().unwrap().spawn();
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);
    handle.await.unwrap().unwrap();

    assert_eq!(sorted_records(analytical.records()), sorted_records(expected.records));
    assert_eq!(
        sorted_messages(&relational.warnings()),
        sorted_messages(&expected.warnings)
    );
}
