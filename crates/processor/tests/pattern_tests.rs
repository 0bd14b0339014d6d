//! Heat warning detection through the full pipeline

use heatwatch_types::{WarningEvent, WeatherObservation};
use processor::config::ProcessorConfig;
use processor::pipeline::WeatherPipeline;
use processor::PipelineMetrics;

fn pipeline(config: &ProcessorConfig) -> WeatherPipeline {
    WeatherPipeline::new(config, PipelineMetrics::new()).unwrap()
}

/// Feed one noon reading per `(day, temperature)` and drain without flushing
fn run(config: &ProcessorConfig, station: &str, days: &[(u32, f64)]) -> Vec<WarningEvent> {
    let events: Vec<WeatherObservation> = days
        .iter()
        .map(|(day, t)| {
            WeatherObservation::new(station, format!("2024-07-{:02}T12:00:00", day), Some(*t))
        })
        .collect();
    let mut pipeline = pipeline(config);
    let mut output = pipeline.process_all(&events).unwrap();
    output.extend(pipeline.finish(false).unwrap());
    output.warnings
}

#[test]
fn test_consecutive_hot_days_warn_once() {
    let warnings = run(
        &ProcessorConfig::default(),
        "S1",
        &[(1, 40.0), (2, 39.0), (3, 20.0)],
    );
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].station, "S1");
}

#[test]
fn test_threshold_is_inclusive() {
    let warnings = run(
        &ProcessorConfig::default(),
        "S1",
        &[(1, 38.0), (2, 38.0), (3, 10.0)],
    );
    assert_eq!(warnings.len(), 1);
}

#[test]
fn test_second_record_on_deadline_matches() {
    // Day 1 closes at 07-02; the day 3 window closes at 07-04, exactly on the deadline
    let warnings = run(
        &ProcessorConfig::default(),
        "S1",
        &[(1, 40.0), (3, 40.0), (4, 10.0)],
    );
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "Warning: WBAN:S1:Temperatures exceeded 38 degrees on:2024-07-01T12:00:00 and 2024-07-03T12:00:00."
    );
}

#[test]
fn test_second_record_beyond_bound_never_warns() {
    let warnings = run(
        &ProcessorConfig::default(),
        "S1",
        &[(1, 40.0), (4, 40.0), (5, 10.0)],
    );
    assert!(warnings.is_empty());
}

#[test]
fn test_matches_do_not_overlap() {
    let warnings = run(
        &ProcessorConfig::default(),
        "S1",
        &[(1, 40.0), (2, 41.0), (3, 42.0), (4, 43.0), (5, 10.0)],
    );
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].message.ends_with("on:2024-07-01T12:00:00 and 2024-07-02T12:00:00."));
    assert!(warnings[1].message.ends_with("on:2024-07-03T12:00:00 and 2024-07-04T12:00:00."));
}

#[test]
fn test_cool_day_between_hot_days_resets() {
    let warnings = run(
        &ProcessorConfig::default(),
        "S1",
        &[(1, 40.0), (2, 25.0), (3, 40.0), (4, 10.0)],
    );
    assert!(warnings.is_empty());
}

#[test]
fn test_stations_match_independently() {
    let config = ProcessorConfig::default();
    let mut pipeline = pipeline(&config);
    let mut events = Vec::new();
    for day in 1..=3 {
        let date = format!("2024-07-{:02}T12:00:00", day);
        events.push(WeatherObservation::new("HOT", date.clone(), Some(40.0)));
        let mild = if day == 1 { 40.0 } else { 20.0 };
        events.push(WeatherObservation::new("MILD", date, Some(mild)));
    }

    let output = pipeline.process_all(&events).unwrap();
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].station, "HOT");
    assert_eq!(pipeline.partial_matches(), 0);
}

#[test]
fn test_configured_threshold_in_message() {
    let mut config = ProcessorConfig::default();
    config.pattern.threshold_celsius = 35.5;
    let warnings = run(&config, "725030", &[(1, 36.0), (2, 36.0), (3, 10.0)]);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0]
        .message
        .starts_with("Warning: WBAN:725030:Temperatures exceeded 35.5 degrees on:"));
}

#[test]
fn test_incomplete_match_discarded_at_shutdown() {
    let config = ProcessorConfig::default();
    let mut pipeline = pipeline(&config);
    pipeline
        .process(&WeatherObservation::new("S1", "2024-07-01T12:00:00", Some(40.0)))
        .unwrap();
    pipeline
        .process(&WeatherObservation::new("S1", "2024-07-02T12:00:00", Some(20.0)))
        .unwrap();
    pipeline
        .process(&WeatherObservation::new("S2", "2024-07-02T13:00:00", Some(41.0)))
        .unwrap();

    let output = pipeline.finish(true).unwrap();
    assert_eq!(output.records.len(), 2);
    assert!(output.warnings.is_empty());
    assert_eq!(pipeline.partial_matches(), 0);
}
