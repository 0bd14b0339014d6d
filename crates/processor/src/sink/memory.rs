//! In-memory stores for tests and local runs
//!
//! Both stores accept a script of failures that are returned, in order,
//! before any write succeeds.

use super::{Ack, AnalyticalStore, RelationalStore};
use crate::error::{SinkError, SinkResult};
use async_trait::async_trait;
use heatwatch_types::{AggregatedRecord, WarningEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct FailureScript {
    pending: Mutex<VecDeque<SinkError>>,
}

impl FailureScript {
    fn push(&self, error: SinkError, times: usize) {
        let mut pending = self.pending.lock();
        for _ in 0..times {
            pending.push_back(error.clone());
        }
    }

    fn next(&self) -> Option<SinkError> {
        self.pending.lock().pop_front()
    }
}

/// Analytical store keeping every written record in memory
#[derive(Debug, Default)]
pub struct InMemoryAnalyticalStore {
    records: Mutex<Vec<AggregatedRecord>>,
    failures: FailureScript,
    attempts: AtomicU64,
    latency: Option<Duration>,
}

impl InMemoryAnalyticalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every write, simulating a slow store
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `times` writes with `error`
    pub fn fail_next(&self, times: usize, error: SinkError) {
        self.failures.push(error, times);
    }

    /// Records written so far, in write order
    pub fn records(&self) -> Vec<AggregatedRecord> {
        self.records.lock().clone()
    }

    /// Write calls made, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticalStore for InMemoryAnalyticalStore {
    async fn write(&self, record: &AggregatedRecord) -> SinkResult<Ack> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.failures.next() {
            return Err(error);
        }
        self.records.lock().push(record.clone());
        Ok(Ack::new(1))
    }
}

/// Relational store keeping every written batch in memory
#[derive(Debug, Default)]
pub struct InMemoryRelationalStore {
    batches: Mutex<Vec<Vec<WarningEvent>>>,
    failures: FailureScript,
    attempts: AtomicU64,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` batch writes with `error`
    pub fn fail_next(&self, times: usize, error: SinkError) {
        self.failures.push(error, times);
    }

    /// Batches written so far
    pub fn batches(&self) -> Vec<Vec<WarningEvent>> {
        self.batches.lock().clone()
    }

    /// All written warnings in write order
    pub fn warnings(&self) -> Vec<WarningEvent> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn write_batch(&self, warnings: &[WarningEvent]) -> SinkResult<Ack> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.next() {
            return Err(error);
        }
        self.batches.lock().push(warnings.to_vec());
        Ok(Ack::new(warnings.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use heatwatch_types::WindowKey;

    fn record() -> AggregatedRecord {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap();
        AggregatedRecord::new(WindowKey::new("S1", start, end).unwrap(), 40.0, start)
    }

    #[tokio::test]
    async fn test_scripted_failures_precede_success() {
        let store = InMemoryAnalyticalStore::new();
        store.fail_next(2, SinkError::transient("aggregates", "busy"));

        assert!(store.write(&record()).await.is_err());
        assert!(store.write(&record()).await.is_err());
        assert_eq!(store.write(&record()).await.unwrap(), Ack::new(1));
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.attempts(), 3);
    }

    #[tokio::test]
    async fn test_relational_store_keeps_batches() {
        let store = InMemoryRelationalStore::new();
        let warning = WarningEvent::from_match(38.0, &record(), &record());
        store.write_batch(&[warning.clone(), warning.clone()]).await.unwrap();
        store.write_batch(&[warning]).await.unwrap();

        assert_eq!(store.batches().len(), 2);
        assert_eq!(store.warnings().len(), 3);
    }
}
