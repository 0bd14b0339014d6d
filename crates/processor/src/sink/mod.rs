//! Sink dispatch for aggregated records and heat warnings
//!
//! The dispatcher is the only place the pipeline talks to the outside world.
//! Each output channel has its own bounded queue and worker task, so a slow
//! store applies backpressure to enqueuers instead of stalling window closing
//! inside the processing loop.
//!
//! - **Aggregate channel**: every [`AggregatedRecord`] is written to an
//!   [`AnalyticalStore`] with at-least-once retries; the store must tolerate
//!   duplicates.
//! - **Warning channel**: [`WarningEvent`]s are written to a
//!   [`RelationalStore`] in batches of up to `batch_size`, or after
//!   `batch_interval_ms` without a new warning, preserving production order.

mod dispatcher;
mod kafka;
mod memory;
mod postgres;
mod retry;

pub use dispatcher::{ChannelReport, DispatchReport, SinkDispatcher};
#[cfg(feature = "kafka")]
pub use kafka::KafkaAnalyticalStore;
pub use kafka::KafkaStoreConfig;
pub use memory::{InMemoryAnalyticalStore, InMemoryRelationalStore};
pub use postgres::{PostgresStoreConfig, PostgresWarningStore};
pub use retry::{RetryOutcome, RetryPolicy};

use crate::error::SinkResult;
use async_trait::async_trait;
use heatwatch_types::{AggregatedRecord, WarningEvent};

/// Acknowledgement of a successful write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack {
    /// Number of records the store accepted
    pub written: usize,
}

impl Ack {
    pub fn new(written: usize) -> Self {
        Self { written }
    }
}

/// Store receiving one aggregated record per closed window
#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    async fn write(&self, record: &AggregatedRecord) -> SinkResult<Ack>;
}

/// Store receiving heat warnings in batches
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn write_batch(&self, warnings: &[WarningEvent]) -> SinkResult<Ack>;
}
