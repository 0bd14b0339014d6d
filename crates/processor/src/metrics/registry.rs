//! Prometheus exposition for pipeline metrics
//!
//! Each pipeline registers its counters into a caller-owned registry, which
//! then renders them in the Prometheus text format.

use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::{Metric, Registry};
use std::sync::Arc;

use super::{MetricsError, Result};

/// Shared handle to a Prometheus registry
///
/// Clones refer to the same registry, so a handle can be given to the
/// pipeline builder while another is kept for scraping.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `metric` under `name`
    pub fn register(&self, name: &str, help: &str, metric: impl Metric) {
        self.inner.lock().register(name, help, metric);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.inner.lock())
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;
        Ok(buffer)
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}
