use crate::config::{DeliveryGuarantee, SinkConfig};
use crate::error::{SinkError, SinkResult};
use crate::metrics::SinkChannel;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-attempts after the first try
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: SinkResult<T>,
    /// Re-attempts that were made
    pub retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            max_backoff: max_backoff.max(base_backoff),
        }
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Policy of the warning channel
    pub fn for_warnings(config: &SinkConfig) -> Self {
        Self::new(config.max_retries, config.base_backoff(), config.max_backoff())
    }

    /// Policy of the aggregate channel
    pub fn for_aggregates(config: &SinkConfig) -> Self {
        match config.aggregate_guarantee {
            DeliveryGuarantee::AtMostOnce => Self::no_retry(),
            DeliveryGuarantee::AtLeastOnce => Self::new(
                config.aggregate_max_retries,
                config.base_backoff(),
                config.max_backoff(),
            ),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the given re-attempt (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(16));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn should_retry(&self, error: &SinkError, retries: u32) -> bool {
        retries < self.max_retries && error.is_retryable()
    }

    /// Run `op` until it succeeds, fails fatally or runs out of retries
    pub async fn run<T, F, Fut>(&self, channel: SinkChannel, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SinkResult<T>>,
    {
        let mut retries = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(
                            channel = %channel,
                            retries = retries,
                            "Write succeeded after retries"
                        );
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        retries,
                    };
                }
                Err(err) if self.should_retry(&err, retries) => {
                    retries += 1;
                    let backoff = self.backoff(retries);
                    warn!(
                        channel = %channel,
                        attempt = retries,
                        max_attempts = self.max_retries + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Write failed, retrying"
                    );
                    sleep(backoff).await;
                }
                Err(err) if err.is_retryable() => {
                    return RetryOutcome {
                        result: Err(SinkError::RetriesExhausted {
                            channel: channel.to_string(),
                            attempts: retries + 1,
                            last_error: err.to_string(),
                        }),
                        retries,
                    };
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        retries,
                    };
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_warnings(&SinkConfig::default())
    }
}
