//! Logging setup
//!
//! Installs a `tracing-subscriber` fmt subscriber. `RUST_LOG` takes
//! precedence over the configured level.

use crate::error::{ProcessorError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Builds the filter from `RUST_LOG`, falling back to `level`
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| ProcessorError::Configuration {
            source: Box::new(e),
        }),
    }
}

/// Install the global subscriber, as plain text or JSON lines
///
/// Fails when the level directive is invalid or a subscriber is already set.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = env_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    installed.map_err(|e| ProcessorError::Configuration {
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("processor=loud").is_err());
        }
        assert!(EnvFilter::try_new("processor=debug,info").is_ok());
    }
}
