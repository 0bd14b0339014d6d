//! Kafka store for aggregated records
//!
//! Records are published as JSON keyed by station, so all windows of one
//! station land on the same partition in window order. The producer itself
//! is only built with the `kafka` feature.

use serde::{Deserialize, Serialize};

/// Producer settings of the analytical store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaStoreConfig {
    /// Kafka bootstrap servers
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Topic receiving aggregated records
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Client ID for the producer
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Producer delivery timeout (milliseconds)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Acknowledgement mode (0, 1, all)
    #[serde(default = "default_acks")]
    pub acks: String,
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_topic() -> String {
    "weather-daily-max".to_string()
}

fn default_client_id() -> String {
    "heatwatch".to_string()
}

fn default_send_timeout() -> u64 {
    30_000
}

fn default_acks() -> String {
    "all".to_string()
}

impl Default for KafkaStoreConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            client_id: default_client_id(),
            send_timeout_ms: default_send_timeout(),
            acks: default_acks(),
        }
    }
}

#[cfg(feature = "kafka")]
pub use producer::KafkaAnalyticalStore;

#[cfg(feature = "kafka")]
mod producer {
    use super::KafkaStoreConfig;
    use crate::error::{ProcessorError, Result, SinkError, SinkResult};
    use crate::metrics::SinkChannel;
    use crate::sink::{Ack, AnalyticalStore};
    use async_trait::async_trait;
    use heatwatch_types::AggregatedRecord;
    use rdkafka::config::ClientConfig;
    use rdkafka::error::KafkaError;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
    use rdkafka::types::RDKafkaErrorCode;
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::{info, trace};

    /// Analytical store publishing aggregated records to a Kafka topic
    pub struct KafkaAnalyticalStore {
        producer: FutureProducer,
        config: KafkaStoreConfig,
    }

    impl KafkaAnalyticalStore {
        pub fn new(config: KafkaStoreConfig) -> Result<Self> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", &config.brokers)
                .set("client.id", &config.client_id)
                .set("acks", &config.acks)
                .set("message.timeout.ms", config.send_timeout_ms.to_string())
                .create()
                .map_err(|e| ProcessorError::Configuration {
                    source: Box::new(e),
                })?;

            info!(
                brokers = %config.brokers,
                topic = %config.topic,
                "Created Kafka analytical store"
            );
            Ok(Self { producer, config })
        }

        /// Wait for in-flight messages to be delivered
        pub fn flush(&self, timeout: Duration) -> Result<()> {
            self.producer
                .flush(Timeout::After(timeout))
                .map_err(|e| ProcessorError::Execution {
                    source: Box::new(e),
                })
        }
    }

    fn classify(err: &KafkaError) -> SinkError {
        let channel = SinkChannel::Aggregates.as_str();
        match err {
            KafkaError::MessageProduction(
                RDKafkaErrorCode::QueueFull
                | RDKafkaErrorCode::NetworkException
                | RDKafkaErrorCode::RequestTimedOut
                | RDKafkaErrorCode::NotLeaderForPartition
                | RDKafkaErrorCode::MessageTimedOut,
            ) => SinkError::transient(channel, err.to_string()),
            _ => SinkError::fatal(channel, err.to_string()),
        }
    }

    #[async_trait]
    impl AnalyticalStore for KafkaAnalyticalStore {
        async fn write(&self, record: &AggregatedRecord) -> SinkResult<Ack> {
            let payload = serde_json::to_vec(record)
                .map_err(|e| SinkError::fatal(SinkChannel::Aggregates.as_str(), e.to_string()))?;

            let message = FutureRecord::to(&self.config.topic)
                .key(&record.station)
                .payload(&payload)
                .timestamp(record.window_end().timestamp_millis());

            let (partition, offset) = self
                .producer
                .send(message, Timeout::After(Duration::from_millis(self.config.send_timeout_ms)))
                .await
                .map_err(|(err, _)| classify(&err))?;

            trace!(
                station = %record.station,
                partition = partition,
                offset = offset,
                "Published aggregate"
            );
            Ok(Ack::new(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KafkaStoreConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.acks, "all");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: KafkaStoreConfig = serde_json::from_str(r#"{"topic":"daily"}"#).unwrap();
        assert_eq!(config.topic, "daily");
        assert_eq!(config.client_id, "heatwatch");
    }
}
