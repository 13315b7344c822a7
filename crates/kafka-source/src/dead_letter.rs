//! Dead-letter topic producer.

use std::time::Duration;

use aqi_core::DeadLetterRecord;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use reading_sink::{DeadLetterSink, WriteError};

use crate::error::is_transient_code;

/// Publishes rejected records as JSON to a Kafka topic, keyed by
/// `topic:partition:offset` of the rejected message.
pub struct KafkaDeadLetter {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaDeadLetter {
    pub fn new(brokers: &str, topic: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create dead-letter producer: {e}"))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            send_timeout: Duration::from_secs(5),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for KafkaDeadLetter {
    async fn send(&self, records: &[DeadLetterRecord]) -> Result<(), WriteError> {
        for record in records {
            let payload = serde_json::to_vec(record)
                .map_err(|e| WriteError::Fatal(format!("Failed to encode dead letter: {e}")))?;
            let key = record.key();

            let delivery = FutureRecord::to(&self.topic).key(&key).payload(&payload);
            self.producer
                .send(delivery, self.send_timeout)
                .await
                .map_err(|(err, _)| classify_produce_error(&self.topic, err))?;
        }

        if !records.is_empty() {
            tracing::debug!(
                "Published {} dead letters to {}",
                records.len(),
                self.topic
            );
        }
        Ok(())
    }
}

fn classify_produce_error(topic: &str, err: KafkaError) -> WriteError {
    let message = format!("Failed to publish dead letter to {topic}: {err}");
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::MessageSizeTooLarge
            | RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::InvalidMessage,
        ) => WriteError::Fatal(message),
        Some(code) if is_transient_code(code) => WriteError::Transient(message),
        Some(RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::QueueFull) | None => {
            WriteError::Transient(message)
        }
        Some(_) => WriteError::Fatal(message),
    }
}
