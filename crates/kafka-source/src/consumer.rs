use crate::error::{Error, Result};
use crate::source::{retry_transient, PartitionReader, StartOffset};
use aqi_core::{RawMessage, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as RdkafkaConsumer, StreamConsumer as RdkafkaStreamConsumer};
use rdkafka::message::{BorrowedMessage as RdkafkaBorrowedMessage, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;

/// Configuration for Kafka partition readers
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    ///
    /// Partitions are assigned explicitly, so the group is only used to
    /// identify the client to the brokers. Offsets are never committed to it.
    pub group_id: String,
    /// Topic to consume from
    pub topic: String,
    /// Start position for partitions without a checkpoint
    ///
    /// "earliest" is preferred so that a fresh deployment does not skip
    /// readings that were produced before it started.
    pub auto_offset_reset: StartOffset,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// How long a poll keeps filling its batch after the first message
    pub linger: Duration,
    /// Retries of transient broker errors during polls and metadata queries
    pub fetch_retry: RetryPolicy,
    /// Timeout of metadata and watermark queries
    pub metadata_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "AirQualityStreaming".to_string(),
            topic: "aqi_stream".to_string(),
            auto_offset_reset: StartOffset::Earliest,
            session_timeout_ms: "6000".to_string(),
            linger: Duration::from_millis(10),
            fetch_retry: RetryPolicy::default(),
            metadata_timeout: Duration::from_secs(10),
        }
    }
}

impl ConsumerConfig {
    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            // Offsets are owned by the checkpoint store, never by the broker.
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", self.reset_policy())
            .set("session.timeout.ms", &self.session_timeout_ms)
            .set("enable.partition.eof", "false");
        config
    }

    fn reset_policy(&self) -> &'static str {
        match self.auto_offset_reset {
            StartOffset::Earliest => "earliest",
            StartOffset::Latest => "latest",
        }
    }

    /// Offset a reader for `partition` is assigned at.
    pub fn start_offset(&self, resume_offset: Option<i64>) -> Offset {
        match (resume_offset, self.auto_offset_reset) {
            (Some(offset), _) => Offset::Offset(offset),
            (None, StartOffset::Earliest) => Offset::Beginning,
            (None, StartOffset::Latest) => Offset::End,
        }
    }
}

/// Kafka reader pinned to a single partition
///
/// Each reader owns its own rdkafka consumer with a manual assignment, so
/// partitions are polled independently and a stalled partition never
/// blocks another one.
pub struct PartitionConsumer {
    consumer: RdkafkaStreamConsumer,
    config: ConsumerConfig,
    partition: i32,
}

impl PartitionConsumer {
    /// Create a consumer assigned to `partition`, starting at `offset`
    pub fn new(config: ConsumerConfig, partition: i32, offset: Offset) -> Result<Self> {
        let consumer: RdkafkaStreamConsumer = config
            .client_config()
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&config.topic, partition, offset)
            .map_err(|e| Error::Consumer(format!("Failed to add partition offset: {e}")))?;
        consumer
            .assign(&tpl)
            .map_err(|e| Error::Consumer(format!("Failed to assign partition {partition}: {e}")))?;

        tracing::debug!(
            "Assigned {}/{} starting at {:?}",
            config.topic,
            partition,
            offset
        );

        Ok(Self {
            consumer,
            config,
            partition,
        })
    }

    /// One batch pull without retries.
    async fn receive_batch(&self, max_count: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        let first = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(received) => received?,
            Err(_) => return Ok(Vec::new()),
        };

        let mut messages = Vec::with_capacity(max_count.max(1));
        messages.push(self.to_raw(&first));

        // Try to fetch more with timeout
        while messages.len() < max_count {
            match tokio::time::timeout(self.config.linger, self.consumer.recv()).await {
                Ok(Ok(msg)) => messages.push(self.to_raw(&msg)),
                Ok(Err(e)) => {
                    // The error resurfaces on the next poll if it persists.
                    tracing::debug!("Stopped filling batch for partition {}: {}", self.partition, e);
                    break;
                }
                Err(_) => break,
            }
        }

        Ok(messages)
    }

    fn to_raw(&self, msg: &RdkafkaBorrowedMessage) -> RawMessage {
        RawMessage::new(
            msg.partition(),
            msg.offset(),
            msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        )
    }

    /// Get the underlying consumer (for advanced use cases)
    pub fn inner(&self) -> &RdkafkaStreamConsumer {
        &self.consumer
    }
}

#[async_trait::async_trait]
impl PartitionReader for PartitionConsumer {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll(&mut self, max_messages: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        let this = &*self;
        let what = format!("Poll of {}/{}", this.config.topic, this.partition);
        retry_transient(&this.config.fetch_retry, &what, || {
            this.receive_batch(max_messages, timeout)
        })
        .await
    }
}
