use std::time::Duration;

use aqi_core::RetryPolicy;
use clap::Args;

use crate::consumer::ConsumerConfig;
use crate::source::StartOffset;

/// Kafka source options
#[derive(Debug, Clone, Args)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated or multiple --brokers)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "localhost:9092",
        env = "AQI_KAFKA_BROKERS"
    )]
    pub brokers: Vec<String>,

    /// Topic carrying the sensor readings
    #[arg(long, default_value = "aqi_stream", env = "AQI_KAFKA_TOPIC")]
    pub topic: String,

    /// Consumer group ID reported to the brokers
    #[arg(long, default_value = "AirQualityStreaming")]
    pub group_id: String,

    /// Start position for partitions without a checkpoint
    #[arg(long, value_enum, default_value = "earliest")]
    pub auto_offset_reset: StartOffset,

    /// Session timeout in milliseconds
    #[arg(long, default_value = "6000")]
    pub session_timeout_ms: String,

    /// Poll attempts on transient broker errors before a partition halts
    #[arg(long, default_value_t = 5)]
    pub fetch_retries: u32,

    /// Topic receiving rejected records when dead-lettering to Kafka.
    /// When unset, the dead-letter file is used instead.
    #[arg(long)]
    pub dead_letter_topic: Option<String>,
}

impl KafkaOpts {
    pub fn brokers(&self) -> String {
        self.brokers.join(",")
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            brokers: self.brokers(),
            group_id: self.group_id.clone(),
            topic: self.topic.clone(),
            auto_offset_reset: self.auto_offset_reset,
            session_timeout_ms: self.session_timeout_ms.clone(),
            fetch_retry: RetryPolicy::new(
                self.fetch_retries,
                Duration::from_millis(200),
                Duration::from_secs(10),
            ),
            ..Default::default()
        }
    }
}
