use crate::consumer::{ConsumerConfig, PartitionConsumer};
use crate::error::{Error, Result};
use crate::source::{retry_transient, LogSource};
use rdkafka::consumer::{BaseConsumer, Consumer as RdkafkaConsumer};
use std::collections::HashMap;
use std::sync::Arc;

/// Kafka client for one topic
///
/// Answers metadata queries through a shared, unassigned consumer and
/// creates one [`PartitionConsumer`] per partition on `open`.
pub struct Client {
    metadata: Arc<BaseConsumer>,
    config: ConsumerConfig,
}

impl Client {
    pub fn new(config: ConsumerConfig) -> Result<Self> {
        if config.topic.is_empty() {
            return Err(Error::InvalidConfig("topic must not be empty".to_string()));
        }
        let metadata: BaseConsumer = config
            .client_config()
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create metadata client: {e}")))?;
        Ok(Self {
            metadata: Arc::new(metadata),
            config,
        })
    }

    async fn fetch_partitions(&self) -> Result<Vec<i32>> {
        let metadata = Arc::clone(&self.metadata);
        let topic = self.config.topic.clone();
        let timeout = self.config.metadata_timeout;

        let ids = tokio::task::spawn_blocking(move || -> Result<Vec<i32>> {
            let cluster = metadata.fetch_metadata(Some(&topic), timeout)?;
            let Some(found) = cluster.topics().iter().find(|t| t.name() == topic) else {
                return Ok(Vec::new());
            };
            if let Some(err) = found.error() {
                return Err(Error::Unavailable(format!(
                    "Metadata for topic {topic} reports {err:?}"
                )));
            }
            Ok(found.partitions().iter().map(|p| p.id()).collect())
        })
        .await
        .map_err(|e| Error::Consumer(format!("Metadata task failed: {e}")))??;

        Ok(ids)
    }

    async fn fetch_watermarks(&self, partition: i32) -> Result<(i64, i64)> {
        let metadata = Arc::clone(&self.metadata);
        let topic = self.config.topic.clone();
        let timeout = self.config.metadata_timeout;

        tokio::task::spawn_blocking(move || metadata.fetch_watermarks(&topic, partition, timeout))
            .await
            .map_err(|e| Error::Consumer(format!("Watermark task failed: {e}")))?
            .map_err(Error::from)
    }

    /// Get the config
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl LogSource for Client {
    type Reader = PartitionConsumer;

    fn topic(&self) -> &str {
        &self.config.topic
    }

    async fn partitions(&self) -> Result<Vec<i32>> {
        let what = format!("Metadata query for topic {}", self.config.topic);
        let mut ids = retry_transient(&self.config.fetch_retry, &what, || self.fetch_partitions())
            .await?;
        if ids.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "Topic {} does not exist or has no partitions",
                self.config.topic
            )));
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn watermarks(&self, partition: i32) -> Result<(i64, i64)> {
        let what = format!("Watermark query for {}/{}", self.config.topic, partition);
        retry_transient(&self.config.fetch_retry, &what, || {
            self.fetch_watermarks(partition)
        })
        .await
    }

    async fn open(
        &self,
        partitions: &[i32],
        resume_offsets: &HashMap<i32, i64>,
    ) -> Result<Vec<PartitionConsumer>> {
        let mut readers = Vec::with_capacity(partitions.len());
        for &partition in partitions {
            let resume = resume_offsets.get(&partition).copied();
            if let Some(resume) = resume {
                match self.watermarks(partition).await {
                    Ok((low, _)) if resume < low => tracing::warn!(
                        "Checkpoint of {}/{} resumes at offset {} but the earliest retained offset is {}; \
                         offsets {}..{} were removed by retention and will not be processed",
                        self.config.topic,
                        partition,
                        resume,
                        low,
                        resume,
                        low
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(
                        "Could not read watermarks of {}/{}: {}",
                        self.config.topic,
                        partition,
                        e
                    ),
                }
            }

            let offset = self.config.start_offset(resume);
            tracing::info!(
                "Opening {}/{} at {:?}",
                self.config.topic,
                partition,
                offset
            );
            readers.push(PartitionConsumer::new(self.config.clone(), partition, offset)?);
        }
        Ok(readers)
    }
}
