//! In-memory source, sink and checkpoint doubles with fault injection.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aqi_core::{ParsedReading, RawMessage, RetryPolicy, WriteBatch};
use aqi_sync_kafka_source::{Error as SourceError, LogSource, PartitionReader};
use aqi_sync_pipeline::{PipelineConfig, RejectPolicy};
use checkpoint::{CheckpointID, CheckpointRecord, CheckpointStore, MemoryStore};
use reading_sink::{MemorySink, SinkWriter, WriteError};

pub const TOPIC: &str = "aqi_stream";

pub fn reading_json(city: &str, timestamp: &str, aqi: f64) -> String {
    format!(
        r#"{{"city":"{city}","aqi":{aqi},"pm25":95.2,"pm10":140.1,"o3":12.0,"no2":40.5,"so2":8.3,"timestamp":"{timestamp}"}}"#
    )
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        batch_size: 10,
        poll_timeout: Duration::from_millis(100),
        write_retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(80)),
        reject_policy: RejectPolicy::Drop,
        strict_schema: false,
        progress_interval: 100,
    }
}

/// Poll `cond` on virtual time until it holds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[derive(Default)]
struct PartitionLog {
    payloads: Vec<Vec<u8>>,
    faults: VecDeque<String>,
    rewind_to: Option<i64>,
    opened_at: Vec<i64>,
}

/// Topic whose partitions are plain vectors of payloads; offsets are indices.
#[derive(Clone)]
pub struct FakeSource {
    topic: String,
    logs: Arc<BTreeMap<i32, Mutex<PartitionLog>>>,
}

impl FakeSource {
    pub fn new(partitions: &[i32]) -> Self {
        let logs = partitions
            .iter()
            .map(|&p| (p, Mutex::new(PartitionLog::default())))
            .collect();
        Self {
            topic: TOPIC.to_string(),
            logs: Arc::new(logs),
        }
    }

    fn log(&self, partition: i32) -> std::sync::MutexGuard<'_, PartitionLog> {
        self.logs[&partition].lock().unwrap()
    }

    pub fn push(&self, partition: i32, payload: impl Into<Vec<u8>>) {
        self.log(partition).payloads.push(payload.into());
    }

    /// Make the next poll of `partition` fail with a fatal error.
    pub fn fail_next_poll(&self, partition: i32, reason: &str) {
        self.log(partition).faults.push_back(reason.to_string());
    }

    /// Make the reader of `partition` deliver again from `offset`.
    pub fn rewind(&self, partition: i32, offset: i64) {
        self.log(partition).rewind_to = Some(offset);
    }

    /// Offsets readers of `partition` were opened at, one per `open`.
    pub fn opened_at(&self, partition: i32) -> Vec<i64> {
        self.log(partition).opened_at.clone()
    }
}

pub struct FakeReader {
    source: FakeSource,
    partition: i32,
    next: i64,
}

#[async_trait::async_trait]
impl PartitionReader for FakeReader {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<RawMessage>, SourceError> {
        {
            let mut log = self.source.log(self.partition);
            if let Some(reason) = log.faults.pop_front() {
                return Err(SourceError::Consumer(reason));
            }
            if let Some(offset) = log.rewind_to.take() {
                self.next = offset;
            }
            let start = self.next as usize;
            if start < log.payloads.len() {
                let end = (start + max_messages).min(log.payloads.len());
                let batch: Vec<RawMessage> = (start..end)
                    .map(|i| RawMessage::new(self.partition, i as i64, log.payloads[i].clone()))
                    .collect();
                self.next = end as i64;
                return Ok(batch);
            }
        }
        tokio::time::sleep(timeout).await;
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
impl LogSource for FakeSource {
    type Reader = FakeReader;

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn partitions(&self) -> Result<Vec<i32>, SourceError> {
        Ok(self.logs.keys().copied().collect())
    }

    async fn watermarks(&self, partition: i32) -> Result<(i64, i64), SourceError> {
        Ok((0, self.log(partition).payloads.len() as i64))
    }

    async fn open(
        &self,
        partitions: &[i32],
        resume_offsets: &HashMap<i32, i64>,
    ) -> Result<Vec<FakeReader>, SourceError> {
        Ok(partitions
            .iter()
            .map(|&partition| {
                let next = resume_offsets.get(&partition).copied().unwrap_or(0);
                self.log(partition).opened_at.push(next);
                FakeReader {
                    source: self.clone(),
                    partition,
                    next,
                }
            })
            .collect())
    }
}

/// Memory sink that can be taken down, slowed down or made to fail fatally
/// for one partition.
#[derive(Default)]
pub struct FlakySink {
    inner: MemorySink,
    down: AtomicBool,
    fatal_partition: Mutex<Option<i32>>,
    latency: Mutex<Duration>,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl FlakySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn fail_fatally_for(&self, partition: i32) {
        *self.fatal_partition.lock().unwrap() = Some(partition);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn upserts(&self) -> u64 {
        self.inner.upserts()
    }

    pub fn rows(&self) -> Vec<ParsedReading> {
        self.inner.rows()
    }

    pub fn get(&self, city: &str, timestamp: &str) -> Option<ParsedReading> {
        self.inner.get(city, timestamp)
    }
}

#[async_trait::async_trait]
impl SinkWriter for FlakySink {
    async fn write_batch(&self, batch: &WriteBatch) -> Result<(), WriteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let fatal_partition = *self.fatal_partition.lock().unwrap();
        if let Some(partition) = fatal_partition {
            if batch.covered_offset(partition).is_some() {
                self.failures.fetch_add(1, Ordering::SeqCst);
                return Err(WriteError::Fatal(format!(
                    "table schema mismatch for partition {partition}"
                )));
            }
        }
        if self.down.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(WriteError::Transient("all replicas unavailable".to_string()));
        }
        self.inner.write_batch(batch).await
    }
}

/// Memory checkpoint store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyCheckpoints {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn history(&self, partition: i32) -> Vec<i64> {
        self.inner.history(&CheckpointID::new(TOPIC, partition))
    }

    pub fn last(&self, partition: i32) -> Option<i64> {
        self.history(partition).last().copied()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FlakyCheckpoints {
    async fn store_checkpoint(
        &self,
        id: &CheckpointID,
        record: &CheckpointRecord,
    ) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("checkpoint volume is read-only");
        }
        self.inner.store_checkpoint(id, record).await
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> anyhow::Result<Option<CheckpointRecord>> {
        self.inner.read_checkpoint(id).await
    }

    async fn list_checkpoints(&self, topic: &str) -> anyhow::Result<Vec<CheckpointRecord>> {
        self.inner.list_checkpoints(topic).await
    }
}
