//! Dead-letter sinks that do not need a broker.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aqi_core::DeadLetterRecord;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::WriteError;
use crate::traits::DeadLetterSink;

/// Appends rejected records to a JSON-lines file.
///
/// Each `send` appends all records and syncs the file before returning, so
/// a rejected record is on disk before its offset can be checkpointed.
/// Appends are serialized through a lock because several partitions share
/// one file.
///
/// A failed append is truncated away before the error is returned. A file
/// that already ends in a partial line (a crash mid-append) gets a newline
/// before the next records, so they always start on a line of their own.
pub struct JsonlDeadLetter {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonlDeadLetter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for JsonlDeadLetter {
    async fn send(&self, records: &[DeadLetterRecord]) -> Result<(), WriteError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| WriteError::Fatal(format!("Failed to encode dead letter: {e}")))?;
            buf.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WriteError::Fatal(format!("Failed to create {}: {e}", parent.display())))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                WriteError::Transient(format!("Failed to open {}: {e}", self.path.display()))
            })?;

        let len = file
            .metadata()
            .await
            .map_err(|e| WriteError::Transient(format!("Failed to stat dead letters: {e}")))?
            .len();
        if !ends_with_newline(&mut file, len).await? {
            buf.insert(0, b'\n');
        }

        if let Err(e) = append(&mut file, &buf).await {
            if let Err(truncate_err) = file.set_len(len).await {
                tracing::warn!(
                    "Failed to truncate {} after a failed append: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(WriteError::Transient(format!("Failed to append dead letters: {e}")));
        }

        tracing::debug!(
            "Appended {} dead letters to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

async fn ends_with_newline(file: &mut tokio::fs::File, len: u64) -> Result<bool, WriteError> {
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(std::io::SeekFrom::Start(len - 1))
        .await
        .map_err(|e| WriteError::Transient(format!("Failed to read dead letters: {e}")))?;
    file.read_exact(&mut last)
        .await
        .map_err(|e| WriteError::Transient(format!("Failed to read dead letters: {e}")))?;
    Ok(last[0] == b'\n')
}

async fn append(file: &mut tokio::fs::File, buf: &[u8]) -> std::io::Result<()> {
    file.write_all(buf).await?;
    file.sync_all().await
}

/// Keeps rejected records in memory, for tests.
#[derive(Default)]
pub struct MemoryDeadLetter {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for MemoryDeadLetter {
    async fn send(&self, records: &[DeadLetterRecord]) -> Result<(), WriteError> {
        self.records
            .lock()
            .map_err(|_| WriteError::Fatal("dead-letter buffer poisoned".to_string()))?
            .extend_from_slice(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_core::{RawMessage, SchemaValidator};

    fn rejected(offset: i64, payload: &str) -> DeadLetterRecord {
        let message = RawMessage::new(0, offset, payload.as_bytes().to_vec());
        let err = SchemaValidator::new().parse(&message).unwrap_err();
        DeadLetterRecord::from_rejection("aqi_stream", &message, &err)
    }

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_record() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dlq").join("rejected.jsonl");
        let sink = JsonlDeadLetter::new(&path);

        sink.send(&[rejected(1, "{}"), rejected(2, "not json")])
            .await
            .unwrap();
        sink.send(&[rejected(3, "[]")]).await.unwrap();
        sink.send(&[]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let third: DeadLetterRecord = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(third.offset, 3);
        assert_eq!(third.payload, "[]");
    }

    #[tokio::test]
    async fn test_jsonl_starts_new_line_after_torn_append() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rejected.jsonl");
        std::fs::write(&path, r#"{"topic":"aqi_stream","partition":0,"off"#).unwrap();
        let sink = JsonlDeadLetter::new(&path);

        sink.send(&[rejected(7, "{}")]).await.unwrap();
        sink.send(&[rejected(8, "{}")]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(serde_json::from_str::<DeadLetterRecord>(lines[0]).is_err());

        let offsets: Vec<i64> = lines[1..]
            .iter()
            .map(|line| serde_json::from_str::<DeadLetterRecord>(line).unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![7, 8]);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_memory_dead_letter_collects() {
        let sink = MemoryDeadLetter::new();
        sink.send(&[rejected(5, "{}")]).await.unwrap();
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].offset, 5);
    }
}
