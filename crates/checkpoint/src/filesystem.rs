//! Filesystem-based checkpoint storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::file::CheckpointFile;
use crate::store::{CheckpointID, CheckpointRecord, CheckpointStore};

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores one JSON file per (topic, partition) in a directory. Files are
/// replaced by writing a sibling temp file, syncing it and renaming it over
/// the previous file, so a crash never leaves a torn checkpoint behind.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, id: &CheckpointID) -> PathBuf {
        self.dir.join(CheckpointFile::file_name(id))
    }

    fn read_file(path: &Path) -> Result<CheckpointFile> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Corrupt checkpoint file {}", path.display()))
    }
}

/// Replace `path` with `contents` via temp file + fsync + rename.
fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move checkpoint into {}", path.display()))?;

    // Persist the rename itself.
    #[cfg(unix)]
    std::fs::File::open(dir)?.sync_all()?;

    Ok(())
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn store_checkpoint(&self, id: &CheckpointID, record: &CheckpointRecord) -> Result<()> {
        let contents = serde_json::to_vec_pretty(&CheckpointFile::new(id, record))?;
        let dir = self.dir.clone();
        let path = self.path_for(id);

        // Temp file, fsync and rename are blocking calls.
        let written = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            write_atomically(&dir, &path, &contents)
        })
        .await
        .context("Checkpoint write task failed")??;

        tracing::debug!(
            "Stored checkpoint {} at offset {} to {}",
            id,
            record.offset,
            written.display()
        );
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<CheckpointRecord>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }

        let file = Self::read_file(&path)?;
        if !file.matches(id) {
            anyhow::bail!(
                "Checkpoint file {} belongs to {}/{}, expected {}",
                path.display(),
                file.topic,
                file.record.partition,
                id
            );
        }
        Ok(Some(file.record))
    }

    async fn list_checkpoints(&self, topic: &str) -> Result<Vec<CheckpointRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{topic}-");
        let mut records = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.starts_with(&prefix) && filename.ends_with(".json") {
                let file = Self::read_file(&entry.path())?;
                // "aqi-" also prefixes files of a topic named "aqi-stream"
                if file.topic == topic {
                    records.push(file.record);
                }
            }
        }

        records.sort_by_key(|r| r.partition);
        Ok(records)
    }
}
