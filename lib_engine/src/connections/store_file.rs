//! # File-Backed Reading Store
//!
//! Append-only JSONL journal: one reading per line, newest last. Overwrites
//! of an existing timestamp are resolved on read (last write wins), which
//! keeps `put` a cheap append. A partially written trailing line from a
//! crash mid-write is skipped on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::connections::{ReadingStore, StoreError};
use crate::readings::Reading;

/// Journal file name inside the data directory.
const JOURNAL_FILE: &str = "readings.jsonl";

#[derive(Debug, Clone)]
pub struct FileReadingStore {
    path: PathBuf,
}

impl FileReadingStore {
    /// Store rooted at `data_dir`; the directory is created on `open`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadingStore for FileReadingStore {
    async fn open(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(())
    }

    async fn put(&mut self, reading: &Reading) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(reading)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get_all(&mut self) -> Result<Vec<Reading>, StoreError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Later lines overwrite earlier ones with the same timestamp.
        let mut latest: BTreeMap<i64, Reading> = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Reading>(line) {
                Ok(reading) => {
                    latest.insert(reading.timestamp, reading);
                }
                Err(e) => log::warn!("skipping unreadable journal line: {e}"),
            }
        }
        Ok(latest.into_values().collect())
    }
}
