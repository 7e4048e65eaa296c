//! File-backed stores.
//!
//! Two shapes are used:
//! - [`SnapshotFile`] holds a whole collection as one JSON document and is
//!   rewritten through temp file + rename, so readers never see a torn file.
//! - [`AppendLog`] holds one JSON record per line and only ever appends.
//!
//! Neither type locks. Callers wrap them in a `tokio::sync::Mutex` so that a
//! load-modify-save cycle runs as one critical section.

use crate::GateError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Whole-collection JSON snapshot on disk.
#[derive(Debug)]
pub struct SnapshotFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SnapshotFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Bind a snapshot to a file path. Nothing is touched until load/save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file is the empty collection.
    pub async fn load(&self) -> Result<T, GateError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(GateError::StoreIO(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            GateError::StoreCorrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Save the snapshot atomically.
    ///
    /// Uses temp file + rename; the data is synced before the rename.
    pub async fn save(&self, value: &T) -> Result<(), GateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GateError::StoreIO(format!("Failed to create dir: {}", e)))?;
        }

        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| GateError::StoreIO(format!("Failed to serialize: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to create temp file: {}", e)))?;
        file.write_all(&json)
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to write temp file: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to sync temp file: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to rename snapshot: {}", e)))?;

        Ok(())
    }
}

/// Append-only JSON-lines log on disk.
#[derive(Debug)]
pub struct AppendLog<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AppendLog<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Bind a log to a file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk before returning.
    pub async fn append(&self, record: &T) -> Result<(), GateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GateError::StoreIO(format!("Failed to create dir: {}", e)))?;
        }

        let mut line = serde_json::to_vec(record)
            .map_err(|e| GateError::StoreIO(format!("Failed to serialize: {}", e)))?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to open log: {}", e)))?;
        file.write_all(&line)
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to append: {}", e)))?;
        file.sync_data()
            .await
            .map_err(|e| GateError::StoreIO(format!("Failed to sync log: {}", e)))?;

        Ok(())
    }

    /// Read every record in append order.
    ///
    /// A missing file is an empty log. Lines that fail to parse (for example a
    /// partial line left by a crash) are skipped.
    pub async fn read_all(&self) -> Result<Vec<T>, GateError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GateError::StoreIO(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping unreadable log line"
                ),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot: SnapshotFile<Vec<String>> =
            SnapshotFile::new(temp_dir.path().join("keys.json"));
        assert!(snapshot.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot: SnapshotFile<Vec<String>> =
            SnapshotFile::new(temp_dir.path().join("keys.json"));

        snapshot
            .save(&vec!["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(snapshot.load().await.unwrap(), vec!["A", "B"]);

        // No temp file left behind
        assert!(!temp_dir.path().join("keys.tmp").exists());
    }

    #[tokio::test]
    async fn test_snapshot_creates_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("keys.json");
        let snapshot: SnapshotFile<Vec<String>> = SnapshotFile::new(path.clone());

        snapshot.save(&vec!["A".to_string()]).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_snapshot_corrupt_file_fails_closed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.json");
        std::fs::write(&path, "[\"A\", ").unwrap();

        let snapshot: SnapshotFile<Vec<String>> = SnapshotFile::new(path);
        assert!(matches!(
            snapshot.load().await,
            Err(GateError::StoreCorrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_blank_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.json");
        std::fs::write(&path, "\n").unwrap();

        let snapshot: SnapshotFile<Vec<String>> = SnapshotFile::new(path);
        assert!(snapshot.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_log_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let log: AppendLog<u32> = AppendLog::new(temp_dir.path().join("events.jsonl"));

        for n in [3, 1, 2] {
            log.append(&n).await.unwrap();
        }
        assert_eq!(log.read_all().await.unwrap(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_append_log_skips_torn_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        std::fs::write(&path, "1\n{\"trunc\n2\n").unwrap();

        let log: AppendLog<u32> = AppendLog::new(path);
        assert_eq!(log.read_all().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_append_log_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log: AppendLog<u32> = AppendLog::new(temp_dir.path().join("none.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());
    }
}
