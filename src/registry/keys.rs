//! Authorized license keys.
//!
//! Backed by `keys.json`, a JSON array of strings in insertion order. Every
//! operation reloads the file, so edits made out of band are picked up.

use crate::protocol::models::{Insertion, Removal};
use crate::store::SnapshotFile;
use crate::GateError;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// File name of the key snapshot inside the data directory.
pub const KEYS_FILE: &str = "keys.json";

/// The set of authorized license keys.
pub struct KeyRegistry {
    snapshot: Mutex<SnapshotFile<Vec<String>>>,
}

impl KeyRegistry {
    /// Open the registry stored under `data_dir`.
    pub fn open(data_dir: &Path) -> Self {
        Self {
            snapshot: Mutex::new(SnapshotFile::new(data_dir.join(KEYS_FILE))),
        }
    }

    /// Whether `key` is authorized.
    pub async fn contains(&self, key: &str) -> Result<bool, GateError> {
        let snapshot = self.snapshot.lock().await;
        let keys = snapshot.load().await?;
        Ok(keys.iter().any(|k| k == key))
    }

    /// Add a key. Returns `Exists` without writing if it is already present.
    pub async fn add(&self, key: &str) -> Result<Insertion, GateError> {
        let key = require_key(key)?;

        let snapshot = self.snapshot.lock().await;
        let mut keys = snapshot.load().await?;
        if keys.iter().any(|k| k == key) {
            debug!(key = %key_fingerprint(key), "key already present");
            return Ok(Insertion::Exists);
        }
        keys.push(key.to_string());
        snapshot.save(&keys).await?;

        info!(key = %key_fingerprint(key), total = keys.len(), "key added");
        Ok(Insertion::Added)
    }

    /// Remove a key. Returns `NotFound` without writing if it is absent.
    pub async fn remove(&self, key: &str) -> Result<Removal, GateError> {
        let key = require_key(key)?;

        let snapshot = self.snapshot.lock().await;
        let mut keys = snapshot.load().await?;
        let Some(position) = keys.iter().position(|k| k == key) else {
            return Ok(Removal::NotFound);
        };
        keys.remove(position);
        snapshot.save(&keys).await?;

        info!(key = %key_fingerprint(key), total = keys.len(), "key removed");
        Ok(Removal::Removed)
    }

    /// All keys in insertion order.
    pub async fn list(&self) -> Result<Vec<String>, GateError> {
        let snapshot = self.snapshot.lock().await;
        snapshot.load().await
    }
}

/// Reject empty keys before any registry access.
fn require_key(key: &str) -> Result<&str, GateError> {
    if key.trim().is_empty() {
        return Err(GateError::MissingKey);
    }
    Ok(key)
}

/// Short SHA-256 fingerprint of a license key, for logs.
///
/// Keeps raw keys out of log output while still letting operators
/// correlate lines for the same key.
pub fn key_fingerprint(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(&hash[..6])
}
