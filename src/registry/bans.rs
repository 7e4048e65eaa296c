//! Ban list keyed by (kind, value).
//!
//! Backed by `bans.json`, a JSON array of [`BanEntry`] in insertion order.

use crate::clock::SharedClock;
use crate::policy::access::{find_ban, BanProbe};
use crate::protocol::models::{BanEntry, BanKind, Insertion, Removal};
use crate::registry::key_fingerprint;
use crate::store::SnapshotFile;
use crate::GateError;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// File name of the ban snapshot inside the data directory.
pub const BANS_FILE: &str = "bans.json";

/// Registry of active bans.
pub struct BanRegistry {
    snapshot: Mutex<SnapshotFile<Vec<BanEntry>>>,
    clock: SharedClock,
}

impl BanRegistry {
    /// Open the registry stored under `data_dir`.
    pub fn open(data_dir: &Path, clock: SharedClock) -> Self {
        Self {
            snapshot: Mutex::new(SnapshotFile::new(data_dir.join(BANS_FILE))),
            clock,
        }
    }

    /// Return the ban that blocks `probe`, if any.
    pub async fn matching(&self, probe: &BanProbe<'_>) -> Result<Option<BanEntry>, GateError> {
        let snapshot = self.snapshot.lock().await;
        let entries = snapshot.load().await?;
        Ok(find_ban(&entries, probe).cloned())
    }

    /// Whether any ban blocks `probe`.
    pub async fn is_banned(&self, probe: &BanProbe<'_>) -> Result<bool, GateError> {
        Ok(self.matching(probe).await?.is_some())
    }

    /// Add a ban. A second add of the same (kind, value) returns `Exists`
    /// and leaves the original entry, reason included, untouched.
    pub async fn add(
        &self,
        kind: BanKind,
        value: &str,
        reason: Option<&str>,
    ) -> Result<Insertion, GateError> {
        let value = require_value(value)?;

        let snapshot = self.snapshot.lock().await;
        let mut entries = snapshot.load().await?;
        if entries.iter().any(|e| e.kind == kind && e.value == value) {
            debug!(%kind, value = %loggable_value(kind, value), "ban already present");
            return Ok(Insertion::Exists);
        }
        entries.push(BanEntry {
            kind,
            value: value.to_string(),
            reason: reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from),
            created_at: self.clock.now_utc(),
        });
        snapshot.save(&entries).await?;

        info!(
            %kind,
            value = %loggable_value(kind, value),
            total = entries.len(),
            "ban added"
        );
        Ok(Insertion::Added)
    }

    /// Remove a ban. Returns `NotFound` without writing if absent.
    pub async fn remove(&self, kind: BanKind, value: &str) -> Result<Removal, GateError> {
        let value = require_value(value)?;

        let snapshot = self.snapshot.lock().await;
        let mut entries = snapshot.load().await?;
        let Some(position) = entries
            .iter()
            .position(|e| e.kind == kind && e.value == value)
        else {
            return Ok(Removal::NotFound);
        };
        entries.remove(position);
        snapshot.save(&entries).await?;

        info!(
            %kind,
            value = %loggable_value(kind, value),
            total = entries.len(),
            "ban removed"
        );
        Ok(Removal::Removed)
    }

    /// All bans in insertion order.
    pub async fn list(&self) -> Result<Vec<BanEntry>, GateError> {
        let snapshot = self.snapshot.lock().await;
        snapshot.load().await
    }
}

fn require_value(value: &str) -> Result<&str, GateError> {
    if value.trim().is_empty() {
        return Err(GateError::InvalidRequest(
            "ban value cannot be empty".to_string(),
        ));
    }
    Ok(value)
}

/// Ban value as it may appear in logs. Key bans show the fingerprint.
pub fn loggable_value(kind: BanKind, value: &str) -> String {
    match kind {
        BanKind::Key => key_fingerprint(value),
        _ => value.to_string(),
    }
}
