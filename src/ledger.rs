//! Connection ledger: an append-only history of validation attempts.
//!
//! Successful attempts go to `connections.jsonl`, wrong and banned ones to
//! `failed.jsonl`. A single lock covers both files so that appends are
//! totally ordered.
//!
//! The "active connections" view is a read-only projection over the
//! successful log (latest event per key inside a freshness window). There
//! is no separate last-seen table.

use crate::protocol::models::ConnectionEvent;
use crate::registry::key_fingerprint;
use crate::store::AppendLog;
use crate::GateError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Log of successful attempts.
pub const CONNECTIONS_FILE: &str = "connections.jsonl";

/// Log of wrong and banned attempts.
pub const FAILED_FILE: &str = "failed.jsonl";

struct LedgerLogs {
    connections: AppendLog<ConnectionEvent>,
    failed: AppendLog<ConnectionEvent>,
}

impl LedgerLogs {
    fn for_event(&self, event: &ConnectionEvent) -> &AppendLog<ConnectionEvent> {
        if event.outcome.is_success() {
            &self.connections
        } else {
            &self.failed
        }
    }
}

/// Append-only record of every validation attempt.
pub struct ConnectionLedger {
    logs: Mutex<LedgerLogs>,
}

impl ConnectionLedger {
    /// Open the ledger stored under `data_dir`.
    pub fn open(data_dir: &Path) -> Self {
        Self {
            logs: Mutex::new(LedgerLogs {
                connections: AppendLog::new(data_dir.join(CONNECTIONS_FILE)),
                failed: AppendLog::new(data_dir.join(FAILED_FILE)),
            }),
        }
    }

    /// Append one event. Returns only after the line is on disk.
    pub async fn record(&self, event: &ConnectionEvent) -> Result<(), GateError> {
        let logs = self.logs.lock().await;
        logs.for_event(event).append(event).await?;
        debug!(
            key = %key_fingerprint(&event.key),
            address = %event.address,
            outcome = ?event.outcome,
            "attempt recorded"
        );
        Ok(())
    }

    /// Successful attempts in append order.
    pub async fn list_successful(&self) -> Result<Vec<ConnectionEvent>, GateError> {
        let logs = self.logs.lock().await;
        logs.connections.read_all().await
    }

    /// Wrong and banned attempts in append order.
    pub async fn list_failed(&self) -> Result<Vec<ConnectionEvent>, GateError> {
        let logs = self.logs.lock().await;
        logs.failed.read_all().await
    }

    /// Latest successful event per key whose timestamp lies within `window` of `now`.
    ///
    /// Ordered by timestamp, oldest first.
    pub async fn list_active(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConnectionEvent>, GateError> {
        let events = self.list_successful().await?;
        Ok(active_projection(events, window, now))
    }
}

/// Reduce a success log to the live view.
fn active_projection(
    events: Vec<ConnectionEvent>,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<ConnectionEvent> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);

    let mut latest: HashMap<String, ConnectionEvent> = HashMap::new();
    for event in events {
        let newer = latest
            .get(&event.key)
            .map_or(true, |seen| event.timestamp >= seen.timestamp);
        if newer {
            latest.insert(event.key.clone(), event);
        }
    }

    let mut active: Vec<ConnectionEvent> = latest
        .into_values()
        .filter(|event| {
            let age = now.signed_duration_since(event.timestamp);
            age <= window
        })
        .collect();
    active.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{OriginInfo, Outcome};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn at(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, seconds).unwrap()
    }

    fn event(key: &str, outcome: Outcome, timestamp: DateTime<Utc>) -> ConnectionEvent {
        ConnectionEvent {
            address: "1.2.3.4".to_string(),
            key: key.to_string(),
            device_name: None,
            device_info: None,
            origin: OriginInfo::unknown(),
            outcome,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_record_splits_by_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = ConnectionLedger::open(temp_dir.path());

        ledger.record(&event("A", Outcome::Success, at(0))).await.unwrap();
        ledger.record(&event("B", Outcome::Wrong, at(1))).await.unwrap();
        ledger.record(&event("C", Outcome::Banned, at(2))).await.unwrap();

        let ok = ledger.list_successful().await.unwrap();
        let failed = ledger.list_failed().await.unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].key, "A");
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].outcome, Outcome::Wrong);
        assert_eq!(failed[1].outcome, Outcome::Banned);
    }

    #[tokio::test]
    async fn test_events_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let ledger = ConnectionLedger::open(temp_dir.path());
            ledger.record(&event("A", Outcome::Success, at(0))).await.unwrap();
        }
        let ledger = ConnectionLedger::open(temp_dir.path());
        assert_eq!(ledger.list_successful().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Arc::new(ConnectionLedger::open(temp_dir.path()));

        let mut handles = Vec::new();
        for n in 0..32 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let outcome = if n % 2 == 0 {
                    Outcome::Success
                } else {
                    Outcome::Wrong
                };
                ledger
                    .record(&event(&format!("K{}", n), outcome, at(0)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(ledger.list_successful().await.unwrap().len(), 16);
        assert_eq!(ledger.list_failed().await.unwrap().len(), 16);
    }

    #[test]
    fn test_active_projection_keeps_latest_within_window() {
        let events = vec![
            event("A", Outcome::Success, at(0)),
            event("B", Outcome::Success, at(7)),
            event("A", Outcome::Success, at(8)),
            event("C", Outcome::Success, at(1)),
        ];

        let active = active_projection(events, Duration::from_secs(5), at(10));
        let keys: Vec<&str> = active.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["B", "A"]);
        assert_eq!(active[1].timestamp, at(8));
    }

    #[test]
    fn test_active_projection_window_is_inclusive() {
        let events = vec![event("A", Outcome::Success, at(5))];
        assert_eq!(
            active_projection(events.clone(), Duration::from_secs(5), at(10)).len(),
            1
        );
        assert!(active_projection(events, Duration::from_secs(4), at(10)).is_empty());
    }

    #[tokio::test]
    async fn test_list_active_ignores_failures() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = ConnectionLedger::open(temp_dir.path());

        ledger.record(&event("A", Outcome::Wrong, at(9))).await.unwrap();
        ledger.record(&event("B", Outcome::Success, at(9))).await.unwrap();

        let active = ledger
            .list_active(Duration::from_secs(5), at(10))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, "B");
    }
}
