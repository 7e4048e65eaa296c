//! Administration API over the key registry, ban registry and ledger.
//!
//! Every operation goes through [`AdminApi::authorize`], which checks the
//! shared admin token and hands back an [`AdminSession`]. Without a session
//! there is no way to reach the stores, so a bad token can have no side
//! effect.

use crate::clock::SharedClock;
use crate::engine::Gatekeeper;
use crate::ledger::ConnectionLedger;
use crate::protocol::models::{BanEntry, BanKind, ConnectionEvent, Insertion, Removal};
use crate::registry::bans::loggable_value;
use crate::registry::{BanRegistry, KeyRegistry};
use crate::GateError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Authenticated control surface.
pub struct AdminApi {
    token_digest: [u8; 32],
    keys: Arc<KeyRegistry>,
    bans: Arc<BanRegistry>,
    ledger: Arc<ConnectionLedger>,
    clock: SharedClock,
}

impl AdminApi {
    /// Build the admin API over the gate's stores.
    pub fn new(admin_token: &str, gate: &Gatekeeper) -> Self {
        Self {
            token_digest: digest(admin_token),
            keys: gate.keys(),
            bans: gate.bans(),
            ledger: gate.ledger(),
            clock: gate.clock(),
        }
    }

    /// Check a presented token.
    ///
    /// # Errors
    /// `Forbidden` when the token is missing, empty or wrong.
    pub fn authorize(&self, presented: Option<&str>) -> Result<AdminSession<'_>, GateError> {
        match presented {
            Some(token) if !token.is_empty() && tokens_match(&self.token_digest, token) => {
                Ok(AdminSession { api: self })
            }
            _ => {
                warn!(token_present = presented.is_some(), "admin request rejected");
                Err(GateError::Forbidden)
            }
        }
    }
}

/// Proof of a successful token check; carries the admin operations.
pub struct AdminSession<'a> {
    api: &'a AdminApi,
}

impl AdminSession<'_> {
    /// All authorized keys in insertion order.
    pub async fn list_keys(&self) -> Result<Vec<String>, GateError> {
        self.api.keys.list().await
    }

    /// Authorize a new key.
    pub async fn add_key(&self, key: Option<&str>) -> Result<Insertion, GateError> {
        let key = key.ok_or(GateError::MissingKey)?;
        let result = self.api.keys.add(key).await?;
        info!(result = ?result, "admin add key");
        Ok(result)
    }

    /// Revoke a key.
    pub async fn remove_key(&self, key: Option<&str>) -> Result<Removal, GateError> {
        let key = key.ok_or(GateError::MissingKey)?;
        let result = self.api.keys.remove(key).await?;
        info!(result = ?result, "admin remove key");
        Ok(result)
    }

    /// All bans in insertion order.
    pub async fn list_bans(&self) -> Result<Vec<BanEntry>, GateError> {
        self.api.bans.list().await
    }

    /// Add a ban. `kind` must be one of `ip`, `asn`, `key`, `device`.
    pub async fn ban(
        &self,
        kind: Option<&str>,
        value: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Insertion, GateError> {
        let (kind, value) = ban_target(kind, value)?;
        let result = self.api.bans.add(kind, value, reason).await?;
        info!(%kind, value = %loggable_value(kind, value), result = ?result, "admin ban");
        Ok(result)
    }

    /// Lift a ban.
    pub async fn unban(
        &self,
        kind: Option<&str>,
        value: Option<&str>,
    ) -> Result<Removal, GateError> {
        let (kind, value) = ban_target(kind, value)?;
        let result = self.api.bans.remove(kind, value).await?;
        info!(%kind, value = %loggable_value(kind, value), result = ?result, "admin unban");
        Ok(result)
    }

    /// Successful attempts in chronological order.
    pub async fn connections(&self) -> Result<Vec<ConnectionEvent>, GateError> {
        self.api.ledger.list_successful().await
    }

    /// Wrong and banned attempts in chronological order.
    pub async fn failed_attempts(&self) -> Result<Vec<ConnectionEvent>, GateError> {
        self.api.ledger.list_failed().await
    }

    /// Keys seen successfully within `window` of now.
    pub async fn active(&self, window: Duration) -> Result<Vec<ConnectionEvent>, GateError> {
        let now = self.api.clock.now_utc();
        self.api.ledger.list_active(window, now).await
    }
}

/// Validate ban type and value before touching the registry.
fn ban_target<'v>(
    kind: Option<&str>,
    value: Option<&'v str>,
) -> Result<(BanKind, &'v str), GateError> {
    let (Some(kind), Some(value)) = (kind, value) else {
        return Err(GateError::InvalidRequest(
            "type and value required".to_string(),
        ));
    };
    if kind.is_empty() || value.trim().is_empty() {
        return Err(GateError::InvalidRequest(
            "type and value required".to_string(),
        ));
    }
    Ok((kind.parse()?, value))
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Constant-time comparison over SHA-256 digests, so neither the token
/// length nor the position of the first differing byte shows in timing.
fn tokens_match(expected: &[u8; 32], presented: &str) -> bool {
    let presented = digest(presented);
    expected
        .iter()
        .zip(presented.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
