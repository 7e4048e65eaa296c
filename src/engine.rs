//! Validation engine - the decision path behind `/check`.
//!
//! Per request:
//! 1. Reject a missing key (no ledger record)
//! 2. Resolve origin (no lock held; degrades to unknown)
//! 3. Check bans; a match ends the decision as `banned`
//! 4. Check key membership: `success` or `wrong`
//! 5. Record the attempt in the ledger
//!
//! The caller only ever learns the outcome tag.

use crate::clock::{SharedClock, SystemClock};
use crate::config::GateConfig;
use crate::ledger::ConnectionLedger;
use crate::origin::{HttpOriginResolver, OriginResolver, StaticOriginResolver};
use crate::policy::access::{verdict, BanProbe};
use crate::protocol::models::{CheckRequest, ConnectionEvent, Outcome};
use crate::registry::{key_fingerprint, BanRegistry, KeyRegistry};
use crate::GateError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The validation engine and owner of the shared stores.
///
/// Create one per process; the admin API borrows the same stores through
/// [`Gatekeeper::keys`], [`Gatekeeper::bans`] and [`Gatekeeper::ledger`].
pub struct Gatekeeper {
    keys: Arc<KeyRegistry>,
    bans: Arc<BanRegistry>,
    ledger: Arc<ConnectionLedger>,
    origin: Arc<dyn OriginResolver>,
    clock: SharedClock,
}

impl Gatekeeper {
    /// Open the stores under `config.data_dir` and build the configured resolver.
    ///
    /// # Errors
    /// Returns an error if configuration validation fails or the HTTP
    /// client for origin lookups cannot be built.
    pub fn open(config: &GateConfig) -> Result<Self, GateError> {
        config.validate()?;

        let origin: Arc<dyn OriginResolver> = if config.origin_lookup {
            Arc::new(HttpOriginResolver::new(config)?)
        } else {
            Arc::new(StaticOriginResolver::unknown())
        };

        Ok(Self::with_parts(
            &config.data_dir,
            origin,
            Arc::new(SystemClock),
        ))
    }

    /// Build a gate over explicit parts. Used by tests to inject a fake
    /// resolver and clock.
    pub fn with_parts(
        data_dir: &Path,
        origin: Arc<dyn OriginResolver>,
        clock: SharedClock,
    ) -> Self {
        Self {
            keys: Arc::new(KeyRegistry::open(data_dir)),
            bans: Arc::new(BanRegistry::open(data_dir, Arc::clone(&clock))),
            ledger: Arc::new(ConnectionLedger::open(data_dir)),
            origin,
            clock,
        }
    }

    /// Decide a validation request and record it.
    ///
    /// # Errors
    /// - `MissingKey` - no key supplied; nothing is recorded
    /// - `StoreIO` / `StoreCorrupt` - a store could not be read or the
    ///   attempt could not be persisted
    pub async fn check(&self, request: CheckRequest) -> Result<Outcome, GateError> {
        let CheckRequest {
            key,
            device_name,
            device_info,
            address,
        } = request;

        let key = match key {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                debug!(%address, "check without key");
                return Err(GateError::MissingKey);
            }
        };
        let device_name = device_name.filter(|d| !d.trim().is_empty());

        // Slow external step; registries stay unlocked while it runs
        let origin = self.origin.resolve(&address).await;

        let probe = BanProbe {
            address: &address,
            key: &key,
            asn: origin.asn.as_deref(),
            device_name: device_name.as_deref(),
        };

        let outcome = match self.bans.matching(&probe).await? {
            Some(ban) => {
                warn!(
                    key = %key_fingerprint(&key),
                    %address,
                    ban_type = %ban.kind,
                    "blocked by ban"
                );
                verdict(true, false)
            }
            None => verdict(false, self.keys.contains(&key).await?),
        };

        let event = ConnectionEvent {
            address,
            key,
            device_name,
            device_info,
            origin,
            outcome,
            timestamp: self.clock.now_utc(),
        };
        self.ledger.record(&event).await?;

        info!(
            key = %key_fingerprint(&event.key),
            address = %event.address,
            outcome = ?outcome,
            asn = event.origin.asn.as_deref().unwrap_or("unknown"),
            "license check"
        );
        Ok(outcome)
    }

    /// Key registry shared with the admin API.
    pub fn keys(&self) -> Arc<KeyRegistry> {
        Arc::clone(&self.keys)
    }

    /// Ban registry shared with the admin API.
    pub fn bans(&self) -> Arc<BanRegistry> {
        Arc::clone(&self.bans)
    }

    /// Connection ledger shared with the admin API.
    pub fn ledger(&self) -> Arc<ConnectionLedger> {
        Arc::clone(&self.ledger)
    }

    /// Clock used for event timestamps.
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }
}
