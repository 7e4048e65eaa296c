//! Keygate configuration.

use crate::GateError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder token shipped by the old deployment scripts; never accepted.
pub const PLACEHOLDER_ADMIN_TOKEN: &str = "change-me";

/// Default upstream for origin lookups (ip-api.com JSON endpoint).
pub const DEFAULT_ORIGIN_ENDPOINT: &str = "http://ip-api.com/json";

/// Default origin lookup deadline.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on the origin lookup deadline.
pub const MAX_ORIGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default freshness window for the active-connections view.
pub const DEFAULT_ACTIVE_WINDOW: Duration = Duration::from_secs(5);

/// Runtime configuration for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Directory holding `keys.json`, `bans.json` and the ledger logs.
    pub data_dir: PathBuf,

    /// Shared secret required in `X-Admin-Token` for all admin routes.
    pub admin_token: String,

    /// Use the first `X-Forwarded-For` entry as client address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded: bool,

    /// Base URL of the origin lookup service; the address is appended as a path segment.
    pub origin_endpoint: String,

    /// Deadline for a single origin lookup.
    pub origin_timeout: Duration,

    /// When false, every request gets unknown origin metadata and no lookup is made.
    pub origin_lookup: bool,

    /// Window used by the active-connections projection.
    pub active_window: Duration,
}

impl GateConfig {
    /// Build a config with defaults for everything but the admin token and data directory.
    pub fn new(admin_token: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            data_dir: data_dir.into(),
            admin_token: admin_token.into(),
            trust_forwarded: false,
            origin_endpoint: DEFAULT_ORIGIN_ENDPOINT.to_string(),
            origin_timeout: DEFAULT_ORIGIN_TIMEOUT,
            origin_lookup: true,
            active_window: DEFAULT_ACTIVE_WINDOW,
        }
    }

    /// Default data directory: `dirs::data_dir()/keygate`.
    pub fn default_data_dir() -> Result<PathBuf, GateError> {
        dirs::data_dir()
            .map(|dir| dir.join("keygate"))
            .ok_or_else(|| GateError::ConfigError("Could not find data directory".to_string()))
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), GateError> {
        if self.admin_token.trim().is_empty() {
            return Err(GateError::ConfigError(
                "admin_token cannot be empty".to_string(),
            ));
        }
        if self.admin_token == PLACEHOLDER_ADMIN_TOKEN {
            return Err(GateError::ConfigError(format!(
                "admin_token must not be the placeholder {:?}",
                PLACEHOLDER_ADMIN_TOKEN
            )));
        }
        if self.origin_timeout.is_zero() || self.origin_timeout > MAX_ORIGIN_TIMEOUT {
            return Err(GateError::ConfigError(format!(
                "origin_timeout must be between 1ms and {}s, got {}ms",
                MAX_ORIGIN_TIMEOUT.as_secs(),
                self.origin_timeout.as_millis()
            )));
        }
        if self.active_window.is_zero() {
            return Err(GateError::ConfigError(
                "active_window cannot be zero".to_string(),
            ));
        }
        if self.origin_lookup && self.origin_endpoint.trim().is_empty() {
            return Err(GateError::ConfigError(
                "origin_endpoint cannot be empty when origin lookup is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
