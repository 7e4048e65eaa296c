//! # Keygate
//!
//! **License-key validation gate with ban lists and an admin API.**
//!
//! Clients present a license key (plus optional device details) and get back
//! `success`, `wrong` or `banned`. Operators manage the authorized keys and
//! the ban list, and read the history of attempts.
//!
//! ## Decision path
//!
//! 1. Resolve the client's network origin (best effort, short deadline)
//! 2. Any matching ban (ip, asn, key, device) wins: `banned`
//! 3. Key in the registry: `success`, otherwise `wrong`
//! 4. Append the attempt to the connection ledger
//!
//! ## Quickstart
//!
//! ```no_run
//! use keygate::http::{serve, AppState};
//! use keygate::{AdminApi, GateConfig, Gatekeeper};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GateConfig::new("a-long-random-admin-token", "/var/lib/keygate");
//!
//!     let gate = Arc::new(Gatekeeper::open(&config)?);
//!     let admin = Arc::new(AdminApi::new(&config.admin_token, &gate));
//!     let state = AppState::new(gate, admin, config.trust_forwarded, config.active_window);
//!
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//!     serve(listener, state).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Consistency
//!
//! Each store (keys, bans, ledger) has one lock held across its whole
//! load-modify-save cycle, so concurrent admin calls never lose updates and
//! two concurrent adds of the same key report `added` exactly once. The
//! origin lookup runs with no lock held.
//!
//! ## Storage
//!
//! Under the data directory:
//! - `keys.json` - JSON array of keys
//! - `bans.json` - JSON array of ban entries
//! - `connections.jsonl` - successful attempts, one JSON event per line
//! - `failed.jsonl` - wrong and banned attempts

#![deny(warnings)]
#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Schema
pub mod protocol;

// Persistence
pub mod store;

// State
pub mod ledger;
pub mod registry;

// Origin lookup
pub mod origin;

// Decision rules
pub mod policy;

// Engine and admin surface
pub mod admin;
pub mod engine;

// HTTP binding
pub mod http;

// Re-exports for public API
pub use admin::{AdminApi, AdminSession};
pub use clock::{Clock, SharedClock, SystemClock};
pub use config::GateConfig;
pub use engine::Gatekeeper;
pub use errors::GateError;
pub use ledger::ConnectionLedger;
pub use origin::{HttpOriginResolver, OriginResolver, StaticOriginResolver};
pub use protocol::models::{
    BanEntry, BanKind, ConnectionEvent, Insertion, OriginInfo, Outcome, Removal,
};
pub use registry::{BanRegistry, KeyRegistry};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
