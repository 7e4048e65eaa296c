//! Key and ban registries.
//!
//! Each registry owns one lock that covers the full load, mutate and save
//! cycle of its snapshot file.

pub mod bans;
pub mod keys;

pub use bans::BanRegistry;
pub use keys::{key_fingerprint, KeyRegistry};
