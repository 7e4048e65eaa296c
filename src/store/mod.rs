//! On-disk persistence for registries and the ledger.

pub mod file;

pub use file::{AppendLog, SnapshotFile};
