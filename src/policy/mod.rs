//! Access decision rules.

pub mod access;
