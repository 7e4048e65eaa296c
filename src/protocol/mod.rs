//! Typed request, response and storage schema.

pub mod models;
