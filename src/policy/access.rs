//! Ban matching and verdict rules.
//!
//! Pure functions over already-loaded state; the registries and the engine
//! supply the data and hold the locks.
//!
//! Rule: any active ban of any matching kind blocks the request, and a ban
//! always wins over a valid key.

use crate::protocol::models::{BanEntry, BanKind, Outcome};

/// The attributes of one request that bans are matched against.
#[derive(Debug, Clone, Copy)]
pub struct BanProbe<'a> {
    /// Client address.
    pub address: &'a str,
    /// Presented license key.
    pub key: &'a str,
    /// Resolved ASN, `None` when unknown.
    pub asn: Option<&'a str>,
    /// Client-reported device name.
    pub device_name: Option<&'a str>,
}

/// Check whether a single ban entry applies to a probe.
///
/// Unknown ASN and absent device name never match.
pub fn ban_matches(entry: &BanEntry, probe: &BanProbe<'_>) -> bool {
    match entry.kind {
        BanKind::Ip => entry.value == probe.address,
        BanKind::Key => entry.value == probe.key,
        BanKind::Asn => probe.asn.is_some_and(|asn| entry.value == asn),
        BanKind::Device => probe
            .device_name
            .is_some_and(|device| entry.value == device),
    }
}

/// Find the first ban that applies to a probe.
pub fn find_ban<'e>(entries: &'e [BanEntry], probe: &BanProbe<'_>) -> Option<&'e BanEntry> {
    entries.iter().find(|entry| ban_matches(entry, probe))
}

/// Decide the outcome from ban state and key membership.
pub fn verdict(banned: bool, key_known: bool) -> Outcome {
    if banned {
        Outcome::Banned
    } else if key_known {
        Outcome::Success
    } else {
        Outcome::Wrong
    }
}
