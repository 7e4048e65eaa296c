//! Wire and storage schema: bans, origin metadata, ledger events and
//! the request/response bodies of the HTTP surface.

use crate::GateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a ban entry matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanKind {
    /// Client address.
    Ip,
    /// Autonomous system number, e.g. `AS15169`.
    Asn,
    /// License key.
    Key,
    /// Client-reported device name.
    Device,
}

impl BanKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            BanKind::Ip => "ip",
            BanKind::Asn => "asn",
            BanKind::Key => "key",
            BanKind::Device => "device",
        }
    }
}

impl fmt::Display for BanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BanKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(BanKind::Ip),
            "asn" => Ok(BanKind::Asn),
            "key" => Ok(BanKind::Key),
            "device" => Ok(BanKind::Device),
            other => Err(GateError::InvalidRequest(format!(
                "unknown ban type {:?}",
                other
            ))),
        }
    }
}

/// A persisted ban. Never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    /// Kind of value being banned.
    #[serde(rename = "type")]
    pub kind: BanKind,
    /// Banned value, compared by exact match.
    pub value: String,
    /// Operator note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the ban was added.
    pub created_at: DateTime<Utc>,
}

/// Best-effort network origin of a client address.
///
/// `None` means unknown. Advisory only; never used to grant access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginInfo {
    /// ASN such as `AS13335`.
    pub asn: Option<String>,
    /// Organization name.
    pub organization: Option<String>,
    /// ISP name.
    pub isp: Option<String>,
}

impl OriginInfo {
    /// The fully unknown origin.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// True when no field is known.
    pub fn is_unknown(&self) -> bool {
        self.asn.is_none() && self.organization.is_none() && self.isp.is_none()
    }
}

/// Verdict recorded for a validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Key authorized and nothing banned.
    Success,
    /// Key not in the registry.
    Wrong,
    /// A ban matched.
    Banned,
}

impl Outcome {
    /// Whether this outcome grants access.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// One validation attempt. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// Client address as seen by the gate.
    pub address: String,
    /// Presented license key.
    pub key: String,
    /// Client-reported device name.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Opaque client-reported device details.
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
    /// Origin snapshot taken at event time.
    #[serde(default)]
    pub origin: OriginInfo,
    /// Verdict.
    pub outcome: Outcome,
    /// When the attempt was decided.
    pub timestamp: DateTime<Utc>,
}

/// Normalized validation request, built once at the HTTP boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckRequest {
    /// License key, if any source supplied one.
    pub key: Option<String>,
    /// Device name.
    pub device_name: Option<String>,
    /// Opaque device details.
    pub device_info: Option<serde_json::Value>,
    /// Client address.
    pub address: String,
}

/// JSON body accepted by `/check`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckBody {
    /// License key.
    #[serde(default)]
    pub key: Option<String>,
    /// Device name.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Device details, any JSON value.
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

/// Query string accepted by `/check`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckParams {
    /// License key.
    #[serde(default)]
    pub key: Option<String>,
    /// Device name.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Device details, stored as a plain string.
    #[serde(default)]
    pub device_info: Option<String>,
}

/// `result` tag of a `/check` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Access granted.
    Success,
    /// Unknown key.
    Wrong,
    /// Blocked by a ban.
    Banned,
    /// Caller error, e.g. no key.
    Error,
}

impl From<Outcome> for CheckStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => CheckStatus::Success,
            Outcome::Wrong => CheckStatus::Wrong,
            Outcome::Banned => CheckStatus::Banned,
        }
    }
}

/// `/check` response. Same shape for every verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Verdict tag.
    pub result: CheckStatus,
    /// Detail, only for errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Insertion {
    /// Newly stored.
    Added,
    /// Already present, nothing written.
    Exists,
}

/// Result of an idempotent removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// Deleted.
    Removed,
    /// Was not present, nothing written.
    NotFound,
}

/// `{ "result": ... }` envelope for admin mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse<T> {
    /// [`Insertion`] or [`Removal`].
    pub result: T,
}

/// Body of `/admin/add` and `/admin/remove`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyRequest {
    /// Key to add or remove.
    #[serde(default)]
    pub key: Option<String>,
}

/// Body of `/admin/ban` and `/admin/unban`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BanRequest {
    /// Ban kind, sent as `type`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Value matched against the kind.
    #[serde(default)]
    pub value: Option<String>,
    /// Free-form note. Ignored by unban.
    #[serde(default)]
    pub reason: Option<String>,
}

/// `result` tag of listing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    /// Listing succeeded.
    Ok,
}

/// `/admin/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListResponse {
    /// Always `ok`.
    pub result: ListStatus,
    /// Authorized keys in insertion order.
    pub keys: Vec<String>,
}

/// `/admin/bans` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanListResponse {
    /// Always `ok`.
    pub result: ListStatus,
    /// Active bans in insertion order.
    pub bans: Vec<BanEntry>,
}

/// `/admin/connections` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    /// Always `ok`.
    pub result: ListStatus,
    /// Successful attempts, oldest first.
    pub connections: Vec<ConnectionEvent>,
}

/// `/admin/failed-logins` and `/admin/attempts` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedResponse {
    /// Always `ok`.
    pub result: ListStatus,
    /// Wrong and banned attempts, oldest first.
    pub failed: Vec<ConnectionEvent>,
}

/// `/admin/active` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveResponse {
    /// Always `ok`.
    pub result: ListStatus,
    /// Freshness window applied.
    pub window_secs: u64,
    /// Latest success per key inside the window.
    pub active: Vec<ConnectionEvent>,
}

/// Error body: `{ "result": "error" | "forbidden", "message"? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `error` or `forbidden`.
    pub result: String,
    /// Detail; absent for `forbidden`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
