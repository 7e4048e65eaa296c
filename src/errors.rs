//! Keygate error types.

use thiserror::Error;

/// Errors that can occur while validating keys or administering the gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No license key was supplied (parameter, header and body all empty).
    #[error("No license key provided")]
    MissingKey,

    /// The request payload is malformed or incomplete.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Admin token missing or wrong.
    #[error("Forbidden")]
    Forbidden,

    /// Reading or writing a store file failed.
    #[error("Store I/O error: {0}")]
    StoreIO(String),

    /// A snapshot file exists but cannot be parsed.
    #[error("Store file corrupt: {0}")]
    StoreCorrupt(String),

    /// Origin lookup failed. Only seen inside the resolver; callers get unknown origin.
    #[error("Origin lookup failed: {0}")]
    OriginLookup(String),
}

impl GateError {
    /// HTTP status code equivalent for this error.
    pub fn status(&self) -> u16 {
        match self {
            GateError::MissingKey | GateError::InvalidRequest(_) => 400,
            GateError::Forbidden => 403,
            GateError::ConfigError(_)
            | GateError::StoreIO(_)
            | GateError::StoreCorrupt(_)
            | GateError::OriginLookup(_) => 500,
        }
    }

    /// Stable `result` tag reported to HTTP callers.
    pub fn tag(&self) -> &'static str {
        match self {
            GateError::Forbidden => "forbidden",
            _ => "error",
        }
    }

    /// Whether this is the caller's fault (4xx) rather than ours.
    pub fn is_caller_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GateError::MissingKey.status(), 400);
        assert_eq!(GateError::InvalidRequest("x".into()).status(), 400);
        assert_eq!(GateError::Forbidden.status(), 403);
        assert_eq!(GateError::StoreIO("disk".into()).status(), 500);
        assert_eq!(GateError::StoreCorrupt("bad".into()).status(), 500);
    }

    #[test]
    fn test_tags() {
        assert_eq!(GateError::Forbidden.tag(), "forbidden");
        assert_eq!(GateError::MissingKey.tag(), "error");
        assert_eq!(GateError::StoreIO("disk".into()).tag(), "error");
    }

    #[test]
    fn test_caller_error() {
        assert!(GateError::MissingKey.is_caller_error());
        assert!(GateError::Forbidden.is_caller_error());
        assert!(!GateError::StoreIO("disk".into()).is_caller_error());
    }
}
