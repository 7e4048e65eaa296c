//! Network origin lookup (ASN / organization / ISP).
//!
//! The lookup is advisory. [`OriginResolver::resolve`] never fails: timeouts,
//! transport errors, non-2xx statuses and malformed payloads all produce
//! [`OriginInfo::unknown`]. There is one attempt per call and no caching.

use crate::config::GateConfig;
use crate::protocol::models::OriginInfo;
use crate::GateError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Maps a client address to best-effort origin metadata.
#[async_trait]
pub trait OriginResolver: Send + Sync {
    /// Resolve `address`. Must return within the resolver's own deadline.
    async fn resolve(&self, address: &str) -> OriginInfo;
}

/// ip-api.com style JSON payload.
#[derive(Debug, Deserialize)]
struct LookupPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "as", default)]
    as_name: Option<String>,
    #[serde(default)]
    asn: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    isp: Option<String>,
}

impl LookupPayload {
    fn into_origin(self) -> Result<OriginInfo, GateError> {
        if let Some(status) = &self.status {
            if status != "success" {
                return Err(GateError::OriginLookup(format!(
                    "lookup status {:?}",
                    status
                )));
            }
        }

        let asn = self
            .asn
            .as_deref()
            .and_then(parse_asn)
            .or_else(|| self.as_name.as_deref().and_then(parse_asn))
            .or_else(|| self.org.as_deref().and_then(parse_asn));

        Ok(OriginInfo {
            asn,
            organization: non_empty(self.org),
            isp: non_empty(self.isp),
        })
    }
}

/// Extract `AS<digits>` from the start of a string like `AS15169 Google LLC`.
pub fn parse_asn(raw: &str) -> Option<String> {
    let token = raw.split_whitespace().next()?;
    let digits = token
        .strip_prefix("AS")
        .or_else(|| token.strip_prefix("as"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("AS{}", digits))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Addresses worth sending upstream. Non-IP strings (e.g. a spoofed
/// forwarded header) and private ranges never leave the process.
fn is_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

/// HTTP lookup against an ip-api.com compatible endpoint.
pub struct HttpOriginResolver {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpOriginResolver {
    /// Create a resolver from config.
    pub fn new(config: &GateConfig) -> Result<Self, GateError> {
        Self::with_endpoint(&config.origin_endpoint, config.origin_timeout)
    }

    /// Create a resolver for an explicit endpoint and deadline.
    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self, GateError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GateError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Configured deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lookup_url(&self, ip: &IpAddr) -> String {
        format!("{}/{}?fields=status,as,org,isp", self.endpoint, ip)
    }

    async fn lookup(&self, ip: IpAddr) -> Result<OriginInfo, GateError> {
        let response = self
            .client
            .get(self.lookup_url(&ip))
            .header(USER_AGENT, build_user_agent())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GateError::OriginLookup(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GateError::OriginLookup(format!(
                "HTTP status {}",
                response.status().as_u16()
            )));
        }

        let payload: LookupPayload = response
            .json()
            .await
            .map_err(|e| GateError::OriginLookup(format!("Malformed payload: {}", e)))?;

        payload.into_origin()
    }
}

#[async_trait]
impl OriginResolver for HttpOriginResolver {
    async fn resolve(&self, address: &str) -> OriginInfo {
        let Ok(ip) = address.parse::<IpAddr>() else {
            debug!(address, "not an IP address, origin unknown");
            return OriginInfo::unknown();
        };
        if !is_routable(&ip) {
            return OriginInfo::unknown();
        }

        match tokio::time::timeout(self.timeout, self.lookup(ip)).await {
            Ok(Ok(origin)) => origin,
            Ok(Err(e)) => {
                debug!(address, error = %e, "origin lookup failed");
                OriginInfo::unknown()
            }
            Err(_) => {
                debug!(
                    address,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "origin lookup timed out"
                );
                OriginInfo::unknown()
            }
        }
    }
}

/// Fixed answers, no network. Used when lookups are disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticOriginResolver {
    fallback: OriginInfo,
    by_address: HashMap<String, OriginInfo>,
}

impl StaticOriginResolver {
    /// Resolver that always answers unknown.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Resolver that answers `origin` for every address.
    pub fn always(origin: OriginInfo) -> Self {
        Self {
            fallback: origin,
            by_address: HashMap::new(),
        }
    }

    /// Answer `origin` for one specific address.
    pub fn with_address(mut self, address: impl Into<String>, origin: OriginInfo) -> Self {
        self.by_address.insert(address.into(), origin);
        self
    }
}

#[async_trait]
impl OriginResolver for StaticOriginResolver {
    async fn resolve(&self, address: &str) -> OriginInfo {
        self.by_address
            .get(address)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// User-Agent sent with lookups: `keygate/<version>`.
pub fn build_user_agent() -> String {
    format!("keygate/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asn() {
        assert_eq!(parse_asn("AS15169 Google LLC").as_deref(), Some("AS15169"));
        assert_eq!(parse_asn("AS13335").as_deref(), Some("AS13335"));
        assert_eq!(parse_asn("as64500 Example").as_deref(), Some("AS64500"));
        assert_eq!(parse_asn("Google LLC"), None);
        assert_eq!(parse_asn("AS"), None);
        assert_eq!(parse_asn("ASX12"), None);
        assert_eq!(parse_asn(""), None);
    }

    #[test]
    fn test_payload_success() {
        let payload: LookupPayload = serde_json::from_str(
            r#"{"status":"success","as":"AS15169 Google LLC","org":"Google Public DNS","isp":"Google LLC"}"#,
        )
        .unwrap();
        let origin = payload.into_origin().unwrap();
        assert_eq!(origin.asn.as_deref(), Some("AS15169"));
        assert_eq!(origin.organization.as_deref(), Some("Google Public DNS"));
        assert_eq!(origin.isp.as_deref(), Some("Google LLC"));
    }

    #[test]
    fn test_payload_asn_from_org_prefix() {
        // ipinfo.io style: ASN only appears as the org prefix
        let payload: LookupPayload =
            serde_json::from_str(r#"{"org":"AS13335 Cloudflare, Inc."}"#).unwrap();
        let origin = payload.into_origin().unwrap();
        assert_eq!(origin.asn.as_deref(), Some("AS13335"));
    }

    #[test]
    fn test_payload_fail_status() {
        let payload: LookupPayload =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert!(matches!(
            payload.into_origin(),
            Err(GateError::OriginLookup(_))
        ));
    }

    #[test]
    fn test_payload_empty_strings_are_unknown() {
        let payload: LookupPayload =
            serde_json::from_str(r#"{"status":"success","as":"","org":" ","isp":""}"#).unwrap();
        assert!(payload.into_origin().unwrap().is_unknown());
    }

    #[test]
    fn test_is_routable() {
        assert!(is_routable(&"8.8.8.8".parse().unwrap()));
        assert!(!is_routable(&"127.0.0.1".parse().unwrap()));
        assert!(!is_routable(&"10.1.2.3".parse().unwrap()));
        assert!(!is_routable(&"192.168.0.1".parse().unwrap()));
        assert!(!is_routable(&"::1".parse().unwrap()));
        assert!(is_routable(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_http_resolver_non_ip_is_unknown() {
        let resolver =
            HttpOriginResolver::with_endpoint("http://127.0.0.1:9", Duration::from_millis(200))
                .unwrap();
        let origin = resolver.resolve("1.2.3.4/../../admin").await;
        assert!(origin.is_unknown());
    }

    #[tokio::test]
    async fn test_http_resolver_unreachable_is_unknown() {
        // Nothing listens on the discard port
        let resolver =
            HttpOriginResolver::with_endpoint("http://127.0.0.1:9", Duration::from_millis(300))
                .unwrap();
        let started = std::time::Instant::now();
        let origin = resolver.resolve("8.8.8.8").await;
        assert!(origin.is_unknown());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_http_resolver_slow_upstream_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let resolver = HttpOriginResolver::with_endpoint(
            &format!("http://127.0.0.1:{}", port),
            Duration::from_millis(200),
        )
        .unwrap();
        let started = std::time::Instant::now();
        let origin = resolver.resolve("8.8.8.8").await;
        assert!(origin.is_unknown());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let known = OriginInfo {
            asn: Some("AS64500".to_string()),
            organization: Some("Example Net".to_string()),
            isp: None,
        };
        let resolver = StaticOriginResolver::unknown().with_address("1.2.3.4", known.clone());

        assert_eq!(resolver.resolve("1.2.3.4").await, known);
        assert!(resolver.resolve("5.6.7.8").await.is_unknown());

        let always = StaticOriginResolver::always(known.clone());
        assert_eq!(always.resolve("anything").await, known);
    }

    #[test]
    fn test_build_user_agent() {
        assert_eq!(
            build_user_agent(),
            format!("keygate/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
