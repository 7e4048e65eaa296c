//! HTTP surface: `/check` plus the token-protected `/admin/*` routes.

use crate::admin::{AdminApi, AdminSession};
use crate::engine::Gatekeeper;
use crate::protocol::models::{
    ActiveResponse, BanListResponse, BanRequest, CheckBody, CheckParams, CheckRequest,
    CheckResponse, ConnectionsResponse, ErrorResponse, FailedResponse, KeyListResponse,
    KeyRequest, ListStatus, MutationResponse,
};
use crate::GateError;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::error;

/// Header carrying the license key when not passed as a parameter.
pub const LICENSE_KEY_HEADER: &str = "x-license-key";

/// Header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Header consulted for the client address when proxies are trusted.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<Gatekeeper>,
    admin: Arc<AdminApi>,
    trust_forwarded: bool,
    active_window: Duration,
}

impl AppState {
    /// Bundle the gate and admin API for the router.
    pub fn new(
        gate: Arc<Gatekeeper>,
        admin: Arc<AdminApi>,
        trust_forwarded: bool,
        active_window: Duration,
    ) -> Self {
        Self {
            gate,
            admin,
            trust_forwarded,
            active_window,
        }
    }

    fn session(&self, headers: &HeaderMap) -> Result<AdminSession<'_>, GateError> {
        let token = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        self.admin.authorize(token)
    }
}

/// Build the HTTP router.
///
/// Serve it with [`serve`] (or `into_make_service_with_connect_info`) so the
/// client address is available.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/check", get(check).post(check))
        .route("/admin/list", get(admin_list_keys))
        .route("/admin/add", post(admin_add_key))
        .route("/admin/remove", post(admin_remove_key))
        .route("/admin/bans", get(admin_list_bans))
        .route("/admin/ban", post(admin_ban))
        .route("/admin/unban", post(admin_unban))
        .route("/admin/connections", get(admin_connections))
        .route("/admin/failed-logins", get(admin_failed))
        .route("/admin/attempts", get(admin_failed))
        .route("/admin/active", get(admin_active))
        .with_state(state)
}

/// Serve the router on `listener` until the future is dropped or fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            GateError::Forbidden => None,
            GateError::MissingKey => Some("no key provided".to_string()),
            GateError::InvalidRequest(detail) => Some(detail.clone()),
            other => {
                error!(error = %other, "request failed");
                Some("internal error".to_string())
            }
        };

        let body = ErrorResponse {
            result: self.tag().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Client address: first `X-Forwarded-For` hop when trusted, else the peer.
fn client_address(headers: &HeaderMap, peer: SocketAddr, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(address) = forwarded {
            return address.to_string();
        }
    }
    peer.ip().to_string()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("json"))
}

/// Unwrap a query extraction, turning a rejection into a JSON caller error.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, GateError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| GateError::InvalidRequest(rejection.body_text()))
}

/// Parse an optional JSON body. Empty or non-JSON bodies give the default.
fn optional_json<T: DeserializeOwned + Default>(
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<T, GateError> {
    if body.iter().all(u8::is_ascii_whitespace) || !is_json(headers) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| GateError::InvalidRequest(format!("malformed json body: {}", e)))
}

/// Parse a required JSON body.
fn required_json<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, GateError> {
    if !is_json(headers) {
        return Err(GateError::InvalidRequest("expected json body".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| GateError::InvalidRequest(format!("malformed json body: {}", e)))
}

/// Merge query, header and body into one request.
///
/// Key precedence: `key` parameter, `X-License-Key` header, body `key`.
/// Device fields: parameter first, then body.
fn build_check_request(
    params: CheckParams,
    headers: &HeaderMap,
    body: CheckBody,
    address: String,
) -> CheckRequest {
    let header_key = headers
        .get(LICENSE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let key = [params.key, header_key, body.key]
        .into_iter()
        .flatten()
        .find(|k| !k.is_empty());

    CheckRequest {
        key,
        device_name: params.device_name.or(body.device_name),
        device_info: params
            .device_info
            .map(serde_json::Value::String)
            .or(body.device_info),
        address,
    }
}

async fn check(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<CheckParams>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckResponse>, GateError> {
    let params = query_params(query)?;
    let body: CheckBody = optional_json(&headers, &body)?;
    let address = client_address(&headers, peer, state.trust_forwarded);
    let request = build_check_request(params, &headers, body, address);

    let outcome = state.gate.check(request).await?;
    Ok(Json(CheckResponse {
        result: outcome.into(),
        message: None,
    }))
}

async fn admin_list_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<KeyListResponse>, GateError> {
    let session = state.session(&headers)?;
    Ok(Json(KeyListResponse {
        result: ListStatus::Ok,
        keys: session.list_keys().await?,
    }))
}

async fn admin_add_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GateError> {
    let session = state.session(&headers)?;
    let request: KeyRequest = required_json(&headers, &body)?;
    let result = session.add_key(request.key.as_deref()).await?;
    Ok(Json(MutationResponse { result }))
}

async fn admin_remove_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GateError> {
    let session = state.session(&headers)?;
    let request: KeyRequest = required_json(&headers, &body)?;
    let result = session.remove_key(request.key.as_deref()).await?;
    Ok(Json(MutationResponse { result }))
}

async fn admin_list_bans(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BanListResponse>, GateError> {
    let session = state.session(&headers)?;
    Ok(Json(BanListResponse {
        result: ListStatus::Ok,
        bans: session.list_bans().await?,
    }))
}

async fn admin_ban(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GateError> {
    let session = state.session(&headers)?;
    let request: BanRequest = required_json(&headers, &body)?;
    let result = session
        .ban(
            request.kind.as_deref(),
            request.value.as_deref(),
            request.reason.as_deref(),
        )
        .await?;
    Ok(Json(MutationResponse { result }))
}

async fn admin_unban(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GateError> {
    let session = state.session(&headers)?;
    let request: BanRequest = required_json(&headers, &body)?;
    let result = session
        .unban(request.kind.as_deref(), request.value.as_deref())
        .await?;
    Ok(Json(MutationResponse { result }))
}

async fn admin_connections(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConnectionsResponse>, GateError> {
    let session = state.session(&headers)?;
    Ok(Json(ConnectionsResponse {
        result: ListStatus::Ok,
        connections: session.connections().await?,
    }))
}

async fn admin_failed(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FailedResponse>, GateError> {
    let session = state.session(&headers)?;
    Ok(Json(FailedResponse {
        result: ListStatus::Ok,
        failed: session.failed_attempts().await?,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ActiveParams {
    #[serde(default)]
    window_secs: Option<u64>,
}

async fn admin_active(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ActiveParams>, QueryRejection>,
) -> Result<Json<ActiveResponse>, GateError> {
    let session = state.session(&headers)?;
    let params = query_params(query)?;
    let window = params
        .window_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(state.active_window);
    Ok(Json(ActiveResponse {
        result: ListStatus::Ok,
        window_secs: window.as_secs(),
        active: session.active(window).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 9], 40000))
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_client_address_ignores_forwarded_by_default() {
        let h = headers(&[("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(client_address(&h, peer(), false), "10.0.0.9");
    }

    #[test]
    fn test_client_address_trusts_first_forwarded_hop() {
        let h = headers(&[("x-forwarded-for", " 1.2.3.4 , 10.0.0.1")]);
        assert_eq!(client_address(&h, peer(), true), "1.2.3.4");

        let empty = headers(&[("x-forwarded-for", "")]);
        assert_eq!(client_address(&empty, peer(), true), "10.0.0.9");
    }

    #[test]
    fn test_key_precedence() {
        let params = CheckParams {
            key: Some("from-param".to_string()),
            ..CheckParams::default()
        };
        let body = CheckBody {
            key: Some("from-body".to_string()),
            ..CheckBody::default()
        };
        let h = headers(&[("x-license-key", "from-header")]);

        let request = build_check_request(params, &h, body.clone(), "a".to_string());
        assert_eq!(request.key.as_deref(), Some("from-param"));

        let request =
            build_check_request(CheckParams::default(), &h, body.clone(), "a".to_string());
        assert_eq!(request.key.as_deref(), Some("from-header"));

        let request =
            build_check_request(CheckParams::default(), &HeaderMap::new(), body, "a".to_string());
        assert_eq!(request.key.as_deref(), Some("from-body"));
    }

    #[test]
    fn test_empty_param_falls_through() {
        let params = CheckParams {
            key: Some(String::new()),
            ..CheckParams::default()
        };
        let h = headers(&[("x-license-key", "from-header")]);
        let request = build_check_request(params, &h, CheckBody::default(), "a".to_string());
        assert_eq!(request.key.as_deref(), Some("from-header"));
    }

    #[test]
    fn test_device_fields_param_first() {
        let params = CheckParams {
            device_info: Some("pixel".to_string()),
            ..CheckParams::default()
        };
        let body = CheckBody {
            device_name: Some("rig-7".to_string()),
            device_info: Some(serde_json::json!({"os": "android"})),
            ..CheckBody::default()
        };
        let request = build_check_request(params, &HeaderMap::new(), body, "a".to_string());
        assert_eq!(request.device_name.as_deref(), Some("rig-7"));
        assert_eq!(request.device_info, Some(serde_json::json!("pixel")));
    }

    #[test]
    fn test_optional_json() {
        let json = headers(&[("content-type", "application/json")]);
        let text = headers(&[("content-type", "text/plain")]);

        let parsed: CheckBody =
            optional_json(&json, &Bytes::from_static(br#"{"key":"K"}"#)).unwrap();
        assert_eq!(parsed.key.as_deref(), Some("K"));

        let ignored: CheckBody =
            optional_json(&text, &Bytes::from_static(br#"{"key":"K"}"#)).unwrap();
        assert!(ignored.key.is_none());

        let empty: CheckBody = optional_json(&json, &Bytes::new()).unwrap();
        assert!(empty.key.is_none());

        let bad: Result<CheckBody, _> = optional_json(&json, &Bytes::from_static(b"{oops"));
        assert!(matches!(bad, Err(GateError::InvalidRequest(_))));
    }

    #[test]
    fn test_required_json_needs_content_type() {
        let text = headers(&[("content-type", "text/plain")]);
        let result: Result<KeyRequest, _> =
            required_json(&text, &Bytes::from_static(br#"{"key":"K"}"#));
        assert!(matches!(result, Err(GateError::InvalidRequest(_))));
    }

    #[test]
    fn test_error_response_status() {
        assert_eq!(
            GateError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GateError::MissingKey.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GateError::StoreIO("disk full".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
