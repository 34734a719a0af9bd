//! HTTP basic auth for the broker protocol endpoints.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use cfbroker_core::config::AuthConfig;

/// Decode `Authorization: Basic <base64(user:pass)>` into its two parts.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Rejects requests that do not carry the configured broker credentials.
pub async fn require_basic_auth(
    State(expected): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match basic_credentials(request.headers()) {
        Some((username, password))
            if username == expected.username && password == expected.password =>
        {
            debug!(%method, %path, "broker request");
            next.run(request).await
        }
        supplied => {
            warn!(
                %method,
                %path,
                username = supplied.as_ref().map(|(u, _)| u.as_str()).unwrap_or(""),
                "rejected broker request with missing or invalid credentials"
            );
            (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Basic realm=\"cfbroker\"")],
            )
                .into_response()
        }
    }
}
