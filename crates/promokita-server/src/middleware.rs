use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer-token auth settings for the scrape-trigger endpoint.
#[derive(Debug, Clone)]
pub struct AuthState {
    tokens: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth state from the configured token list. An empty list
    /// disables auth; outside development that is logged loudly so it is
    /// never an accident that goes unnoticed.
    #[must_use]
    pub fn from_config(tokens: &[String], is_development: bool) -> Self {
        if tokens.is_empty() {
            if is_development {
                tracing::warn!("no API tokens configured; trigger auth disabled in development");
            } else {
                tracing::warn!(
                    "PROMOKITA_API_TOKENS not set; the scrape trigger endpoint is unauthenticated"
                );
            }
            return Self {
                tokens: Arc::new(Vec::new()),
                enabled: false,
            };
        }

        Self {
            tokens: Arc::new(tokens.to_vec()),
            enabled: true,
        }
    }

    fn allows(&self, candidate: &str) -> bool {
        // Constant-time comparison across the whole token list.
        self.tokens
            .iter()
            .fold(false, |ok, token| {
                ok | bool::from(token.as_bytes().ct_eq(candidate.as_bytes()))
            })
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    success: bool,
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for MiddlewareErrorBody {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Axum middleware that extracts or generates a request ID.
///
/// An incoming `x-request-id` header is reused; otherwise a new `UUIDv4` is
/// generated. The ID is stored as a request extension and echoed on the
/// response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing bearer-token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    let token = extract_bearer_token(req.headers().get(AUTHORIZATION));

    match token {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => MiddlewareErrorBody {
            success: false,
            error: "unauthorized",
            message: "missing or invalid bearer token",
        }
        .into_response(),
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn empty_token_list_disables_auth() {
        let state = AuthState::from_config(&[], true);
        assert!(!state.enabled);
    }

    #[test]
    fn configured_tokens_are_matched_exactly() {
        let state = AuthState::from_config(&["alpha".to_string(), "beta".to_string()], false);
        assert!(state.enabled);
        assert!(state.allows("alpha"));
        assert!(state.allows("beta"));
        assert!(!state.allows("alph"));
        assert!(!state.allows("gamma"));
    }
}
