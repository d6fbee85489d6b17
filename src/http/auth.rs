//! Bearer token check for management endpoints.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Require `Authorization: Bearer <admin_token>` when a token is configured.
///
/// The token is read from the current configuration on every request, so a
/// configuration reload rotates it.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = state.config.get_gateway_config().admin_token else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if token_matches(provided, &expected) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected management request without valid token");
        Err(ApiError::unauthorized())
    }
}

fn token_matches(provided: Option<&str>, expected: &str) -> bool {
    provided.is_some_and(|token| token.as_bytes().ct_eq(expected.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches(Some("secret"), "secret"));
        assert!(!token_matches(Some("secreT"), "secret"));
        assert!(!token_matches(None, "secret"));
    }

    #[test]
    fn test_wrong_length_token_rejected() {
        assert!(!token_matches(Some("secret2"), "secret"));
        assert!(!token_matches(Some("secre"), "secret"));
        assert!(!token_matches(Some(""), "secret"));
    }
}
