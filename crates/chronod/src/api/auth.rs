//! Bearer-token authentication for the control-plane HTTP API.
//!
//! A single shared credential, named by the `api_token_env` config field,
//! is hashed once at startup. Every request (other than `/healthz`) must
//! present `Authorization: Bearer <token>` matching that hash, compared in
//! constant time. If the environment variable is unset, auth is disabled
//! entirely — intended for local development, never production.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AppState;

pub fn hash_token_env(env_var: &str) -> Option<Vec<u8>> {
    match std::env::var(env_var) {
        Ok(token) if !token.is_empty() => Some(Sha256::digest(token.as_bytes()).to_vec()),
        _ => {
            tracing::warn!(
                env_var,
                "no API token configured; control-plane authentication is DISABLED"
            );
            None
        }
    }
}

pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = state.api_token_hash.as_ref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(provided) = provided else {
        return unauthorized();
    };

    let provided_hash = Sha256::digest(provided.as_bytes());
    if provided_hash.ct_eq(expected_hash.as_slice()).into() {
        next.run(req).await
    } else {
        unauthorized()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "invalid or missing API token" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_var_disables_auth() {
        // Use a name virtually guaranteed not to be set.
        assert!(hash_token_env("CHRONOD_TEST_TOKEN_DOES_NOT_EXIST_XYZ").is_none());
    }

    #[test]
    fn present_env_var_hashes_to_32_bytes() {
        std::env::set_var("CHRONOD_TEST_TOKEN_PRESENT", "super-secret");
        let hash = hash_token_env("CHRONOD_TEST_TOKEN_PRESENT").unwrap();
        assert_eq!(hash.len(), 32);
        std::env::remove_var("CHRONOD_TEST_TOKEN_PRESENT");
    }
}
