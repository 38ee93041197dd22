//! The HTTP control-plane adapter: routes, auth middleware, and the shared
//! state handlers use to reach the scheduler loop.

pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::Notify;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::control::ControlHandle;

#[derive(Clone)]
pub struct AppState {
    pub control: ControlHandle,
    pub api_token_hash: Option<Vec<u8>>,
    pub shutdown_notify: Arc<Notify>,
}

pub fn build_router(state: AppState, cors_origins: &[String], max_concurrent_requests: usize) -> Router {
    let protected = Router::new()
        .route("/schedule", get(routes::get_schedule).put(routes::replace_schedule))
        .route("/jobs/running", get(routes::get_running_jobs))
        .route("/shutdown", post(routes::shutdown))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_token,
        ));

    Router::new()
        .route("/healthz", get(routes::healthz))
        .merge(protected)
        .layer(build_cors_layer(cors_origins))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests))
        .with_state(state)
}

/// Build a CORS layer from a list of allowed origins. A literal `"*"`
/// short-circuits to fully permissive (logged loudly); otherwise each entry
/// must be an exact origin.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow any origin ('*'); restrict this in production");
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any);
    }

    let exact: Vec<axum::http::HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(exact))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::PUT,
            axum::http::Method::POST,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
}
