//! REST API Routes Module
//!
//! Includes:
//! - Artifact cache protocol routes (lookup, reserve, upload, commit)
//! - Scoped credential routes (assumeRole upload/download)
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document

pub mod artifactcache;
pub mod assume_role;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower::ServiceBuilder;

use crate::middleware::auth_middleware;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// OPENAPI ENDPOINTS
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the gateway router.
///
/// # Middleware Order (outer to inner)
/// 1. Observability - tracing and metrics for every request
/// 2. Body limit - PATCH bodies above `max_part_bytes` are refused
/// 3. Auth (route layer on protocol routes only) - admits the runner token
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(artifactcache::create_router())
        .merge(assume_role::create_router())
        .route_layer(from_fn_with_state(state.gate.clone(), auth_middleware));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .merge(protected)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    let max_part_bytes = state.config.max_part_bytes;
    router
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(observability_middleware))
                .layer(DefaultBodyLimit::max(max_part_bytes)),
        )
        .with_state(state)
}
