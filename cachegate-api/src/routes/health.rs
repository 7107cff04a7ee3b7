//! Probe Endpoints
//!
//! Unauthenticated routes for orchestrators and load balancers:
//! - `/health/ping` answers `pong`
//! - `/health/live` reports the process is up
//! - `/health/ready` adds gateway load: open upload sessions and cached
//!   token validations

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Ready,
}

/// Body of the liveness and readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayLoad>,
}

/// In-memory state the gateway is carrying.
///
/// Everything here is lost on restart, which is why readiness has no
/// dependency to wait for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GatewayLoad {
    pub bucket: String,
    pub uptime_seconds: u64,
    pub open_upload_sessions: usize,
    pub cached_validations: usize,
}

impl ProbeReport {
    fn new(status: ProbeStatus, gateway: Option<GatewayLoad>) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            gateway,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses((status = 200, description = "pong", body = String)),
)]
pub async fn ping() -> &'static str {
    "pong"
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is up", body = ProbeReport)),
)]
pub async fn liveness() -> Json<ProbeReport> {
    Json(ProbeReport::new(ProbeStatus::Up, None))
}

/// GET /health/ready
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses((status = 200, description = "Accepting traffic", body = ProbeReport)),
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let load = GatewayLoad {
        bucket: state.config.bucket.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        open_upload_sessions: state.coordinator.session_count(),
        cached_validations: state.gate.acceptance().len(),
    };
    (StatusCode::OK, Json(ProbeReport::new(ProbeStatus::Ready, Some(load))))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Probe routes, nested under `/health`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
