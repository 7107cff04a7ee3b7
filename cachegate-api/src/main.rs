//! cachegate API Server Entry Point
//!
//! Loads configuration, wires the AWS backends, starts the acceptance-cache
//! sweeper and serves the Axum router.

use std::sync::Arc;

use cachegate_api::{
    create_router, ApiError, ApiResult, AppState, GatewayConfig, HttpTokenOrigin,
};
use cachegate_api::telemetry::{init_tracing, LogFormat};
use cachegate_storage::{load_sdk_config, S3ObjectStore, StsFederation};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env())?;

    let config = GatewayConfig::from_env()
        .map_err(|e| ApiError::invalid_input(format!("Invalid configuration: {}", e)))?;
    let addr = config
        .listen_addr()
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;

    let sdk_config = load_sdk_config().await;
    let store = Arc::new(S3ObjectStore::new(&sdk_config, config.bucket.clone()));
    let federation = Arc::new(StsFederation::new(&sdk_config));
    let origin = Arc::new(HttpTokenOrigin::new(config.origin_timeout).map_err(|e| {
        ApiError::internal_error(format!("Failed to build origin client: {}", e))
    })?);

    let sweep_interval = config.acceptance_sweep_interval;
    let state = AppState::new(config, store, federation, origin);

    let acceptance = state.gate.acceptance().clone();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let removed = acceptance.sweep();
            if removed > 0 {
                tracing::debug!(removed, remaining = acceptance.len(), "Swept expired token validations");
            }
        }
    });

    let app = create_router(state);

    tracing::info!(%addr, "Starting cachegate gateway");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    sweeper.abort();
    Ok(())
}
