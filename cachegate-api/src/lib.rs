//! cachegate API - Artifact-Cache Gateway
//!
//! HTTP gateway between CI runners and an object-storage bucket. Runners
//! present a token issued by their CI origin; the gateway validates it against
//! that origin, then serves cache lookups through pre-signed URLs, accepts
//! multipart uploads in byte-range order, and hands out temporary credentials
//! scoped to a single object.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractors;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    AcceptanceCache, AuthContext, HttpTokenOrigin, StaticTokenOrigin, TokenGate, TokenOrigin,
};
pub use config::GatewayConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{auth_middleware, AuthExtractor};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use services::{CacheIndex, CredentialBroker, UploadCoordinator};
pub use state::AppState;
