//! Middleware modules for the cachegate API
//!
//! - `auth`: token admission for the artifact-cache and credential routes
//!
//! Request logging and metrics live in [`crate::telemetry`].

mod auth;

pub use auth::{auth_middleware, AuthExtractor, AuthMiddlewareError, ENDPOINT_PARAM};
