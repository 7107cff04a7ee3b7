//! Axum Middleware for Authentication
//!
//! This module provides Axum middleware that:
//! - Reads the `endpoint` path parameter and the Authorization header
//! - Admits the request through the [`TokenGate`]
//! - Injects AuthContext into request extensions
//! - Returns 401 for malformed or rejected credentials
//!
//! The middleware reads path parameters, so it must be installed with
//! `route_layer` on routes that carry `:endpoint`.

use crate::auth::{AuthContext, TokenGate};
use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{rejection::PathRejection, FromRequestParts, Path, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;

/// Name of the route parameter carrying the encoded origin URL.
pub const ENDPOINT_PARAM: &str = "endpoint";

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Axum middleware for authentication.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware, routing::get};
/// use cachegate_api::middleware::auth_middleware;
///
/// let app = Router::new()
///     .route("/:endpoint/_apis/artifactcache/cache", get(handler))
///     .route_layer(middleware::from_fn_with_state(gate.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(gate): State<TokenGate>,
    params: Result<Path<HashMap<String, String>>, PathRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let Path(params) = params.map_err(|e| {
        AuthMiddlewareError(ApiError::auth_malformed(format!(
            "Could not read endpoint from path: {}",
            e
        )))
    })?;

    let endpoint = params.get(ENDPOINT_PARAM).ok_or_else(|| {
        AuthMiddlewareError(ApiError::internal_error(
            "auth_middleware installed on a route without an :endpoint parameter",
        ))
    })?;

    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let auth_context = gate
        .authenticate(endpoint, authorization)
        .await
        .map_err(|e| AuthMiddlewareError(e.into()))?;

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed Axum extractor for authentication context.
///
/// The `auth_middleware` must be applied to the route for this extractor to
/// work. Without it, the extractor returns a 500 Internal Server Error.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "AuthContext not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
