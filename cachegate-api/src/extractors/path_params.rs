//! Typed path parameter extractors.
//!
//! Route parameters are read by name so the extractors work on any route
//! shape that carries them, with a structured 400 instead of axum's plain-text
//! rejection.

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use cachegate_core::CacheId;
use std::collections::HashMap;

pub const CACHE_ID_PARAM: &str = "cache_id";
pub const KEY_PARAM: &str = "key";

async fn path_param<S>(parts: &mut Parts, state: &S, name: &str) -> Result<String, ApiError>
where
    S: Send + Sync,
{
    let Path(params): Path<HashMap<String, String>> = Path::from_request_parts(parts, state)
        .await
        .map_err(|e| {
            ApiError::invalid_input(format!("Failed to read path parameters: {}", e)).with_details(
                serde_json::json!({ "path": parts.uri.path() }),
            )
        })?;

    params
        .get(name)
        .cloned()
        .ok_or_else(|| ApiError::missing_field(name))
}

/// `:cache_id` parsed into a [`CacheId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheIdPath(pub CacheId);

#[async_trait]
impl<S> FromRequestParts<S> for CacheIdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = path_param(parts, state, CACHE_ID_PARAM).await?;
        raw.parse::<i64>()
            .map(|id| CacheIdPath(CacheId(id)))
            .map_err(|_| {
                ApiError::invalid_format(CACHE_ID_PARAM, "integer")
                    .with_details(serde_json::json!({ "value": raw }))
            })
    }
}

/// `:key`, the logical cache key of a credential request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyPath(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CacheKeyPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = path_param(parts, state, KEY_PARAM).await?;
        if key.is_empty() {
            return Err(ApiError::missing_field(KEY_PARAM));
        }
        Ok(CacheKeyPath(key))
    }
}
