//! Artifact Cache Protocol Routes
//!
//! The four endpoints a CI runner's cache client talks to:
//! - GET  `cache` - look up an entry and hand back a pre-signed download URL
//! - POST `caches` - reserve an upload session
//! - PATCH `caches/:cache_id` - upload one byte range
//! - POST `caches/:cache_id` - commit the upload
//!
//! Every route sits behind `auth_middleware`.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cachegate_core::{CacheEntry, CacheId, ObjectKey};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult, ErrorCode},
    extractors::{CacheIdPath, ContentRange},
    middleware::AuthExtractor,
    services::{CacheIndex, UploadCoordinator},
    state::AppState,
};

// ============================================================================
// TYPES
// ============================================================================

/// Query of a cache lookup.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct CacheQuery {
    /// Comma-separated keys: the primary key followed by restore keys.
    pub keys: Option<String>,
    pub version: Option<String>,
}

impl CacheQuery {
    /// Split `keys` into the primary key and the restore keys.
    pub fn split_keys(&self) -> ApiResult<(String, Vec<String>)> {
        let raw = self
            .keys
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::missing_field("keys"))?;

        let mut keys = raw.split(',').map(str::to_string);
        let primary = keys.next().unwrap_or_default();
        Ok((primary, keys.collect()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReserveCacheRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReserveCacheResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub cache_id: CacheId,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /{endpoint}/_apis/artifactcache/cache - Look up a cache entry
#[utoipa::path(
    get,
    path = "/{endpoint}/_apis/artifactcache/cache",
    tag = "Artifact Cache",
    params(
        ("endpoint" = String, Path, description = "Base64url-encoded origin URL"),
        CacheQuery,
    ),
    responses(
        (status = 200, description = "Entry found", body = CacheEntry),
        (status = 204, description = "No entry for any of the keys"),
        (status = 400, description = "Missing keys", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Storage backend failure", body = ApiError),
    ),
    security(("runner_token" = []))
)]
pub async fn get_cache_entry(
    State(index): State<CacheIndex>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<CacheQuery>,
) -> ApiResult<Response> {
    let (key, restore_keys) = query.split_keys()?;
    let version = query.version.unwrap_or_default();
    let object_key = ObjectKey::new(auth.audience, auth.scope, key, version);

    match index.resolve(&object_key, &restore_keys).await? {
        Some(entry) => Ok((StatusCode::OK, Json(entry)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /{endpoint}/_apis/artifactcache/caches - Reserve an upload session
#[utoipa::path(
    post,
    path = "/{endpoint}/_apis/artifactcache/caches",
    tag = "Artifact Cache",
    params(("endpoint" = String, Path, description = "Base64url-encoded origin URL")),
    request_body = ReserveCacheRequest,
    responses(
        (status = 201, description = "Session reserved", body = ReserveCacheResponse),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Storage backend failure", body = ApiError),
    ),
    security(("runner_token" = []))
)]
pub async fn reserve_cache(
    State(coordinator): State<UploadCoordinator>,
    AuthExtractor(auth): AuthExtractor,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    // Parsed by hand so a missing Content-Type is not an error.
    let req: ReserveCacheRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_input(format!("Invalid reserve request: {}", e)))?;

    let object_key = ObjectKey::new(auth.audience, auth.scope, req.key, req.version);
    let cache_id = coordinator.reserve(object_key).await?;

    Ok((StatusCode::CREATED, Json(ReserveCacheResponse { cache_id })))
}

/// PATCH /{endpoint}/_apis/artifactcache/caches/{cache_id} - Upload a byte range
#[utoipa::path(
    patch,
    path = "/{endpoint}/_apis/artifactcache/caches/{cache_id}",
    tag = "Artifact Cache",
    params(
        ("endpoint" = String, Path, description = "Base64url-encoded origin URL"),
        ("cache_id" = i64, Path, description = "Session id returned by reserve"),
        ("Content-Range" = String, Header, description = "<unit> <start>-<end>/<size|*>"),
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 204, description = "Range uploaded"),
        (status = 400, description = "Malformed Content-Range or range out of order", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError),
        (status = 413, description = "Body too large", body = ApiError),
        (status = 504, description = "Timed out waiting for earlier ranges", body = ApiError),
    ),
    security(("runner_token" = []))
)]
pub async fn upload_cache_part(
    State(coordinator): State<UploadCoordinator>,
    AuthExtractor(auth): AuthExtractor,
    CacheIdPath(cache_id): CacheIdPath,
    range: ContentRange,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<StatusCode> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::from_code(ErrorCode::PayloadTooLarge)
        } else {
            ApiError::invalid_input(format!("Failed to read request body: {}", rejection))
        }
    })?;

    coordinator
        .submit_part(cache_id, &auth, range.start, range.end, body)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /{endpoint}/_apis/artifactcache/caches/{cache_id} - Commit an upload
#[utoipa::path(
    post,
    path = "/{endpoint}/_apis/artifactcache/caches/{cache_id}",
    tag = "Artifact Cache",
    params(
        ("endpoint" = String, Path, description = "Base64url-encoded origin URL"),
        ("cache_id" = i64, Path, description = "Session id returned by reserve"),
    ),
    responses(
        (status = 204, description = "Upload committed"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown session", body = ApiError),
        (status = 500, description = "Storage backend failure", body = ApiError),
    ),
    security(("runner_token" = []))
)]
pub async fn commit_cache(
    State(coordinator): State<UploadCoordinator>,
    AuthExtractor(auth): AuthExtractor,
    CacheIdPath(cache_id): CacheIdPath,
) -> ApiResult<StatusCode> {
    coordinator.complete(cache_id, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the artifact cache router. Requires `auth_middleware` as a route layer.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:endpoint/_apis/artifactcache/cache", get(get_cache_entry))
        .route("/:endpoint/_apis/artifactcache/caches", post(reserve_cache))
        .route(
            "/:endpoint/_apis/artifactcache/caches/:cache_id",
            post(commit_cache).patch(upload_cache_part),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(keys: Option<&str>) -> CacheQuery {
        CacheQuery {
            keys: keys.map(str::to_string),
            version: None,
        }
    }

    #[test]
    fn test_split_keys_primary_and_restore() -> ApiResult<()> {
        let (key, restore) = query(Some("deps-abc,deps-,base")).split_keys()?;
        assert_eq!(key, "deps-abc");
        assert_eq!(restore, vec!["deps-".to_string(), "base".to_string()]);
        Ok(())
    }

    #[test]
    fn test_split_keys_single() -> ApiResult<()> {
        let (key, restore) = query(Some("only")).split_keys()?;
        assert_eq!(key, "only");
        assert!(restore.is_empty());
        Ok(())
    }

    #[test]
    fn test_split_keys_missing() {
        let err = query(None).split_keys().expect_err("keys required");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(query(Some("")).split_keys().is_err());
    }

    #[test]
    fn test_reserve_request_defaults() -> Result<(), serde_json::Error> {
        let req: ReserveCacheRequest = serde_json::from_str(r#"{"key":"k"}"#)?;
        assert_eq!(req.key, "k");
        assert_eq!(req.version, "");
        Ok(())
    }

    #[test]
    fn test_reserve_response_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(ReserveCacheResponse { cache_id: CacheId(77) })?;
        assert_eq!(json, serde_json::json!({ "cacheId": 77 }));
        Ok(())
    }
}
