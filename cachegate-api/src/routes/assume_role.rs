//! Scoped Credential Routes
//!
//! Runners that move archives straight to object storage ask for temporary
//! credentials covering the single object behind a cache key. Field names in
//! the responses are PascalCase, as existing clients expect.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cachegate_core::{ObjectAccess, ObjectKey};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    extractors::CacheKeyPath,
    middleware::AuthExtractor,
    services::{CacheIndex, CredentialBroker, IssuedCredentials},
    state::AppState,
};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    /// Comma-separated fallback keys, tried in order.
    pub restore_keys: Option<String>,
}

impl DownloadQuery {
    pub fn restore_keys(&self) -> Vec<String> {
        match self.restore_keys.as_deref() {
            Some(raw) if !raw.is_empty() => raw.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssumeRoleUploadResponse {
    #[serde(rename = "ObjectS3URI")]
    pub object_s3_uri: String,
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
}

impl From<IssuedCredentials> for AssumeRoleUploadResponse {
    fn from(issued: IssuedCredentials) -> Self {
        Self {
            object_s3_uri: issued.object_uri,
            access_key_id: issued.credentials.access_key_id,
            secret_access_key: issued.credentials.secret_access_key,
            session_token: issued.credentials.session_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssumeRoleDownloadResponse {
    /// True when the requested key itself matched, false for a restore key.
    #[serde(rename = "CacheHit")]
    pub cache_hit: bool,
    #[serde(flatten)]
    pub credentials: AssumeRoleUploadResponse,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /{endpoint}/assumeRole/{key}/upload - Credentials to write one object
#[utoipa::path(
    get,
    path = "/{endpoint}/assumeRole/{key}/upload",
    tag = "Credentials",
    params(
        ("endpoint" = String, Path, description = "Base64url-encoded origin URL"),
        ("key" = String, Path, description = "Cache key"),
    ),
    responses(
        (status = 200, description = "Credentials issued", body = AssumeRoleUploadResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Federation failure", body = ApiError),
    ),
    security(("runner_token" = []))
)]
pub async fn assume_role_upload(
    State(broker): State<CredentialBroker>,
    AuthExtractor(auth): AuthExtractor,
    CacheKeyPath(key): CacheKeyPath,
) -> ApiResult<impl IntoResponse> {
    let object_key = ObjectKey::new(&auth.audience, &auth.scope, key, "");
    let issued = broker
        .issue(&auth.audience, &object_key.storage_path(), ObjectAccess::Upload)
        .await?;

    Ok(Json(AssumeRoleUploadResponse::from(issued)))
}

/// GET /{endpoint}/assumeRole/{key}/download - Credentials to read the best match
#[utoipa::path(
    get,
    path = "/{endpoint}/assumeRole/{key}/download",
    tag = "Credentials",
    params(
        ("endpoint" = String, Path, description = "Base64url-encoded origin URL"),
        ("key" = String, Path, description = "Cache key"),
        DownloadQuery,
    ),
    responses(
        (status = 200, description = "Credentials issued", body = AssumeRoleDownloadResponse),
        (status = 204, description = "No object for the key or any restore key"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Federation failure", body = ApiError),
    ),
    security(("runner_token" = []))
)]
pub async fn assume_role_download(
    State(index): State<CacheIndex>,
    State(broker): State<CredentialBroker>,
    AuthExtractor(auth): AuthExtractor,
    CacheKeyPath(key): CacheKeyPath,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let object_key = ObjectKey::new(&auth.audience, &auth.scope, &key, "");

    let Some(hit) = index.lookup(&object_key, &query.restore_keys()).await else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let issued = broker
        .issue(&auth.audience, &hit.path, ObjectAccess::Download)
        .await?;

    let response = AssumeRoleDownloadResponse {
        cache_hit: hit.key == key,
        credentials: issued.into(),
    };
    Ok(Json(response).into_response())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the credential router. Requires `auth_middleware` as a route layer.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:endpoint/assumeRole/:key/upload", get(assume_role_upload))
        .route("/:endpoint/assumeRole/:key/download", get(assume_role_download))
}
