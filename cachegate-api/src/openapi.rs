//! OpenAPI Specification for the cachegate API
//!
//! Generated by utoipa from the route annotations and schema derives.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use cachegate_core::{CacheEntry, CacheId};

use crate::error::{ApiError, ErrorCode};
use crate::routes::artifactcache::{ReserveCacheRequest, ReserveCacheResponse};
use crate::routes::assume_role::{AssumeRoleDownloadResponse, AssumeRoleUploadResponse};
use crate::routes::health::{GatewayLoad, ProbeReport, ProbeStatus};
use crate::routes::{artifactcache, assume_role, health};
use crate::telemetry::metrics;

/// OpenAPI document for the gateway.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "cachegate API",
        version = "0.1.0",
        description = "Artifact-cache gateway for CI runners backed by object storage",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    tags(
        (name = "Artifact Cache", description = "Cache lookup and multipart upload protocol"),
        (name = "Credentials", description = "Object-scoped temporary storage credentials"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        artifactcache::get_cache_entry,
        artifactcache::reserve_cache,
        artifactcache::upload_cache_part,
        artifactcache::commit_cache,
        assume_role::assume_role_upload,
        assume_role::assume_role_download,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        CacheEntry,
        CacheId,
        ReserveCacheRequest,
        ReserveCacheResponse,
        AssumeRoleUploadResponse,
        AssumeRoleDownloadResponse,
        ProbeReport,
        ProbeStatus,
        GatewayLoad,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the runner bearer token scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "runner_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
