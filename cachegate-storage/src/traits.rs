//! Backend traits consumed by the gateway.
//!
//! The gateway only ever talks to storage and federation through these two
//! traits, so tests can substitute the in-memory doubles from [`crate::mock`].

use async_trait::async_trait;
use bytes::Bytes;
use cachegate_core::{BackendError, CompletedPart, ObjectHead, TemporaryCredentials};
use std::time::Duration;

pub type BackendResult<T> = Result<T, BackendError>;

/// Object storage operations used by lookup and multipart upload.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// HEAD an object. `Ok(None)` means the object does not exist.
    async fn head(&self, path: &str) -> BackendResult<Option<ObjectHead>>;

    /// Pre-sign a GET request for `path`, valid for `expires_in`.
    async fn presign_get(&self, path: &str, expires_in: Duration) -> BackendResult<String>;

    /// Start a multipart upload and return its upload id.
    async fn create_multipart(&self, path: &str) -> BackendResult<String>;

    /// Upload one part and return the ETag the store assigned to it.
    async fn upload_part(
        &self,
        path: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> BackendResult<String>;

    /// Assemble the uploaded parts into the final object.
    async fn complete_multipart(
        &self,
        path: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<()>;
}

/// Trust broker handing out short-lived, policy-scoped credentials.
#[async_trait]
pub trait Federation: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        policy_json: &str,
        duration_secs: i32,
    ) -> BackendResult<TemporaryCredentials>;
}
