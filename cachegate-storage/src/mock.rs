//! In-memory backends for tests.
//!
//! [`MemoryObjectStore`] and [`MockFederation`] record every call they receive
//! and can be told to fail specific operations, which is what the gateway
//! tests use to observe part ordering and error handling without AWS.

use async_trait::async_trait;
use bytes::Bytes;
use cachegate_core::{BackendError, CompletedPart, ObjectHead, TemporaryCredentials};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::traits::{BackendResult, Federation, ObjectStore};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// OBJECT STORE
// ============================================================================

/// Object store operation, used for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Head,
    PresignGet,
    CreateMultipart,
    UploadPart,
    CompleteMultipart,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Head => "head_object",
            StoreOp::PresignGet => "presign_get",
            StoreOp::CreateMultipart => "create_multipart_upload",
            StoreOp::UploadPart => "upload_part",
            StoreOp::CompleteMultipart => "complete_multipart_upload",
        }
    }
}

/// A call received by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub path: String,
}

/// One uploaded part, as the store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub body: Bytes,
    pub etag: String,
}

/// A finished multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub path: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: StoreOp,
    path: Option<String>,
    part_number: Option<i32>,
    remaining: Option<usize>,
}

impl FailureRule {
    fn matches(&self, op: StoreOp, path: &str, part_number: Option<i32>) -> bool {
        self.op == op
            && self.path.as_deref().map_or(true, |p| p == path)
            && self.part_number.map_or(true, |n| Some(n) == part_number)
            && self.remaining.map_or(true, |n| n > 0)
    }
}

#[derive(Debug, Default)]
struct MultipartRecord {
    path: String,
    parts: Vec<UploadedPart>,
    completed: bool,
}

/// In-memory [`ObjectStore`].
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: DashMap<String, DateTime<Utc>>,
    uploads: Mutex<HashMap<String, MultipartRecord>>,
    completed: Mutex<Vec<CompletedUpload>>,
    calls: Mutex<Vec<StoreCall>>,
    failures: Mutex<Vec<FailureRule>>,
    upload_delay: Mutex<Option<Duration>>,
    next_upload: AtomicU64,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("mock-bucket")
    }
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: DashMap::new(),
            uploads: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            upload_delay: Mutex::new(None),
            next_upload: AtomicU64::new(1),
        }
    }

    /// Seed an existing object.
    pub fn put_object(&self, path: impl Into<String>, last_modified: DateTime<Utc>) {
        self.objects.insert(path.into(), last_modified);
    }

    /// Fail every call of `op`, optionally only for `path`.
    pub fn fail_always(&self, op: StoreOp, path: Option<&str>) {
        locked(&self.failures).push(FailureRule {
            op,
            path: path.map(str::to_string),
            part_number: None,
            remaining: None,
        });
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_times(&self, op: StoreOp, times: usize) {
        locked(&self.failures).push(FailureRule {
            op,
            path: None,
            part_number: None,
            remaining: Some(times),
        });
    }

    /// Fail the next upload of `part_number` once.
    pub fn fail_part_once(&self, part_number: i32) {
        locked(&self.failures).push(FailureRule {
            op: StoreOp::UploadPart,
            path: None,
            part_number: Some(part_number),
            remaining: Some(1),
        });
    }

    /// Make every `upload_part` call sleep before completing.
    pub fn set_upload_delay(&self, delay: Duration) {
        *locked(&self.upload_delay) = Some(delay);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }

    pub fn calls_for(&self, op: StoreOp) -> Vec<StoreCall> {
        locked(&self.calls)
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    /// Parts uploaded to `upload_id`, in arrival order.
    pub fn uploaded_parts(&self, upload_id: &str) -> Vec<UploadedPart> {
        locked(&self.uploads)
            .get(upload_id)
            .map(|record| record.parts.clone())
            .unwrap_or_default()
    }

    pub fn completed_uploads(&self) -> Vec<CompletedUpload> {
        locked(&self.completed).clone()
    }

    fn record(&self, op: StoreOp, path: &str) {
        locked(&self.calls).push(StoreCall {
            op,
            path: path.to_string(),
        });
    }

    fn check_failure(&self, op: StoreOp, path: &str, part_number: Option<i32>) -> BackendResult<()> {
        let mut failures = locked(&self.failures);
        match failures
            .iter_mut()
            .find(|rule| rule.matches(op, path, part_number))
        {
            Some(rule) => {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(BackendError::object_store(op.name(), path, "injected failure"))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, path: &str) -> BackendResult<Option<ObjectHead>> {
        self.record(StoreOp::Head, path);
        self.check_failure(StoreOp::Head, path, None)?;

        Ok(self.objects.get(path).map(|entry| ObjectHead {
            path: path.to_string(),
            last_modified: *entry.value(),
        }))
    }

    async fn presign_get(&self, path: &str, expires_in: Duration) -> BackendResult<String> {
        self.record(StoreOp::PresignGet, path);
        self.check_failure(StoreOp::PresignGet, path, None)?;

        Ok(format!(
            "https://{}.mock.local/{}?X-Amz-Expires={}",
            self.bucket,
            path,
            expires_in.as_secs()
        ))
    }

    async fn create_multipart(&self, path: &str) -> BackendResult<String> {
        self.record(StoreOp::CreateMultipart, path);
        self.check_failure(StoreOp::CreateMultipart, path, None)?;

        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        locked(&self.uploads).insert(
            upload_id.clone(),
            MultipartRecord {
                path: path.to_string(),
                parts: Vec::new(),
                completed: false,
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        path: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> BackendResult<String> {
        self.record(StoreOp::UploadPart, path);

        let delay = *locked(&self.upload_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.check_failure(StoreOp::UploadPart, path, Some(part_number))?;

        let etag = format!("\"{upload_id}-{part_number}\"");
        let mut uploads = locked(&self.uploads);
        let record = uploads
            .get_mut(upload_id)
            .filter(|record| !record.completed)
            .ok_or_else(|| {
                BackendError::object_store("upload_part", path, format!("no such upload {upload_id}"))
            })?;
        record.parts.push(UploadedPart {
            part_number,
            body,
            etag: etag.clone(),
        });
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        path: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<()> {
        self.record(StoreOp::CompleteMultipart, path);
        self.check_failure(StoreOp::CompleteMultipart, path, None)?;

        // Completed records stay around so tests can inspect their parts.
        let record_path = {
            let mut uploads = locked(&self.uploads);
            let record = uploads
                .get_mut(upload_id)
                .filter(|record| !record.completed)
                .ok_or_else(|| {
                    BackendError::object_store(
                        "complete_multipart_upload",
                        path,
                        format!("no such upload {upload_id}"),
                    )
                })?;
            record.completed = true;
            record.path.clone()
        };

        self.objects.insert(record_path.clone(), Utc::now());
        locked(&self.completed).push(CompletedUpload {
            path: record_path,
            upload_id: upload_id.to_string(),
            parts,
        });
        Ok(())
    }
}

// ============================================================================
// FEDERATION
// ============================================================================

/// Arguments of one `assume_role` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleCall {
    pub role_arn: String,
    pub session_name: String,
    pub policy_json: String,
    pub duration_secs: i32,
}

/// [`Federation`] double returning fixed credentials.
#[derive(Debug, Default)]
pub struct MockFederation {
    calls: Mutex<Vec<AssumeRoleCall>>,
    failure: Mutex<Option<String>>,
}

impl MockFederation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent call with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *locked(&self.failure) = Some(reason.into());
    }

    pub fn calls(&self) -> Vec<AssumeRoleCall> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }
}

#[async_trait]
impl Federation for MockFederation {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        policy_json: &str,
        duration_secs: i32,
    ) -> BackendResult<TemporaryCredentials> {
        locked(&self.calls).push(AssumeRoleCall {
            role_arn: role_arn.to_string(),
            session_name: session_name.to_string(),
            policy_json: policy_json.to_string(),
            duration_secs,
        });

        if let Some(reason) = locked(&self.failure).clone() {
            return Err(BackendError::Federation {
                session_name: session_name.to_string(),
                reason,
            });
        }

        Ok(TemporaryCredentials {
            access_key_id: format!("ASIAMOCK{}", self.call_count()),
            secret_access_key: "mock-secret".to_string(),
            session_token: format!("mock-token-{session_name}"),
            expiration: Some(Utc::now() + chrono::Duration::seconds(i64::from(duration_secs))),
        })
    }
}
