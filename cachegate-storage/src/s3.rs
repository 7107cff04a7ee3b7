//! AWS SDK S3 object store.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use cachegate_core::{BackendError, CompletedPart, ObjectHead};
use std::time::Duration;

use crate::convert::utc_from_parts;
use crate::traits::{BackendResult, ObjectStore};

/// [`ObjectStore`] over a single S3 bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            client: S3Client::new(sdk_config),
            bucket: bucket.into(),
        }
    }
}

/// Log an SDK failure and wrap it for the caller.
fn sdk_failure(operation: &'static str, path: &str, reason: String) -> BackendError {
    tracing::error!(operation, path, reason = %reason, "S3 request failed");
    BackendError::object_store(operation, path, reason)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, path: &str) -> BackendResult<Option<ObjectHead>> {
        let request = self.client.head_object().bucket(&self.bucket).key(path);

        match request.send().await {
            Ok(output) => {
                let last_modified = output
                    .last_modified()
                    .and_then(|dt| utc_from_parts(dt.secs(), dt.subsec_nanos()))
                    .ok_or(BackendError::IncompleteResponse {
                        operation: "head_object",
                        field: "last_modified",
                    })?;

                Ok(Some(ObjectHead {
                    path: path.to_string(),
                    last_modified,
                }))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    tracing::debug!(bucket = %self.bucket, path, "Object not found");
                    Ok(None)
                } else {
                    Err(sdk_failure(
                        "head_object",
                        path,
                        DisplayErrorContext(&service_err).to_string(),
                    ))
                }
            }
        }
    }

    async fn presign_get(&self, path: &str, expires_in: Duration) -> BackendResult<String> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| BackendError::object_store("presign_get", path, err.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(config)
            .await
            .map_err(|err| sdk_failure("presign_get", path, DisplayErrorContext(&err).to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn create_multipart(&self, path: &str) -> BackendResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| {
                sdk_failure(
                    "create_multipart_upload",
                    path,
                    DisplayErrorContext(&err).to_string(),
                )
            })?;

        let upload_id = output
            .upload_id()
            .map(str::to_string)
            .ok_or(BackendError::IncompleteResponse {
                operation: "create_multipart_upload",
                field: "upload_id",
            })?;
        tracing::debug!(bucket = %self.bucket, path, upload_id = %upload_id, "Multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        path: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> BackendResult<String> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| sdk_failure("upload_part", path, DisplayErrorContext(&err).to_string()))?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or(BackendError::IncompleteResponse {
                operation: "upload_part",
                field: "e_tag",
            })
    }

    async fn complete_multipart(
        &self,
        path: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<()> {
        let parts = parts
            .into_iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .e_tag(part.etag)
                    .part_number(part.part_number)
                    .build()
            })
            .collect::<Vec<_>>();

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|err| {
                sdk_failure(
                    "complete_multipart_upload",
                    path,
                    DisplayErrorContext(&err).to_string(),
                )
            })?;

        tracing::debug!(bucket = %self.bucket, path, upload_id, "Multipart upload completed");
        Ok(())
    }
}
