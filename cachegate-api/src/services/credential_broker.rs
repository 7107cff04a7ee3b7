//! Credential Broker Service
//!
//! Issues short-lived storage credentials that can touch exactly one object.

use cachegate_core::{object_uri, ObjectAccess, Policy, TemporaryCredentials};
use cachegate_storage::Federation;
use std::sync::Arc;

use crate::constants::MAX_SESSION_NAME_LEN;
use crate::error::ApiResult;
use crate::telemetry::METRICS;

/// Role session name for a token audience: the text after its last `:`,
/// capped at 64 characters.
pub fn session_name(audience: &str) -> String {
    let tail = audience
        .rsplit_once(':')
        .map_or(audience, |(_, tail)| tail);
    tail.chars().take(MAX_SESSION_NAME_LEN).collect()
}

/// Credentials scoped to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// `s3://{bucket}/{object_path}`
    pub object_uri: String,
    pub credentials: TemporaryCredentials,
}

#[derive(Clone)]
pub struct CredentialBroker {
    federation: Arc<dyn Federation>,
    bucket: String,
    role_arn: String,
    duration_secs: i32,
}

impl CredentialBroker {
    pub fn new(
        federation: Arc<dyn Federation>,
        bucket: impl Into<String>,
        role_arn: impl Into<String>,
        duration_secs: i32,
    ) -> Self {
        Self {
            federation,
            bucket: bucket.into(),
            role_arn: role_arn.into(),
            duration_secs,
        }
    }

    /// Assume the gateway role with an inline policy covering only `object_path`.
    pub async fn issue(
        &self,
        audience: &str,
        object_path: &str,
        access: ObjectAccess,
    ) -> ApiResult<IssuedCredentials> {
        let session = session_name(audience);
        let policy = Policy::for_object(&self.bucket, object_path, access).to_json()?;

        let result = self
            .federation
            .assume_role(&self.role_arn, &session, &policy, self.duration_secs)
            .await;

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_credentials(access, result.is_ok());
        }

        let credentials = result?;
        tracing::info!(
            session = %session,
            access = ?access,
            path = %object_path,
            "Issued scoped credentials"
        );

        Ok(IssuedCredentials {
            object_uri: object_uri(&self.bucket, object_path),
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use cachegate_storage::MockFederation;

    const ROLE: &str = "arn:aws:iam::123456789012:role/cache-writer";

    fn broker(federation: Arc<MockFederation>) -> CredentialBroker {
        CredentialBroker::new(federation, "cache-bucket", ROLE, 900)
    }

    #[test]
    fn test_session_name_takes_last_segment() {
        assert_eq!(session_name("vso:1b2c3d4e"), "1b2c3d4e");
        assert_eq!(session_name("a:b:c"), "c");
        assert_eq!(session_name("no-colon"), "no-colon");
        assert_eq!(session_name("trailing:"), "");
    }

    #[test]
    fn test_session_name_truncated_to_64_chars() {
        let long = format!("vso:{}", "x".repeat(100));
        assert_eq!(session_name(&long).len(), 64);

        let wide = format!("vso:{}", "é".repeat(70));
        assert_eq!(session_name(&wide).chars().count(), 64);
    }

    #[tokio::test]
    async fn test_issue_scopes_policy_to_object() -> ApiResult<()> {
        let federation = Arc::new(MockFederation::new());
        let issued = broker(federation.clone())
            .issue("vso:tenant-1", "abc123/deps", ObjectAccess::Download)
            .await?;

        assert_eq!(issued.object_uri, "s3://cache-bucket/abc123/deps");
        assert_eq!(issued.credentials.session_token, "mock-token-tenant-1");

        let calls = federation.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].role_arn, ROLE);
        assert_eq!(calls[0].session_name, "tenant-1");
        assert_eq!(calls[0].duration_secs, 900);

        let policy: serde_json::Value = serde_json::from_str(&calls[0].policy_json)?;
        assert_eq!(
            policy["Statement"][0]["Resource"],
            serde_json::json!(["arn:aws:s3:::cache-bucket/abc123/deps"])
        );
        assert_eq!(
            policy["Statement"][0]["Action"],
            serde_json::json!(["s3:GetObject"])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_policy_actions() -> ApiResult<()> {
        let federation = Arc::new(MockFederation::new());
        broker(federation.clone())
            .issue("vso:tenant-1", "abc123/deps", ObjectAccess::Upload)
            .await?;

        let policy: serde_json::Value = serde_json::from_str(&federation.calls()[0].policy_json)?;
        assert_eq!(
            policy["Statement"][0]["Action"],
            serde_json::json!([
                "s3:PutObject",
                "s3:AbortMultipartUpload",
                "s3:ListMultipartUploadParts"
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_federation_failure_is_upstream_error() {
        let federation = Arc::new(MockFederation::new());
        federation.fail_with("AccessDenied");

        let err = broker(federation)
            .issue("vso:tenant-1", "abc123/deps", ObjectAccess::Upload)
            .await
            .expect_err("federation rejects");
        assert_eq!(err.code, ErrorCode::UpstreamFailure);
        assert!(!err.message.contains("AccessDenied"));
    }
}
