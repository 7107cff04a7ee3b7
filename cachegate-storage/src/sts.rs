//! AWS STS role assumption.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;
use cachegate_core::{BackendError, TemporaryCredentials};

use crate::convert::utc_from_parts;
use crate::traits::{BackendResult, Federation};

#[derive(Clone)]
pub struct StsFederation {
    client: StsClient,
}

impl StsFederation {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: StsClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl Federation for StsFederation {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        policy_json: &str,
        duration_secs: i32,
    ) -> BackendResult<TemporaryCredentials> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .policy(policy_json)
            .duration_seconds(duration_secs)
            .send()
            .await
            .map_err(|err| {
                let reason = DisplayErrorContext(&err).to_string();
                tracing::error!(role_arn, session_name, reason = %reason, "AssumeRole failed");
                BackendError::Federation {
                    session_name: session_name.to_string(),
                    reason,
                }
            })?;

        let credentials = output.credentials().ok_or(BackendError::IncompleteResponse {
            operation: "assume_role",
            field: "credentials",
        })?;

        let expiration = credentials.expiration();
        tracing::debug!(session_name, expires_at = expiration.secs(), "Role assumed");

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: utc_from_parts(expiration.secs(), expiration.subsec_nanos()),
        })
    }
}
