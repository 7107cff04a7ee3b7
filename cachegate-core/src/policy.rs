//! Inline IAM session policies.
//!
//! Policies are built per request and handed to role assumption as JSON.
//! They are never stored.

use serde::{Deserialize, Serialize};

/// IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// What the issued credentials may do with the single object they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectAccess {
    Download,
    Upload,
}

impl ObjectAccess {
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            ObjectAccess::Download => &["s3:GetObject"],
            ObjectAccess::Upload => &[
                "s3:PutObject",
                "s3:AbortMultipartUpload",
                "s3:ListMultipartUploadParts",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: String,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl Policy {
    /// Single Allow statement covering exactly one object of one bucket.
    pub fn for_object(bucket: &str, object_path: &str, access: ObjectAccess) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![Statement {
                effect: "Allow".to_string(),
                action: access.actions().iter().map(|a| a.to_string()).collect(),
                resource: vec![object_arn(bucket, object_path)],
            }],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn object_arn(bucket: &str, object_path: &str) -> String {
    format!("arn:aws:s3:::{}/{}", bucket, object_path)
}

pub fn object_uri(bucket: &str, object_path: &str) -> String {
    format!("s3://{}/{}", bucket, object_path)
}
