//! Shared value types passed between the gateway and its backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an in-progress upload session.
///
/// Serialized as a bare integer (`cacheId`) because that is what runners send
/// back on PATCH and commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct CacheId(pub i64);

impl CacheId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CacheId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Metadata of a stored object, as returned by a HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub path: String,
    pub last_modified: DateTime<Utc>,
}

/// One finished part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based, strictly increasing, contiguous.
    pub part_number: i32,
    pub etag: String,
}

/// Short-lived credentials returned by role assumption.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Cache entry returned by a successful lookup. Derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Pre-signed URL the runner downloads the archive from.
    pub archive_location: String,
    pub cache_key: String,
    pub cache_version: String,
    /// RFC 3339 last-modified time of the stored object.
    pub creation_time: String,
    pub scope: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_id_serializes_as_integer() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&CacheId(42))?;
        assert_eq!(json, "42");
        let back: CacheId = serde_json::from_str("42")?;
        assert_eq!(back, CacheId(42));
        Ok(())
    }

    #[test]
    fn test_cache_entry_uses_camel_case() -> Result<(), serde_json::Error> {
        let entry = CacheEntry {
            archive_location: "https://example/x".to_string(),
            cache_key: "k".to_string(),
            cache_version: "v".to_string(),
            creation_time: "2024-01-01T00:00:00Z".to_string(),
            scope: "refs/heads/main".to_string(),
        };
        let json = serde_json::to_string(&entry)?;
        assert!(json.contains("\"archiveLocation\""));
        assert!(json.contains("\"cacheVersion\""));
        assert!(json.contains("\"creationTime\""));
        Ok(())
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = TemporaryCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "super-secret".to_string(),
            session_token: "token-value".to_string(),
            expiration: None,
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ASIAEXAMPLE"));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("token-value"));
    }
}
