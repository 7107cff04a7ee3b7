//! Tenant-scoped cache entry addressing.
//!
//! An [`ObjectKey`] names one logical cache entry. The storage path is the
//! hash of the `(audience, scope, version)` partition followed by the
//! caller-supplied key, so two tenants asking for the same key can never read
//! each other's objects.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator between the partition hash and the caller-supplied key.
const PATH_SEPARATOR: char = '/';

/// Logical identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub audience: String,
    pub scope: String,
    pub key: String,
    pub version: String,
}

impl ObjectKey {
    pub fn new(
        audience: impl Into<String>,
        scope: impl Into<String>,
        key: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            audience: audience.into(),
            scope: scope.into(),
            key: key.into(),
            version: version.into(),
        }
    }

    /// Same partition, different caller key. Used for restore-key fallback.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            audience: self.audience.clone(),
            scope: self.scope.clone(),
            key: key.into(),
            version: self.version.clone(),
        }
    }

    /// Hex-encoded SHA-256 of the `(audience, scope, version)` partition.
    ///
    /// Each component is prefixed with its byte length so that moving bytes
    /// between adjacent components always changes the digest input.
    pub fn partition_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for component in [&self.audience, &self.scope, &self.version] {
            hasher.update((component.len() as u64).to_be_bytes());
            hasher.update(component.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Object path inside the bucket: `<partition hash>/<key>`.
    pub fn storage_path(&self) -> String {
        let mut path = self.partition_hash();
        path.push(PATH_SEPARATOR);
        path.push_str(&self.key);
        path
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_path())
    }
}
