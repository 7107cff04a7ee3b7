//! Cache Index Service
//!
//! Resolves a logical cache request to a stored object. The exact key is
//! tried first, then each restore key in the order the caller sent them.

use cachegate_core::{CacheEntry, ObjectKey};
use cachegate_storage::ObjectStore;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiResult;
use crate::telemetry::METRICS;

/// A stored object matched by [`CacheIndex::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    /// Logical key that matched: the requested key or one of the restore keys.
    pub key: String,
    /// Storage path of the matched object.
    pub path: String,
    pub last_modified: DateTime<Utc>,
}

fn record_lookup(hit: bool) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_cache_lookup(hit);
    }
}

/// Read side of the artifact cache.
#[derive(Clone)]
pub struct CacheIndex {
    store: Arc<dyn ObjectStore>,
    presign_ttl: Duration,
}

impl CacheIndex {
    pub fn new(store: Arc<dyn ObjectStore>, presign_ttl: Duration) -> Self {
        Self { store, presign_ttl }
    }

    /// Find the first existing object among `object_key` and its restore keys.
    ///
    /// Restore keys share the audience, scope and version of `object_key`. A
    /// backend error on one candidate is logged and the search moves on.
    pub async fn lookup(&self, object_key: &ObjectKey, restore_keys: &[String]) -> Option<CacheHit> {
        let candidates =
            std::iter::once(object_key.key.as_str()).chain(restore_keys.iter().map(String::as_str));

        for key in candidates {
            let path = object_key.with_key(key).storage_path();
            match self.store.head(&path).await {
                Ok(Some(head)) => {
                    tracing::debug!(key, path = %path, "Cache hit");
                    record_lookup(true);
                    return Some(CacheHit {
                        key: key.to_string(),
                        path,
                        last_modified: head.last_modified,
                    });
                }
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(key, path = %path, error = %err, "Cache lookup failed for candidate");
                }
            }
        }

        record_lookup(false);
        None
    }

    /// Look up and pre-sign a download URL for the match.
    pub async fn resolve(
        &self,
        object_key: &ObjectKey,
        restore_keys: &[String],
    ) -> ApiResult<Option<CacheEntry>> {
        let Some(hit) = self.lookup(object_key, restore_keys).await else {
            return Ok(None);
        };

        let archive_location = self.store.presign_get(&hit.path, self.presign_ttl).await?;

        Ok(Some(CacheEntry {
            archive_location,
            cache_key: hit.key,
            cache_version: object_key.version.clone(),
            creation_time: hit.last_modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            scope: object_key.scope.clone(),
        }))
    }
}

// =============================================================================
// TESTS
// =============================================================================
