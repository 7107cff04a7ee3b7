//! Error types for cachegate operations

use thiserror::Error;

/// Authentication failures raised while admitting a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The endpoint segment, the Authorization header or the token claims
    /// could not be decoded.
    #[error("Malformed credentials: {reason}")]
    Malformed { reason: String },

    /// The token-issuing origin refused the bearer token.
    #[error("Token rejected by {origin}: {reason}")]
    Rejected { origin: String, reason: String },
}

impl AuthError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn rejected(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the object-storage or federation backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Object store {operation} failed for {path}: {reason}")]
    ObjectStore {
        operation: &'static str,
        path: String,
        reason: String,
    },

    #[error("Role assumption failed for session {session_name}: {reason}")]
    Federation { session_name: String, reason: String },

    #[error("Backend returned an incomplete response for {operation}: missing {field}")]
    IncompleteResponse {
        operation: &'static str,
        field: &'static str,
    },
}

impl BackendError {
    pub fn object_store(
        operation: &'static str,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ObjectStore {
            operation,
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Multipart upload coordination errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Upload session {cache_id} not found")]
    SessionNotFound { cache_id: i64 },

    #[error("Invalid byte range {start}-{end}")]
    InvalidRange { start: u64, end: u64 },

    /// The range starts below the session's next expected offset, so its turn
    /// has already passed.
    #[error("Range starting at {start} already written to session {cache_id} (next offset {next_offset})")]
    StaleRange {
        cache_id: i64,
        start: u64,
        next_offset: u64,
    },

    #[error("Timed out after {waited_secs}s waiting for offset {offset} of session {cache_id}")]
    TurnTimeout {
        cache_id: i64,
        offset: u64,
        waited_secs: u64,
    },

    #[error("Could not allocate a free session id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    #[error("Upload session state lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// TESTS
// =============================================================================
