//! Error Types for the cachegate API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from the domain errors in `cachegate-core`
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cachegate_core::{AuthError, BackendError, UploadError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Endpoint segment, Authorization header or token claims could not be decoded
    AuthMalformed,

    /// The token-issuing origin refused the bearer token
    AuthRejected,

    // ========================================================================
    // Validation Errors (400, 413)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field or header is missing from request
    MissingField,

    /// Byte range is out of order
    InvalidRange,

    /// Field format is incorrect
    InvalidFormat,

    /// Request body exceeds the configured limit
    PayloadTooLarge,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Upload session does not exist (never reserved, or already committed)
    SessionNotFound,

    // ========================================================================
    // Server Errors (500, 504)
    // ========================================================================
    /// Object store or federation backend failed
    UpstreamFailure,

    /// Internal server error
    InternalError,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::AuthMalformed | ErrorCode::AuthRejected => StatusCode::UNAUTHORIZED,

            ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::UpstreamFailure | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::AuthMalformed => "Malformed credentials",
            ErrorCode::AuthRejected => "Token rejected by issuing origin",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Invalid byte range",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::PayloadTooLarge => "Request body too large",
            ErrorCode::SessionNotFound => "Upload session not found",
            ErrorCode::UpstreamFailure => "Storage backend request failed",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn auth_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthMalformed, message)
    }

    pub fn auth_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRejected, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn session_not_found(cache_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::SessionNotFound,
            format!("Upload session {} not found", cache_id),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Malformed { .. } => ApiError::auth_malformed(err.to_string()),
            AuthError::Rejected { .. } => ApiError::auth_rejected(err.to_string()),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        // Full backend detail goes to the log only.
        tracing::error!(error = %err, "Storage backend error");
        ApiError::from_code(ErrorCode::UpstreamFailure)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::SessionNotFound { cache_id } => ApiError::session_not_found(cache_id),
            UploadError::InvalidRange { start, end } => ApiError::new(
                ErrorCode::InvalidRange,
                format!("Range end {} precedes range start {}", end, start),
            ),
            UploadError::StaleRange { .. } => ApiError::new(ErrorCode::InvalidRange, err.to_string()),
            UploadError::TurnTimeout { .. } => ApiError::new(ErrorCode::Timeout, err.to_string()),
            UploadError::IdSpaceExhausted { .. } | UploadError::LockPoisoned => {
                tracing::error!(error = %err, "Upload coordinator failure");
                ApiError::internal_error(err.to_string())
            }
            UploadError::Backend(backend) => ApiError::from(backend),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::internal_error(format!("JSON serialization failed: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::AuthMalformed.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::AuthRejected.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidFormat.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::SessionNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorCode::UpstreamFailure.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::PayloadTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_auth_error_conversion() {
        let err = ApiError::from(AuthError::malformed("bad base64"));
        assert_eq!(err.code, ErrorCode::AuthMalformed);
        assert!(err.message.contains("bad base64"));

        let err = ApiError::from(AuthError::rejected("https://origin/", "status 403"));
        assert_eq!(err.code, ErrorCode::AuthRejected);
    }

    #[test]
    fn test_upload_error_conversion() {
        let err = ApiError::from(UploadError::SessionNotFound { cache_id: 42 });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.message.contains("42"));

        let err = ApiError::from(UploadError::InvalidRange { start: 10, end: 5 });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(UploadError::TurnTimeout {
            cache_id: 1,
            offset: 100,
            waited_secs: 5,
        });
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[test]
    fn test_backend_error_hides_detail() {
        let err = ApiError::from(BackendError::object_store(
            "upload_part",
            "hash/key",
            "secret internal detail",
        ));
        assert_eq!(err.code, ErrorCode::UpstreamFailure);
        assert!(!err.message.contains("secret internal detail"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::auth_malformed("Invalid token");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("AUTH_MALFORMED"));
        assert!(json.contains("Invalid token"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }
}
