//! Constants for the cachegate API
//!
//! This module contains all constant values used throughout the API.
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// LISTENER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// How long a successful origin validation is reused (5 minutes)
pub const DEFAULT_ACCEPTANCE_TTL_SECS: u64 = 300;

/// How often expired acceptance-cache entries are swept
pub const DEFAULT_ACCEPTANCE_SWEEP_SECS: u64 = 60;

/// HTTP timeout for the remote validation call
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 30;

/// Cache-lookup path appended to the token-issuing origin's base URL
pub const ORIGIN_CACHE_PATH: &str = "_apis/artifactcache/cache";

/// Probe key sent to the origin; the lookup only has to be authorized, not hit
pub const ORIGIN_PROBE_KEYS: &str = "e3b0c44298fc1c149afbf4c8996fb924";

/// Probe version sent to the origin
pub const ORIGIN_PROBE_VERSION: &str = "27ae41e4649b934ca495991b7852b855";

/// Accept header the origin's cache API expects
pub const ORIGIN_ACCEPT: &str = "application/json;api-version=6.0-preview.1";

// ============================================================================
// STORAGE
// ============================================================================

/// Lifetime of pre-signed GET URLs in seconds
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 60;

/// Lifetime of issued federated credentials in seconds
pub const DEFAULT_CREDENTIAL_DURATION_SECS: i32 = 900;

/// Maximum length of a federated session name
pub const MAX_SESSION_NAME_LEN: usize = 64;

// ============================================================================
// UPLOADS
// ============================================================================

/// Default bound on waiting for an upload turn (15 minutes)
pub const DEFAULT_PART_WAIT_TIMEOUT_SECS: u64 = 900;

/// Default PATCH body limit (128 MiB)
pub const DEFAULT_MAX_PART_BYTES: usize = 128 * 1024 * 1024;

/// Attempts to find a free session id before giving up
pub const MAX_SESSION_ID_ATTEMPTS: usize = 16;
