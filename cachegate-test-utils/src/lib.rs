//! cachegate Test Utilities
//!
//! Shared test infrastructure for the cachegate workspace:
//! - Runner token builders
//! - Fixtures for common scenarios
//! - Proptest generators for cache addressing

// Re-export the in-memory backends from their source crate
pub use cachegate_storage::{
    AssumeRoleCall, CompletedUpload, MemoryObjectStore, MemoryStore, MockFederation, StoreCall,
    StoreOp, UploadedPart,
};

pub use cachegate_core::{CacheId, ManualClock, ObjectKey};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Base URL of the fake token-issuing origin.
pub const TEST_ORIGIN: &str = "https://artifactcache.actions.example.com/Abc123Def456/";

/// Token audience in the runner format `vso:<guid>`.
pub const TEST_AUDIENCE: &str = "vso:7e3c1f0a-58b2-4d7e-9c61-2f4a9e0b1d35";

pub const TEST_SCOPE: &str = "refs/heads/main";

pub const TEST_VERSION: &str = "d7a1f0c2b9e84a37";

/// Tokens are never verified by the gateway, so any secret works.
const TEST_SIGNING_SECRET: &[u8] = b"cachegate-test-signing-secret";

// ============================================================================
// TOKEN BUILDERS
// ============================================================================

#[derive(Serialize)]
struct TestClaims<'a> {
    aud: &'a str,
    ac: &'a str,
    iat: i64,
}

/// Runner token whose first access-control entry grants `scope`.
pub fn runner_token(audience: &str, scope: &str) -> String {
    let ac = serde_json::json!([{ "Scope": scope, "Permission": 3 }]).to_string();
    runner_token_with_ac(audience, &ac)
}

/// Runner token with a raw `ac` claim.
pub fn runner_token_with_ac(audience: &str, ac: &str) -> String {
    let claims = TestClaims {
        aud: audience,
        ac,
        iat: fixed_start().timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SIGNING_SECRET),
    )
    .expect("test token encodes")
}

/// Runner token in the shape CI servers issue: RS256 header, key id and a
/// 256-byte signature. The signature is filler; nothing can verify it.
pub fn rs256_runner_token(audience: &str, scope: &str) -> String {
    let header = serde_json::json!({
        "typ": "JWT",
        "alg": "RS256",
        "x5t": "Q2FjaGVnYXRlVGVzdEtleQ",
        "kid": "2C3B1F4E5A6D7C8B9A0F1E2D3C4B5A6978695A4B",
    });
    let ac = serde_json::json!([{ "Scope": scope, "Permission": 3 }]).to_string();
    let claims = TestClaims {
        aud: audience,
        ac: &ac,
        iat: fixed_start().timestamp(),
    };
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let signature: Vec<u8> = payload.iter().cycle().take(256).copied().collect();

    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(signature),
    )
}

/// `Authorization` header value for a token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Encode an origin URL the way runners put it in the first path segment.
pub fn encode_endpoint(origin: &str) -> String {
    URL_SAFE_NO_PAD.encode(origin)
}

// ============================================================================
// FIXTURES
// ============================================================================

/// 2024-01-01T00:00:00Z, the start instant for manual clocks.
pub fn fixed_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Object key in the test tenant's partition.
pub fn sample_object_key(key: &str) -> ObjectKey {
    ObjectKey::new(TEST_AUDIENCE, TEST_SCOPE, key, TEST_VERSION)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Printable partition component, possibly empty or containing separators.
    pub fn arb_component() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9:/._-]{0,24}"
    }

    /// Cache key as runners produce them.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9._-]{1,48}"
    }

    pub fn arb_object_key() -> impl Strategy<Value = ObjectKey> {
        (arb_component(), arb_component(), arb_cache_key(), arb_component())
            .prop_map(|(audience, scope, key, version)| ObjectKey::new(audience, scope, key, version))
    }

    /// Contiguous inclusive ranges covering `[0, total)` in chunks of at most `max_chunk`.
    pub fn arb_ranges(max_parts: usize, max_chunk: u64) -> impl Strategy<Value = Vec<(u64, u64)>> {
        proptest::collection::vec(1..=max_chunk, 1..=max_parts).prop_map(|sizes| {
            let mut start = 0;
            sizes
                .into_iter()
                .map(|size| {
                    let range = (start, start + size - 1);
                    start += size;
                    range
                })
                .collect()
        })
    }
}
