//! Authentication Module
//!
//! Runners call the gateway with the same bearer token they would present to
//! their own artifact-cache origin. The origin's base URL travels in the first
//! path segment, URL-safe base64 encoded.
//!
//! Admission works in three steps:
//! 1. Decode the endpoint segment and the bearer token's claims. The token
//!    signature is NOT verified; the origin is the authority on liveness.
//! 2. Look up `endpoint#signature` in the acceptance cache. A hit younger than
//!    the TTL admits the request without a network call.
//! 3. Otherwise ask the origin to authorize a probe cache lookup with the same
//!    Authorization header, and remember the success.

use crate::constants::{ORIGIN_ACCEPT, ORIGIN_CACHE_PATH, ORIGIN_PROBE_KEYS, ORIGIN_PROBE_VERSION};
use crate::telemetry::METRICS;
use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use cachegate_core::{AuthError, Clock};
use cachegate_storage::StateStore;
use chrono::{DateTime, Utc};
use jsonwebtoken::dangerous::insecure_decode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// URL-safe alphabet, accepting the endpoint segment with or without padding.
const ENDPOINT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// AUTHENTICATION CONTEXT
// ============================================================================

/// Identity of an admitted request.
///
/// Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Token audience; the tenant partition.
    pub audience: String,

    /// Scope of the first access-control entry, typically a git ref.
    pub scope: String,

    /// Decoded base URL of the token-issuing origin.
    pub endpoint: String,
}

// ============================================================================
// TOKEN PARSING
// ============================================================================

#[derive(Debug, Deserialize)]
struct RunnerClaims {
    /// JSON-encoded access-control list.
    #[serde(default)]
    ac: String,

    #[serde(default)]
    aud: String,
}

#[derive(Debug, Deserialize)]
struct AccessControlEntry {
    #[serde(rename = "Scope", default)]
    scope: String,
}

/// Claims the gateway relies on, read from an unverified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub audience: String,
    pub scope: String,
    /// Third dot-separated segment of the token.
    pub signature: String,
}

/// Decode the path-embedded origin URL.
pub fn decode_endpoint(segment: &str) -> Result<String, AuthError> {
    let bytes = ENDPOINT_ENGINE
        .decode(segment)
        .map_err(|e| AuthError::malformed(format!("endpoint is not URL-safe base64: {}", e)))?;

    String::from_utf8(bytes).map_err(|_| AuthError::malformed("endpoint is not valid UTF-8"))
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization.ok_or_else(|| AuthError::malformed("missing Authorization header"))?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err(AuthError::malformed("empty bearer token")),
        None => Err(AuthError::malformed(
            "Authorization header must use Bearer scheme",
        )),
    }
}

/// Read `aud` and the first access-control scope without checking the signature.
pub fn parse_token(token: &str) -> Result<TokenClaims, AuthError> {
    let signature = token
        .split('.')
        .nth(2)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::malformed("token has no signature segment"))?
        .to_string();

    // Runner tokens are RS256; no key is held, so the payload is read as-is.
    let data = insecure_decode::<RunnerClaims>(token)
        .map_err(|e| AuthError::malformed(format!("token claims: {}", e)))?;

    let entries: Vec<AccessControlEntry> = serde_json::from_str(&data.claims.ac)
        .map_err(|e| AuthError::malformed(format!("access-control claim: {}", e)))?;

    let scope = entries
        .into_iter()
        .next()
        .map(|entry| entry.scope)
        .ok_or_else(|| AuthError::malformed("access-control claim is empty"))?;

    Ok(TokenClaims {
        audience: data.claims.aud,
        scope,
        signature,
    })
}

/// Key under which a successful validation is remembered.
pub fn acceptance_key(endpoint: &str, signature: &str) -> String {
    format!("{}#{}", endpoint, signature)
}

// ============================================================================
// ACCEPTANCE CACHE
// ============================================================================

/// Remembers when each `endpoint#signature` was last validated by its origin.
#[derive(Clone)]
pub struct AcceptanceCache {
    store: Arc<dyn StateStore<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl AcceptanceCache {
    pub fn new(
        store: Arc<dyn StateStore<String, DateTime<Utc>>>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(5200));
        Self { store, clock, ttl }
    }

    fn is_live(&self, verified_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        verified_at
            .checked_add_signed(self.ttl)
            .map_or(true, |expires_at| now < expires_at)
    }

    /// True when `key` was validated less than one TTL ago.
    pub fn is_fresh(&self, key: &str) -> bool {
        match self.store.get(&key.to_string()) {
            Some(verified_at) => self.is_live(verified_at, self.clock.now()),
            None => false,
        }
    }

    /// Record a successful validation at the current instant.
    pub fn record(&self, key: String) {
        self.store.put(key, self.clock.now());
    }

    /// Drop expired entries. An entry refreshed since the snapshot is kept.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        self.store
            .snapshot()
            .into_iter()
            .filter(|(_, verified_at)| !self.is_live(*verified_at, now))
            .filter(|(key, verified_at)| self.store.compare_and_swap(key, Some(verified_at), None))
            .count()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

// ============================================================================
// TOKEN ORIGIN
// ============================================================================

/// The service that issued the runner's token.
#[async_trait]
pub trait TokenOrigin: Send + Sync {
    /// Succeeds when `origin` still honours the `authorization` header.
    async fn check_liveness(&self, origin: &str, authorization: &str) -> Result<(), AuthError>;
}

/// [`TokenOrigin`] that asks the origin to authorize a probe cache lookup.
#[derive(Debug, Clone)]
pub struct HttpTokenOrigin {
    client: reqwest::Client,
}

impl HttpTokenOrigin {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn probe_url(origin: &str) -> String {
        if origin.ends_with('/') {
            format!("{}{}", origin, ORIGIN_CACHE_PATH)
        } else {
            format!("{}/{}", origin, ORIGIN_CACHE_PATH)
        }
    }
}

#[async_trait]
impl TokenOrigin for HttpTokenOrigin {
    async fn check_liveness(&self, origin: &str, authorization: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .get(Self::probe_url(origin))
            .query(&[("keys", ORIGIN_PROBE_KEYS), ("version", ORIGIN_PROBE_VERSION)])
            .header(ACCEPT, ORIGIN_ACCEPT)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| AuthError::rejected(origin, e.to_string()))?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => Err(AuthError::rejected(origin, status.to_string())),
        }
    }
}

/// [`TokenOrigin`] with a fixed verdict that counts its calls.
#[derive(Debug, Default)]
pub struct StaticTokenOrigin {
    reject: AtomicBool,
    calls: AtomicUsize,
}

impl StaticTokenOrigin {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        let origin = Self::default();
        origin.set_reject(true);
        origin
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenOrigin for StaticTokenOrigin {
    async fn check_liveness(&self, origin: &str, _authorization: &str) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            Err(AuthError::rejected(origin, "401 Unauthorized"))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// TOKEN GATE
// ============================================================================

/// Admits requests by endpoint segment and bearer token.
#[derive(Clone)]
pub struct TokenGate {
    origin: Arc<dyn TokenOrigin>,
    acceptance: AcceptanceCache,
}

impl TokenGate {
    pub fn new(origin: Arc<dyn TokenOrigin>, acceptance: AcceptanceCache) -> Self {
        Self { origin, acceptance }
    }

    pub fn acceptance(&self) -> &AcceptanceCache {
        &self.acceptance
    }

    /// Authenticate one request.
    ///
    /// Malformed input is rejected before any network call.
    pub async fn authenticate(
        &self,
        endpoint_segment: &str,
        authorization: Option<&str>,
    ) -> Result<AuthContext, AuthError> {
        let endpoint = decode_endpoint(endpoint_segment)?;
        let token = bearer_token(authorization)?;
        let claims = parse_token(token)?;

        let key = acceptance_key(&endpoint, &claims.signature);
        let metrics = METRICS.as_ref().ok();
        if self.acceptance.is_fresh(&key) {
            tracing::trace!(endpoint = %endpoint, "Reusing cached token validation");
            if let Some(m) = metrics {
                m.record_token_validation("cached");
            }
        } else {
            // bearer_token succeeded, so the header is present.
            let header = authorization.unwrap_or_default();
            if let Err(err) = self.origin.check_liveness(&endpoint, header).await {
                tracing::info!(endpoint = %endpoint, error = %err, "Token rejected by origin");
                if let Some(m) = metrics {
                    m.record_token_validation("rejected");
                }
                return Err(err);
            }
            self.acceptance.record(key);
            if let Some(m) = metrics {
                m.record_token_validation("accepted");
            }
            tracing::debug!(endpoint = %endpoint, audience = %claims.audience, "Token validated by origin");
        }

        Ok(AuthContext {
            audience: claims.audience,
            scope: claims.scope,
            endpoint,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cachegate_core::ManualClock;
    use cachegate_storage::MemoryStore;
    use cachegate_test_utils::{
        encode_endpoint, fixed_start, rs256_runner_token, runner_token, runner_token_with_ac,
        TEST_AUDIENCE, TEST_ORIGIN, TEST_SCOPE,
    };

    fn gate_with(origin: Arc<StaticTokenOrigin>, clock: ManualClock) -> TokenGate {
        let acceptance = AcceptanceCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(clock),
            Duration::from_secs(300),
        );
        TokenGate::new(origin, acceptance)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn test_decode_endpoint_with_and_without_padding() -> Result<(), AuthError> {
        let unpadded = encode_endpoint(TEST_ORIGIN);
        assert_eq!(decode_endpoint(&unpadded)?, TEST_ORIGIN);

        let padded = base64::engine::general_purpose::URL_SAFE.encode(TEST_ORIGIN);
        assert_eq!(decode_endpoint(&padded)?, TEST_ORIGIN);
        Ok(())
    }

    #[test]
    fn test_decode_endpoint_rejects_garbage() {
        assert!(matches!(
            decode_endpoint("not base64!!"),
            Err(AuthError::Malformed { .. })
        ));
    }

    #[test]
    fn test_bearer_token_requires_scheme() {
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert_eq!(bearer_token(Some("Bearer a.b.c")).ok(), Some("a.b.c"));
    }

    #[test]
    fn test_parse_token_extracts_audience_and_scope() -> Result<(), AuthError> {
        let token = runner_token(TEST_AUDIENCE, TEST_SCOPE);
        let claims = parse_token(&token)?;
        assert_eq!(claims.audience, TEST_AUDIENCE);
        assert_eq!(claims.scope, TEST_SCOPE);
        assert_eq!(Some(claims.signature.as_str()), token.split('.').nth(2));
        Ok(())
    }

    #[test]
    fn test_parse_token_accepts_rs256_runner_token() -> Result<(), AuthError> {
        let token = rs256_runner_token(TEST_AUDIENCE, TEST_SCOPE);
        let claims = parse_token(&token)?;
        assert_eq!(claims.audience, TEST_AUDIENCE);
        assert_eq!(claims.scope, TEST_SCOPE);
        assert_eq!(Some(claims.signature.as_str()), token.split('.').nth(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_rs256_runner_token_is_admitted() -> Result<(), AuthError> {
        let origin = Arc::new(StaticTokenOrigin::accepting());
        let gate = gate_with(origin.clone(), ManualClock::new(fixed_start()));
        let header = bearer(&rs256_runner_token(TEST_AUDIENCE, TEST_SCOPE));

        let ctx = gate
            .authenticate(&encode_endpoint(TEST_ORIGIN), Some(&header))
            .await?;
        assert_eq!(ctx.audience, TEST_AUDIENCE);
        assert_eq!(ctx.scope, TEST_SCOPE);
        assert_eq!(ctx.endpoint, TEST_ORIGIN);
        assert_eq!(origin.calls(), 1);
        Ok(())
    }

    #[test]
    fn test_parse_token_uses_first_access_control_entry() -> Result<(), AuthError> {
        let token = runner_token_with_ac(
            TEST_AUDIENCE,
            r#"[{"Scope":"refs/heads/feature","Permission":3},{"Scope":"refs/heads/main","Permission":1}]"#,
        );
        assert_eq!(parse_token(&token)?.scope, "refs/heads/feature");
        Ok(())
    }

    #[test]
    fn test_parse_token_rejects_empty_access_control() {
        let token = runner_token_with_ac(TEST_AUDIENCE, "[]");
        assert!(matches!(parse_token(&token), Err(AuthError::Malformed { .. })));

        let token = runner_token_with_ac(TEST_AUDIENCE, "not json");
        assert!(matches!(parse_token(&token), Err(AuthError::Malformed { .. })));
    }

    #[test]
    fn test_parse_token_rejects_missing_signature() {
        assert!(parse_token("header.payload").is_err());
        assert!(parse_token("header.payload.").is_err());
    }

    #[tokio::test]
    async fn test_validation_reused_until_ttl_boundary() -> Result<(), AuthError> {
        let origin = Arc::new(StaticTokenOrigin::accepting());
        let clock = ManualClock::new(fixed_start());
        let gate = gate_with(origin.clone(), clock.clone());

        let endpoint = encode_endpoint(TEST_ORIGIN);
        let header = bearer(&runner_token(TEST_AUDIENCE, TEST_SCOPE));

        gate.authenticate(&endpoint, Some(&header)).await?;
        assert_eq!(origin.calls(), 1);

        clock.advance(chrono::Duration::seconds(299));
        gate.authenticate(&endpoint, Some(&header)).await?;
        assert_eq!(origin.calls(), 1);

        clock.set(fixed_start() + chrono::Duration::seconds(300));
        gate.authenticate(&endpoint, Some(&header)).await?;
        assert_eq!(origin.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_is_not_cached() {
        let origin = Arc::new(StaticTokenOrigin::rejecting());
        let gate = gate_with(origin.clone(), ManualClock::new(fixed_start()));

        let endpoint = encode_endpoint(TEST_ORIGIN);
        let header = bearer(&runner_token(TEST_AUDIENCE, TEST_SCOPE));

        let err = gate
            .authenticate(&endpoint, Some(&header))
            .await
            .expect_err("origin rejects");
        assert!(matches!(err, AuthError::Rejected { .. }));
        assert!(gate.acceptance().is_empty());

        origin.set_reject(false);
        assert!(gate.authenticate(&endpoint, Some(&header)).await.is_ok());
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_endpoint_never_calls_origin() {
        let origin = Arc::new(StaticTokenOrigin::accepting());
        let gate = gate_with(origin.clone(), ManualClock::new(fixed_start()));
        let header = bearer(&runner_token(TEST_AUDIENCE, TEST_SCOPE));

        let err = gate
            .authenticate("%%%", Some(&header))
            .await
            .expect_err("bad endpoint");
        assert!(matches!(err, AuthError::Malformed { .. }));
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn test_different_signature_revalidates() -> Result<(), AuthError> {
        let origin = Arc::new(StaticTokenOrigin::accepting());
        let gate = gate_with(origin.clone(), ManualClock::new(fixed_start()));
        let endpoint = encode_endpoint(TEST_ORIGIN);

        let first = bearer(&runner_token(TEST_AUDIENCE, TEST_SCOPE));
        let second = bearer(&runner_token(TEST_AUDIENCE, "refs/heads/other"));

        gate.authenticate(&endpoint, Some(&first)).await?;
        gate.authenticate(&endpoint, Some(&second)).await?;
        assert_eq!(origin.calls(), 2);
        Ok(())
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let clock = ManualClock::new(fixed_start());
        let cache = AcceptanceCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            Duration::from_secs(300),
        );

        cache.record("old".to_string());
        clock.advance(chrono::Duration::seconds(200));
        cache.record("new".to_string());
        clock.advance(chrono::Duration::seconds(100));

        assert_eq!(cache.sweep(), 1);
        assert!(!cache.is_fresh("old"));
        assert!(cache.is_fresh("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_probe_url_joins_path() {
        assert_eq!(
            HttpTokenOrigin::probe_url("https://origin.test/abc/"),
            "https://origin.test/abc/_apis/artifactcache/cache"
        );
        assert_eq!(
            HttpTokenOrigin::probe_url("https://origin.test/abc"),
            "https://origin.test/abc/_apis/artifactcache/cache"
        );
    }
}
