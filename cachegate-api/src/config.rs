//! Gateway Configuration Module
//!
//! Configuration is loaded from environment variables. The bucket and the
//! federated role are required; everything else has a default.

use crate::constants::*;
use cachegate_core::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

// ============================================================================
// GATEWAY CONFIGURATION
// ============================================================================

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // ========================================================================
    // Backend
    // ========================================================================
    /// Bucket holding cache archives.
    pub bucket: String,

    /// Role assumed when issuing object-scoped credentials.
    pub role_arn: String,

    // ========================================================================
    // Listener
    // ========================================================================
    pub bind_host: String,
    pub port: u16,

    // ========================================================================
    // Timing
    // ========================================================================
    /// How long a successful origin validation is reused.
    pub acceptance_ttl: Duration,

    /// Period of the acceptance-cache sweep.
    pub acceptance_sweep_interval: Duration,

    /// Lifetime of pre-signed download URLs.
    pub presign_ttl: Duration,

    /// STS session length in seconds.
    pub credential_duration_secs: i32,

    /// Bound on waiting for an upload turn. `None` waits forever.
    pub part_wait_timeout: Option<Duration>,

    /// Timeout for the remote validation HTTP call.
    pub origin_timeout: Duration,

    // ========================================================================
    // Limits
    // ========================================================================
    /// Maximum PATCH body size in bytes.
    pub max_part_bytes: usize,
}

impl GatewayConfig {
    /// Configuration with defaults for everything but the backend.
    pub fn new(bucket: impl Into<String>, role_arn: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            role_arn: role_arn.into(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            acceptance_ttl: Duration::from_secs(DEFAULT_ACCEPTANCE_TTL_SECS),
            acceptance_sweep_interval: Duration::from_secs(DEFAULT_ACCEPTANCE_SWEEP_SECS),
            presign_ttl: Duration::from_secs(DEFAULT_PRESIGN_TTL_SECS),
            credential_duration_secs: DEFAULT_CREDENTIAL_DURATION_SECS,
            part_wait_timeout: Some(Duration::from_secs(DEFAULT_PART_WAIT_TIMEOUT_SECS)),
            origin_timeout: Duration::from_secs(DEFAULT_ORIGIN_TIMEOUT_SECS),
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
        }
    }

    /// Create GatewayConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ARTIFACTCACHE_BUCKET`: Storage bucket (required)
    /// - `ARTIFACTCACHE_ROLE_ARN`: Role assumed for credentials (required)
    /// - `CACHEGATE_BIND`: Listen host (default: 0.0.0.0)
    /// - `PORT` / `CACHEGATE_PORT`: Listen port (default: 8080)
    /// - `CACHEGATE_ACCEPTANCE_TTL_SECS`: Validation reuse window (default: 300)
    /// - `CACHEGATE_ACCEPTANCE_SWEEP_SECS`: Sweep period (default: 60)
    /// - `CACHEGATE_PRESIGN_TTL_SECS`: Pre-signed URL lifetime (default: 60)
    /// - `CACHEGATE_CREDENTIAL_DURATION_SECS`: STS session length (default: 900)
    /// - `CACHEGATE_PART_WAIT_TIMEOUT_SECS`: Upload turn wait, 0 = unbounded (default: 900)
    /// - `CACHEGATE_MAX_PART_BYTES`: PATCH body limit (default: 134217728)
    /// - `CACHEGATE_ORIGIN_TIMEOUT_SECS`: Remote validation timeout (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingRequired {
                    field: name.to_string(),
                })
        };

        let mut config = Self::new(
            required("ARTIFACTCACHE_BUCKET")?,
            required("ARTIFACTCACHE_ROLE_ARN")?,
        );

        if let Some(host) = lookup("CACHEGATE_BIND").filter(|h| !h.trim().is_empty()) {
            config.bind_host = host.trim().to_string();
        }

        let port_var = if lookup("PORT").is_some() {
            "PORT"
        } else {
            "CACHEGATE_PORT"
        };
        if let Some(port) = parse_var::<u16, _>(&lookup, port_var)? {
            config.port = port;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHEGATE_ACCEPTANCE_TTL_SECS")? {
            config.acceptance_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHEGATE_ACCEPTANCE_SWEEP_SECS")? {
            config.acceptance_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHEGATE_PRESIGN_TTL_SECS")? {
            config.presign_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<i32, _>(&lookup, "CACHEGATE_CREDENTIAL_DURATION_SECS")? {
            config.credential_duration_secs = secs;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHEGATE_PART_WAIT_TIMEOUT_SECS")? {
            config.part_wait_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(bytes) = parse_var::<usize, _>(&lookup, "CACHEGATE_MAX_PART_BYTES")? {
            config.max_part_bytes = bytes;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHEGATE_ORIGIN_TIMEOUT_SECS")? {
            config.origin_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the gateway misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acceptance_sweep_interval.is_zero() {
            return Err(invalid(
                "CACHEGATE_ACCEPTANCE_SWEEP_SECS",
                "0",
                "sweep period must be positive",
            ));
        }
        // STS accepts 900..=43200 second sessions.
        if !(900..=43_200).contains(&self.credential_duration_secs) {
            return Err(invalid(
                "CACHEGATE_CREDENTIAL_DURATION_SECS",
                &self.credential_duration_secs.to_string(),
                "must be between 900 and 43200",
            ));
        }
        if self.presign_ttl.is_zero() {
            return Err(invalid(
                "CACHEGATE_PRESIGN_TTL_SECS",
                "0",
                "pre-signed URL lifetime must be positive",
            ));
        }
        if self.max_part_bytes == 0 {
            return Err(invalid(
                "CACHEGATE_MAX_PART_BYTES",
                "0",
                "body limit must be positive",
            ));
        }
        Ok(())
    }

    /// Socket address to listen on.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_host, self.port);
        raw.parse()
            .map_err(|e: std::net::AddrParseError| invalid("CACHEGATE_BIND", &raw, &e.to_string()))
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(name, &raw, &e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("ARTIFACTCACHE_BUCKET", "ci-cache"),
        ("ARTIFACTCACHE_ROLE_ARN", "arn:aws:iam::123456789012:role/cache"),
    ];

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup_from(&REQUIRED)).expect("config");
        assert_eq!(config.bucket, "ci-cache");
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.acceptance_ttl, Duration::from_secs(300));
        assert_eq!(config.presign_ttl, Duration::from_secs(60));
        assert_eq!(config.credential_duration_secs, 900);
        assert_eq!(config.part_wait_timeout, Some(Duration::from_secs(900)));
        assert_eq!(
            config.listen_addr().expect("addr"),
            "0.0.0.0:8080".parse::<SocketAddr>().expect("literal")
        );
    }

    #[test]
    fn test_missing_bucket() {
        let err = GatewayConfig::from_lookup(lookup_from(&[(
            "ARTIFACTCACHE_ROLE_ARN",
            "arn:aws:iam::1:role/r",
        )]))
        .expect_err("bucket is required");
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "ARTIFACTCACHE_BUCKET".to_string()
            }
        );
    }

    #[test]
    fn test_port_prefers_port_var() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "9000"));
        pairs.push(("CACHEGATE_PORT", "9001"));
        let config = GatewayConfig::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_zero_wait_timeout_is_unbounded() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CACHEGATE_PART_WAIT_TIMEOUT_SECS", "0"));
        let config = GatewayConfig::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(config.part_wait_timeout, None);
    }

    #[test]
    fn test_invalid_number() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CACHEGATE_PORT", "eighty"));
        let err = GatewayConfig::from_lookup(lookup_from(&pairs)).expect_err("bad port");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "CACHEGATE_PORT"));
    }

    #[test]
    fn test_credential_duration_bounds() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CACHEGATE_CREDENTIAL_DURATION_SECS", "60"));
        assert!(GatewayConfig::from_lookup(lookup_from(&pairs)).is_err());
    }
}
