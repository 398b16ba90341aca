use std::time::Duration;

use crate::constants::{MAX_REQUEST_TIMEOUT, MAX_TTL, MIN_MDNS_TTL, MIN_TTL};
use crate::error::ConfigError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResolverConfig {
    /// Lowest TTL written to the record store, in seconds
    pub min_ttl: u32,

    /// Lowest TTL for answers from multicast resolvers, in seconds
    pub min_mdns_ttl: u32,

    /// Highest TTL written to the record store, in seconds
    pub max_ttl: u32,

    /// Upper bound on waiting for an in-flight duplicate query
    pub max_request_timeout: Duration,

    /// Whether queries for test./example./invalid. domains are resolved
    pub allow_test_domains: bool,

    /// Whether queries for special-use service domains are resolved
    pub allow_special_domains: bool,

    /// Maximum number of record sets kept by the in-memory store
    pub max_cache_entries: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_ttl: MIN_TTL,
            min_mdns_ttl: MIN_MDNS_TTL,
            max_ttl: MAX_TTL,
            max_request_timeout: MAX_REQUEST_TIMEOUT,
            allow_test_domains: false,
            allow_special_domains: true,
            max_cache_entries: 10_000,
        }
    }
}

impl ResolverConfig {
    /// Create a ResolverConfig from environment variables.
    /// Returns Err if a set variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(min_ttl) = std::env::var("VORDR_MIN_TTL") {
            config.min_ttl = min_ttl
                .parse::<u32>()
                .map_err(|_| ConfigError::ParseError(format!("invalid min TTL: {}", min_ttl)))?;
        }

        if let Ok(max_ttl) = std::env::var("VORDR_MAX_TTL") {
            config.max_ttl = max_ttl
                .parse::<u32>()
                .map_err(|_| ConfigError::ParseError(format!("invalid max TTL: {}", max_ttl)))?;
        }

        if let Ok(timeout_str) = std::env::var("VORDR_MAX_REQUEST_TIMEOUT") {
            let timeout_secs = timeout_str
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(timeout_str.clone()))?;
            if timeout_secs == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "request timeout must be greater than 0".to_string(),
                ));
            }
            config.max_request_timeout = Duration::from_secs(timeout_secs);
        }

        if let Ok(allow_test) = std::env::var("VORDR_ALLOW_TEST_DOMAINS") {
            config.allow_test_domains = parse_bool(&allow_test, false);
        }

        if let Ok(allow_special) = std::env::var("VORDR_ALLOW_SPECIAL_DOMAINS") {
            config.allow_special_domains = parse_bool(&allow_special, true);
        }

        if let Ok(max_entries) = std::env::var("VORDR_MAX_CACHE_ENTRIES") {
            let size = max_entries
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidCacheSize(max_entries.clone()))?;
            if size == 0 {
                return Err(ConfigError::InvalidCacheSize(
                    "cache size must be greater than 0".to_string(),
                ));
            }
            config.max_cache_entries = size;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ttl > self.max_ttl {
            return Err(ConfigError::InvalidTtlBounds {
                min: self.min_ttl,
                max: self.max_ttl,
            });
        }
        if self.max_cache_entries == 0 {
            return Err(ConfigError::InvalidCacheSize(
                "cache size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
