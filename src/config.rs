use std::time::Duration;

use serde::Deserialize;

/// Seconds a resolved direct URL stays usable in the cache.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Upper bound on the size of a single relayed body chunk (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Seconds allowed for a resolver call or an upstream fetch to produce a response.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5000;

/// Top-level configuration for the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Resolution cache TTL in seconds.
    pub ttl_secs: u64,
    /// Maximum bytes per relayed chunk.
    pub chunk_size: usize,
    /// Timeout in seconds for resolver calls and upstream fetches.
    pub fetch_timeout_secs: u64,
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Extractor executable used to resolve direct media URLs.
    pub extractor_bin: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            extractor_bin: "yt-dlp".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Build a config from `TUNE_RELAY_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl_secs: env_parsed("TUNE_RELAY_CACHE_TTL", defaults.ttl_secs),
            chunk_size: env_parsed("TUNE_RELAY_CHUNK_SIZE", defaults.chunk_size),
            fetch_timeout_secs: env_parsed("TUNE_RELAY_FETCH_TIMEOUT", defaults.fetch_timeout_secs),
            host: env_string("TUNE_RELAY_HOST", defaults.host),
            port: env_parsed("TUNE_RELAY_PORT", defaults.port),
            extractor_bin: env_string("TUNE_RELAY_EXTRACTOR", defaults.extractor_bin),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default,
    }
}
