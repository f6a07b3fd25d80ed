//! Server configuration assembled from the environment.

use std::time::Duration;

use depot_catalog::CatalogConfig;
use depot_core::defaults;
use depot_jobs::TrackerConfig;
use depot_storage::StorageConfig;

/// Per-client request-rate table settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per period and client.
    pub requests: u64,
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: defaults::RATE_LIMIT_REQUESTS,
            period: Duration::from_secs(defaults::RATE_LIMIT_PERIOD_SECS),
        }
    }
}

impl RateLimitConfig {
    /// Read `RATE_LIMIT_ENABLED`, `RATE_LIMIT_REQUESTS` and `RATE_LIMIT_PERIOD_SECS`.
    pub fn from_env() -> Self {
        let base = Self::default();

        let enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(base.enabled);

        let requests = std::env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(base.requests);

        let period = std::env::var("RATE_LIMIT_PERIOD_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(base.period);

        Self {
            enabled,
            requests,
            period,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_requests(mut self, requests: u64) -> Self {
        self.requests = requests;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub tracker: TrackerConfig,
    pub rate_limit: RateLimitConfig,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            storage: StorageConfig::default(),
            catalog: CatalogConfig::default(),
            tracker: TrackerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Listen address |
    /// | `PORT` | `3000` | Listen port |
    /// | `MAX_UPLOAD_BYTES` | 2 GiB | Request body limit |
    ///
    /// Storage, catalog, tracker and rate-limit sections read their own variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults::SERVER_PORT);
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::MAX_UPLOAD_BYTES);

        Self {
            host,
            port,
            storage: StorageConfig::from_env(),
            catalog: CatalogConfig::from_env(),
            tracker: TrackerConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            max_upload_bytes,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024 * 1024);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.requests, 100);
        assert_eq!(config.rate_limit.period, Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_builders() {
        let config = RateLimitConfig::default()
            .with_enabled(false)
            .with_requests(5)
            .with_period(Duration::from_secs(1));
        assert!(!config.enabled);
        assert_eq!(config.requests, 5);
        assert_eq!(config.period, Duration::from_secs(1));
    }
}
