//! Catalog client configuration.

use std::time::Duration;

use depot_core::defaults;

/// Where the metadata service lives and how its answers are cached.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the items resource, e.g. `http://localhost:5000/items`.
    pub base_url: String,
    /// Public view-path prefix prepended to binding paths.
    pub view_prefix: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::CATALOG_URL.to_string(),
            view_prefix: defaults::FILE_VIEW_PREFIX.to_string(),
            timeout: Duration::from_secs(defaults::CATALOG_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(defaults::CATALOG_CACHE_TTL_SECS),
        }
    }
}

impl CatalogConfig {
    /// Read `CATALOG_URL`, `FILE_VIEW_PREFIX`, `CATALOG_TIMEOUT_SECS` and
    /// `CATALOG_CACHE_TTL_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var("CATALOG_URL").unwrap_or(base.base_url),
            view_prefix: std::env::var("FILE_VIEW_PREFIX").unwrap_or(base.view_prefix),
            timeout: std::env::var("CATALOG_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(base.timeout),
            cache_ttl: std::env::var("CATALOG_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(base.cache_ttl),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_view_prefix(mut self, view_prefix: impl Into<String>) -> Self {
        self.view_prefix = view_prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000/items");
        assert_eq!(config.view_prefix, "http://localhost:3000/files/view/");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let config = CatalogConfig::default()
            .with_base_url("http://catalog:8080/items")
            .with_cache_ttl(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://catalog:8080/items");
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
    }
}
