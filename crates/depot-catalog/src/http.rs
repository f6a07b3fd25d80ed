//! reqwest client for the upstream item metadata service.
//!
//! Endpoints, relative to the configured base URL:
//! `GET {base}`, `GET {base}/{id}`, `GET {base}/static`,
//! `PUT {base}/static/update/{id}`.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info};

use depot_core::{BindingUpdate, CatalogStore, Error, Item, Result, StaticBinding};

use crate::config::CatalogConfig;

/// Metadata service client.
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Initializing catalog client: url={}", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&CatalogConfig::from_env())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Turn a non-success response into `UpstreamRejected`.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
        Err(Error::UpstreamRejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CatalogStore for HttpCatalog {
    async fn list_items(&self) -> Result<Vec<Item>> {
        let response = self.client.get(self.url("")).send().await?;
        let items: Vec<Item> = Self::check(response).await?.json().await?;
        debug!(count = items.len(), "Fetched catalog items");
        Ok(items)
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        let response = self
            .client
            .get(self.url(&format!("/{}", item_id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(response).await?.json().await?))
    }

    async fn list_bindings(&self) -> Result<Vec<StaticBinding>> {
        let response = self.client.get(self.url("/static")).send().await?;
        let bindings: Vec<StaticBinding> = Self::check(response).await?.json().await?;
        debug!(count = bindings.len(), "Fetched static bindings");
        Ok(bindings)
    }

    async fn upsert_binding(&self, item_id: i64, item_path: &str) -> Result<()> {
        let body = BindingUpdate {
            item_path: item_path.to_string(),
        };
        let response = self
            .client
            .put(self.url(&format!("/static/update/{}", item_id)))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        debug!(item_id, path = item_path, "Binding upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_url_building_trims_trailing_slash() {
        let config = CatalogConfig::default().with_base_url("http://catalog:5000/items/");
        let catalog = HttpCatalog::new(&config).unwrap();
        assert_eq!(catalog.url(""), "http://catalog:5000/items");
        assert_eq!(catalog.url("/static"), "http://catalog:5000/items/static");
        assert_eq!(
            catalog.url("/static/update/3"),
            "http://catalog:5000/items/static/update/3"
        );
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_upstream_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let config = CatalogConfig::default()
            .with_base_url("http://127.0.0.1:9/items")
            .with_timeout(Duration::from_secs(2));
        let catalog = HttpCatalog::new(&config).unwrap();

        let err = catalog.list_items().await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
