//! Shared application state.

use std::sync::Arc;

use depot_core::CatalogStore;
use depot_jobs::OperationTracker;
use depot_storage::Storage;

use crate::rate_limit::ClientRateLimiter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    /// Upstream metadata service (cached in production).
    pub catalog: Arc<dyn CatalogStore>,
    pub tracker: OperationTracker,
    /// Per-client rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<ClientRateLimiter>>,
}

impl AppState {
    pub fn new(
        storage: Arc<Storage>,
        catalog: Arc<dyn CatalogStore>,
        tracker: OperationTracker,
    ) -> Self {
        Self {
            storage,
            catalog,
            tracker,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Option<Arc<ClientRateLimiter>>) -> Self {
        self.rate_limiter = limiter;
        self
    }
}
