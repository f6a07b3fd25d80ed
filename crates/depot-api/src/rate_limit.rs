//! Per-client request-rate table.
//!
//! Clients are keyed by peer IP address. Requests without connection info
//! (in-process tests) share the unspecified address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use depot_core::{Error, Result};

use crate::config::RateLimitConfig;
use crate::state::AppState;

/// Rate limiter keyed by client IP.
pub type ClientRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Build the limiter, or `None` when rate limiting is disabled.
pub fn build_limiter(config: &RateLimitConfig) -> Result<Option<Arc<ClientRateLimiter>>> {
    if !config.enabled {
        return Ok(None);
    }
    let burst = u32::try_from(config.requests)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| Error::Config("RATE_LIMIT_REQUESTS must be between 1 and 2^32-1".into()))?;
    let quota = Quota::with_period(config.period / burst.get())
        .ok_or_else(|| Error::Config("RATE_LIMIT_PERIOD_SECS must be non-zero".into()))?
        .allow_burst(burst);
    Ok(Some(Arc::new(RateLimiter::keyed(quota))))
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let ip = client_ip(&request);
        if limiter.check_key(&ip).is_err() {
            warn!(client = %ip, "Rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

/// Periodically drop clients whose quota has fully replenished.
pub fn spawn_pruner(limiter: Arc<ClientRateLimiter>, every: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    limiter.retain_recent();
                    limiter.shrink_to_fit();
                    debug!(clients = limiter.len(), "Rate-limit table pruned");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_builds_nothing() {
        let config = RateLimitConfig::default().with_enabled(false);
        assert!(build_limiter(&config).unwrap().is_none());
    }

    #[test]
    fn test_zero_requests_is_config_error() {
        let config = RateLimitConfig::default().with_requests(0);
        assert!(matches!(build_limiter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_clients_are_limited_independently() {
        let config = RateLimitConfig::default()
            .with_requests(2)
            .with_period(Duration::from_secs(60));
        let limiter = build_limiter(&config).unwrap().unwrap();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
        assert_eq!(limiter.len(), 2);
    }
}
