//! Shared middleware chain applied identically by every adapter:
//! `validate-envelope -> authenticate -> rate-limit -> log -> dispatch`.
//! Grounded in `governor`'s keyed rate limiter (the crate the pack's
//! `acton-service` gates behind its own `governor` feature) plus the
//! teacher's `tracing`-based request logging idiom.

use crate::auth::{AuthGate, Credentials, Principal};
use crate::error::ErrorKind;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-principal token bucket, `maxRequestsPerMinute` burst.
pub struct RateLimiterRegistry {
    max_per_minute: u32,
    buckets: Mutex<HashMap<String, Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>>,
}

impl RateLimiterRegistry {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, principal_key: &str) -> Result<(), ErrorKind> {
        let mut buckets = self.buckets.lock().await;
        let limiter = buckets.entry(principal_key.to_string()).or_insert_with(|| {
            let quota = Quota::per_minute(
                NonZeroU32::new(self.max_per_minute).unwrap_or(NonZeroU32::new(60).unwrap()),
            );
            Arc::new(RateLimiter::direct(quota))
        });
        limiter.check().map_err(|_| ErrorKind::RateLimited)
    }
}

/// Runs `validate-envelope -> authenticate -> rate-limit -> log` and hands
/// back the resolved `Principal`, ready for the adapter to dispatch.
pub async fn authenticate_and_throttle(
    auth: &dyn AuthGate,
    limiter: &RateLimiterRegistry,
    path: &str,
    credentials: Option<Credentials>,
    meta: crate::auth::TransportMetadata,
) -> Result<Option<Principal>, ErrorKind> {
    if auth.is_public_path(path) {
        return Ok(None);
    }
    let credentials = credentials.ok_or(ErrorKind::Unauthenticated)?;
    let protocol = meta.protocol;
    let principal = auth.authenticate(credentials, meta).await?;
    limiter.check(&principal.user_id).await?;
    tracing::info!(user_id = %principal.user_id, protocol, path, "request authenticated");
    Ok(Some(principal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_rejects_after_burst_exhausted() {
        let registry = RateLimiterRegistry::new(1);
        assert!(registry.check("p1").await.is_ok());
        assert!(registry.check("p1").await.is_err());
    }

    #[tokio::test]
    async fn rate_limiter_tracks_principals_independently() {
        let registry = RateLimiterRegistry::new(1);
        assert!(registry.check("p1").await.is_ok());
        assert!(registry.check("p2").await.is_ok());
    }
}
