//! Concurrency- and rate-limited gateway wrapper.
//!
//! Bounds in-flight calls with a semaphore and, optionally, the request rate
//! with a governor quota. Shared across concurrent runs by wrapping it in an
//! `Arc`.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use tokio::sync::Semaphore;

use crate::error::GatewayFailure;
use crate::traits::gateway::{AgentRequest, ModelGateway};
use crate::types::run::CorrelationId;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A gateway wrapper that caps in-flight calls and request rate.
pub struct LimitedGateway<G: ModelGateway> {
    inner: G,
    permits: Arc<Semaphore>,
    limiter: Option<Arc<DefaultRateLimiter>>,
}

impl<G: ModelGateway> LimitedGateway<G> {
    /// Allow at most `max_in_flight` concurrent calls (minimum 1).
    pub fn new(inner: G, max_in_flight: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            limiter: None,
        }
    }

    /// Also limit calls per minute.
    pub fn with_requests_per_minute(self, requests_per_minute: NonZeroU32) -> Self {
        self.with_quota(Quota::per_minute(requests_per_minute))
    }

    /// Also limit calls with a custom quota.
    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(quota)));
        self
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<G: ModelGateway> ModelGateway for LimitedGateway<G> {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GatewayFailure::other(format!("gateway limiter closed: {e}")))?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        self.inner.invoke(request, correlation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::future::join_all;
    use nonzero_ext::nonzero;

    use crate::testing::MockGateway;
    use crate::types::stage::Stage;

    #[tokio::test]
    async fn test_passes_through() {
        let mock = MockGateway::new().with_response(Stage::Quoting, "{}");
        let gateway = LimitedGateway::new(mock, 2).with_requests_per_minute(nonzero!(600u32));

        let text = gateway
            .invoke(&AgentRequest::new(Stage::Quoting, "m"), &CorrelationId::generate())
            .await
            .unwrap();

        assert_eq!(text, "{}");
        assert_eq!(gateway.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_single_permit_serializes_calls() {
        let mock = MockGateway::new()
            .with_default_response(Stage::Quoting, "{}")
            .with_delay(Duration::from_millis(20));
        let gateway = LimitedGateway::new(mock, 1);
        let request = AgentRequest::new(Stage::Quoting, "m");
        let correlation = CorrelationId::generate();

        let started = tokio::time::Instant::now();
        let results = join_all((0..3).map(|_| gateway.invoke(&request, &correlation))).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_zero_permits_clamped() {
        let gateway = LimitedGateway::new(MockGateway::new(), 0);
        assert_eq!(gateway.available_permits(), 1);
    }
}
