//! Backoff wrapper for overloaded upstreams.
//!
//! Retries only `Overloaded` failures, with exponential delays capped at
//! `max_delay`. Every other failure is returned on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::GatewayFailure;
use crate::traits::gateway::{AgentRequest, ModelGateway};
use crate::types::run::CorrelationId;

/// Retry policy for overloaded calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Longest a wrapped call can take when every attempt runs to
    /// `attempt_timeout`: all attempts plus every backoff delay.
    pub fn total_budget(&self, attempt_timeout: Duration) -> Duration {
        let attempts = attempt_timeout.saturating_mul(self.max_retries.saturating_add(1));
        (1..=self.max_retries)
            .map(|retry| self.delay_for(retry))
            .fold(attempts, Duration::saturating_add)
    }
}

/// A gateway wrapper that backs off and retries on overload.
pub struct RetryingGateway<G: ModelGateway> {
    inner: G,
    config: RetryConfig,
}

impl<G: ModelGateway> RetryingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: G, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: ModelGateway> ModelGateway for RetryingGateway<G> {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure> {
        let mut retries = 0;

        loop {
            match self.inner.invoke(request, correlation).await {
                Ok(text) => return Ok(text),
                Err(failure) if failure.is_overloaded() && retries < self.config.max_retries => {
                    retries += 1;
                    let delay = self.config.delay_for(retries);
                    tracing::warn!(
                        stage = %request.stage,
                        error = %failure,
                        retry = retries,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Model overloaded, retrying..."
                    );
                    sleep(delay).await;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}
