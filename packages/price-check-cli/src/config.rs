use std::env;
use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use price_check::{GatewayConfig, RetryConfig};

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub retry: RetryConfig,
    pub max_in_flight: usize,
    pub requests_per_minute: Option<NonZeroU32>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let mut gateway = GatewayConfig::new(api_key);

        if let Ok(url) = env::var("OPENAI_BASE_URL") {
            gateway = gateway.with_base_url(url);
        }
        if let Ok(model) = env::var("PRICE_CHECK_MODEL") {
            gateway = gateway.with_default_model(model);
        }

        let timeout_secs: u64 = env::var("PRICE_CHECK_TIMEOUT_SECS")
            .unwrap_or_else(|_| "180".to_string())
            .parse()
            .context("PRICE_CHECK_TIMEOUT_SECS must be a valid number")?;
        gateway = gateway.with_timeout(Duration::from_secs(timeout_secs.max(1)));

        let max_retries: u32 = env::var("PRICE_CHECK_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("PRICE_CHECK_MAX_RETRIES must be a valid number")?;

        let max_in_flight: usize = env::var("PRICE_CHECK_MAX_IN_FLIGHT")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .context("PRICE_CHECK_MAX_IN_FLIGHT must be a valid number")?;

        let requests_per_minute = env::var("PRICE_CHECK_REQUESTS_PER_MINUTE")
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("PRICE_CHECK_REQUESTS_PER_MINUTE must be a valid number")?
            .and_then(NonZeroU32::new);

        Ok(Self {
            gateway,
            retry: RetryConfig::default().with_max_retries(max_retries),
            max_in_flight,
            requests_per_minute,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.gateway.timeout
    }

    pub fn default_model(&self) -> &str {
        &self.gateway.default_model
    }
}
