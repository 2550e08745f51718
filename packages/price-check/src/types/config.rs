//! Configuration for the price-check pipeline.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Default cap on validate-repair rounds.
pub const MAX_ROUNDS: usize = 3;

/// Default cap on supporting links per material.
pub const MAX_LINKS: usize = 5;

/// What the extraction stage records when a document lists no price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPricePolicy {
    /// Record `null`. Analysis then reports the item as needing research.
    #[default]
    Null,

    /// Record `0`. Analysis then compares a zero price against the market.
    Zero,
}

impl MissingPricePolicy {
    /// Literal the extraction prompt asks the model to emit.
    pub fn prompt_literal(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Zero => "0",
        }
    }

    /// Apply the policy to a parsed price.
    pub fn apply(&self, price: Option<f64>) -> Option<f64> {
        match (self, price) {
            (_, Some(p)) => Some(p),
            (Self::Null, None) => None,
            (Self::Zero, None) => Some(0.0),
        }
    }
}

impl FromStr for MissingPricePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" | "none" => Ok(Self::Null),
            "zero" | "0" => Ok(Self::Zero),
            other => Err(format!("unknown missing price policy: {other}")),
        }
    }
}

/// Procurement domain the prompts are framed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialDomain {
    #[default]
    Construction,
    Hospital,
}

impl MaterialDomain {
    /// Plural noun phrase used in prompts.
    pub fn materials(&self) -> &'static str {
        match self {
            Self::Construction => "construction materials",
            Self::Hospital => "hospital materials",
        }
    }
}

impl FromStr for MaterialDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "construction" => Ok(Self::Construction),
            "hospital" => Ok(Self::Hospital),
            other => Err(format!("unknown material domain: {other}")),
        }
    }
}

/// Configuration for one [`PriceChecker`](crate::PriceChecker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model identifier passed through to the gateway on every call.
    pub model: String,

    /// Domain framing for all prompts.
    pub domain: MaterialDomain,

    /// Validate-repair rounds before giving up. Default: 3.
    pub max_rounds: usize,

    /// Null-vs-zero handling of missing prices. Default: null.
    pub missing_price_policy: MissingPricePolicy,

    /// Fraction beyond the nearest range bound that counts as a significant
    /// deviation. `0.15` means above `highest * 1.15` or below `lowest * 0.85`.
    pub significance_threshold: f64,

    /// Supporting links kept per material. Default: 5.
    pub max_links: usize,

    /// Run one extra search for materials with an incomplete range.
    pub supplementary_search: bool,

    /// Timeout for a single stage call, in seconds.
    ///
    /// Covers the whole gateway invocation, including any queueing and
    /// retry backoff done by wrapping gateways. Size it from
    /// [`RetryConfig::total_budget`](crate::RetryConfig::total_budget) when
    /// the gateway retries.
    pub call_timeout_secs: u64,

    /// Documents analyzed concurrently by [`analyze_many`](crate::PriceChecker::analyze_many).
    pub max_concurrent_runs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-search-preview".to_string(),
            domain: MaterialDomain::default(),
            max_rounds: MAX_ROUNDS,
            missing_price_policy: MissingPricePolicy::default(),
            significance_threshold: 0.15,
            max_links: MAX_LINKS,
            supplementary_search: true,
            call_timeout_secs: 180,
            max_concurrent_runs: 4,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the material domain.
    pub fn with_domain(mut self, domain: MaterialDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Set the reconciliation round cap.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Set the missing price policy.
    pub fn with_missing_price_policy(mut self, policy: MissingPricePolicy) -> Self {
        self.missing_price_policy = policy;
        self
    }

    /// Set the significance threshold.
    pub fn with_significance_threshold(mut self, threshold: f64) -> Self {
        self.significance_threshold = threshold;
        self
    }

    /// Enable or disable the supplementary search.
    pub fn with_supplementary_search(mut self, enabled: bool) -> Self {
        self.supplementary_search = enabled;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the concurrency cap for batch runs.
    pub fn with_max_concurrent_runs(mut self, runs: usize) -> Self {
        self.max_concurrent_runs = runs;
        self
    }

    /// Per-call timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let problem = if self.model.trim().is_empty() {
            Some("model must not be empty")
        } else if self.max_rounds == 0 {
            Some("max_rounds must be at least 1")
        } else if !self.significance_threshold.is_finite() || self.significance_threshold < 0.0 {
            Some("significance_threshold must be a non-negative number")
        } else if self.max_links == 0 {
            Some("max_links must be at least 1")
        } else if self.call_timeout_secs == 0 {
            Some("call_timeout_secs must be at least 1")
        } else if self.max_concurrent_runs == 0 {
            Some("max_concurrent_runs must be at least 1")
        } else {
            None
        };

        match problem {
            Some(reason) => Err(PipelineError::Config(reason.into())),
            None => Ok(()),
        }
    }
}
