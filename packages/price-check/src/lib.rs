//! Procurement Price-Check Library
//!
//! Extracts quoted materials and unit prices from procurement document text,
//! reconciles the extraction against the source, researches market price
//! ranges, and classifies every quoted price against its range.
//!
//! # Design Philosophy
//!
//! - The model is a black box behind [`ModelGateway`]: prompt in, text or
//!   failure out
//! - Model output is never trusted for structure: JSON is recovered
//!   tolerantly and correspondences are checked in code
//! - Classification is arithmetic, not a model judgement
//! - Library handles mechanics, the caller decides on retries and display
//!
//! # Usage
//!
//! ```rust,ignore
//! use price_check::{AnalysisSummary, PriceChecker, PipelineConfig};
//! use price_check::testing::MockGateway;
//!
//! let checker = PriceChecker::with_config(MockGateway::new(), PipelineConfig::default());
//!
//! // Batch quote analysis
//! let items = checker.analyze_quote(&document_text, "2026-10-18").await?;
//! let summary = AnalysisSummary::from_items(&items);
//!
//! // Single-item quoting
//! let quotation = checker.quote_material("Cimento CP II 50kg", "2026-10-18", 3).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - The `ModelGateway` abstraction
//! - [`types`] - Materials, reports, quotations and configuration
//! - [`pipeline`] - Stages and the `PriceChecker` orchestrator
//! - [`gateways`] - Retry and rate-limit wrappers
//! - [`security`] - Credential handling
//! - [`testing`] - Mock gateway for tests

pub mod error;
pub mod gateways;
pub mod pipeline;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{FailureKind, GatewayFailure, ParseError, PipelineError, Result};
pub use traits::gateway::{AgentRequest, ModelGateway, ToolCapability};
pub use types::{
    config::{MaterialDomain, MissingPricePolicy, PipelineConfig, MAX_LINKS, MAX_ROUNDS},
    material::{
        normalize_material_name, AnalyzedMaterial, MarketStatus, MaterialCandidate, MaterialId,
        QuotedMaterial,
    },
    price::RawPrice,
    quote::{MaterialQuote, Quotation, RawResearchResult, ResearchResult, RevisedQuote},
    run::CorrelationId,
    stage::Stage,
    summary::AnalysisSummary,
    validation::ValidationReport,
};

// Re-export the orchestrator and stage entry points
pub use pipeline::{
    analyze_prices, classify, extract_candidates, match_quotes, merge_candidates, parse_brl,
    parse_json, parse_json_as, percentage_variation, quote_material, reconcile,
    remove_hallucinated, search_market_prices, PriceChecker, RunContext,
};

// Re-export gateway wrappers
pub use gateways::{LimitedGateway, RetryConfig, RetryingGateway};

pub use security::{GatewayConfig, SecretString};

#[cfg(feature = "openai")]
pub use ai::OpenAIGateway;

// Re-export for cancellation support
pub use tokio_util::sync::CancellationToken;
