//! The PriceChecker - main entry point for the pipeline.
//!
//! Wires the stages into the two end-to-end flows:
//! - quote analysis: document text -> extraction -> reconciliation ->
//!   market search -> price analysis
//! - quoting: description -> supplier links -> verified prices
//!
//! Stages run sequentially within a run. Every run gets a fresh correlation
//! pair and shares no mutable state with other runs.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{field, info, instrument, Span};

use crate::error::Result;
use crate::pipeline::call::RunContext;
use crate::pipeline::{analyze, extract, quoting, reconcile, search};
use crate::traits::gateway::ModelGateway;
use crate::types::{
    config::PipelineConfig,
    material::{AnalyzedMaterial, MaterialCandidate, QuotedMaterial},
    quote::Quotation,
    summary::AnalysisSummary,
};

/// Runs procurement price checks against a model gateway.
///
/// # Example
///
/// ```rust,ignore
/// let checker = PriceChecker::new(gateway);
///
/// let items = checker.analyze_quote(&document_text, "2026-10-18").await?;
/// let summary = AnalysisSummary::from_items(&items);
///
/// let quotation = checker
///     .quote_material("Cimento Portland CP II 50kg", "2026-10-18", 3)
///     .await?;
/// ```
pub struct PriceChecker<G: ModelGateway> {
    gateway: G,
    config: PipelineConfig,
}

impl<G: ModelGateway> PriceChecker<G> {
    /// Create a checker with default configuration.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            config: PipelineConfig::default(),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(gateway: G, config: PipelineConfig) -> Self {
        Self { gateway, config }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// A fresh context for one run.
    pub fn run_context(&self, cancel: CancellationToken) -> RunContext {
        RunContext::new(self.config.call_timeout(), cancel)
    }

    // =========================================================================
    // Stage Primitives
    // =========================================================================

    /// STAGE: First-pass extraction.
    pub async fn extract(
        &self,
        document: &str,
        ctx: &RunContext,
    ) -> Result<Vec<MaterialCandidate>> {
        extract::extract_candidates(&self.gateway, document, &self.config, ctx).await
    }

    /// STAGE: Validate-and-repair loop.
    pub async fn reconcile(
        &self,
        document: &str,
        candidates: Vec<MaterialCandidate>,
        ctx: &RunContext,
    ) -> Result<Vec<MaterialCandidate>> {
        reconcile::reconcile(&self.gateway, document, candidates, &self.config, ctx).await
    }

    /// STAGE: Market price research.
    pub async fn search(
        &self,
        candidates: &[MaterialCandidate],
        current_date: &str,
        ctx: &RunContext,
    ) -> Result<Vec<QuotedMaterial>> {
        search::search_market_prices(&self.gateway, candidates, current_date, &self.config, ctx)
            .await
    }

    /// STAGE: Classification, with supplementary search for incomplete ranges.
    pub async fn analyze(
        &self,
        quoted: Vec<QuotedMaterial>,
        current_date: &str,
        ctx: &RunContext,
    ) -> Result<Vec<AnalyzedMaterial>> {
        analyze::analyze_prices(&self.gateway, quoted, current_date, &self.config, ctx).await
    }

    // =========================================================================
    // High-Level API
    // =========================================================================

    /// HIGH-LEVEL: Full quote analysis of one document.
    pub async fn analyze_quote(
        &self,
        document: &str,
        current_date: &str,
    ) -> Result<Vec<AnalyzedMaterial>> {
        self.analyze_quote_with_cancel(document, current_date, CancellationToken::new())
            .await
    }

    /// Quote analysis with cancellation support.
    ///
    /// Cancelling aborts the pending model call and returns
    /// [`PipelineError::Cancelled`](crate::PipelineError::Cancelled).
    #[instrument(
        skip(self, document, cancel),
        fields(document_len = document.len(), session_id = field::Empty)
    )]
    pub async fn analyze_quote_with_cancel(
        &self,
        document: &str,
        current_date: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<AnalyzedMaterial>> {
        self.config.validate()?;

        let ctx = self.run_context(cancel);
        Span::current().record("session_id", ctx.session_id());

        let candidates = self.extract(document, &ctx).await?;
        let candidates = self.reconcile(document, candidates, &ctx).await?;
        let quoted = self.search(&candidates, current_date, &ctx).await?;
        let analyzed = self.analyze(quoted, current_date, &ctx).await?;

        let summary = AnalysisSummary::from_items(&analyzed);
        info!(
            session_id = %ctx.session_id(),
            total = summary.total,
            within_market = summary.within_market,
            above_market = summary.above_market,
            below_market = summary.below_market,
            research_needed = summary.research_needed,
            "Quote analysis complete"
        );

        Ok(analyzed)
    }

    /// HIGH-LEVEL: Analyze several documents concurrently.
    ///
    /// At most `max_concurrent_runs` documents are in flight. Results come
    /// back in input order; one failed document does not affect the others.
    pub async fn analyze_many(
        &self,
        documents: &[String],
        current_date: &str,
    ) -> Vec<Result<Vec<AnalyzedMaterial>>> {
        stream::iter(documents)
            .map(|document| self.analyze_quote(document, current_date))
            .buffered(self.config.max_concurrent_runs.max(1))
            .collect()
            .await
    }

    /// HIGH-LEVEL: Quote a single material.
    pub async fn quote_material(
        &self,
        description: &str,
        current_date: &str,
        min_links: usize,
    ) -> Result<Quotation> {
        self.quote_material_with_cancel(
            description,
            current_date,
            min_links,
            CancellationToken::new(),
        )
        .await
    }

    /// Quoting with cancellation support.
    #[instrument(skip(self, cancel), fields(session_id = field::Empty))]
    pub async fn quote_material_with_cancel(
        &self,
        description: &str,
        current_date: &str,
        min_links: usize,
        cancel: CancellationToken,
    ) -> Result<Quotation> {
        self.config.validate()?;

        let ctx = self.run_context(cancel);
        Span::current().record("session_id", ctx.session_id());

        quoting::quote_material(
            &self.gateway,
            description,
            current_date,
            min_links,
            &self.config,
            &ctx,
        )
        .await
    }
}
