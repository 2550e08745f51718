//! Single-item quoting: find supplier links, then verify them.

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::call::{call_stage_json, RunContext};
use crate::pipeline::prompts;
use crate::traits::gateway::{AgentRequest, ModelGateway, ToolCapability};
use crate::types::config::PipelineConfig;
use crate::types::quote::{MaterialQuote, Quotation, RevisedQuote};
use crate::types::stage::Stage;

pub fn quote_request(
    description: &str,
    current_date: &str,
    min_links: usize,
    config: &PipelineConfig,
) -> AgentRequest {
    AgentRequest::new(Stage::Quoting, &config.model)
        .with_instruction(prompts::format_quote_prompt(min_links))
        .with_input(prompts::quote_input(description, current_date))
        .with_tool(ToolCapability::WebSearch)
}

pub fn revision_request(
    quote: &MaterialQuote,
    current_date: &str,
    config: &PipelineConfig,
) -> Result<AgentRequest> {
    let quote_json = serde_json::to_string_pretty(quote)?;

    Ok(AgentRequest::new(Stage::QuoteRevision, &config.model)
        .with_instruction(prompts::REVISION_PROMPT)
        .with_input(prompts::revision_input(&quote_json, current_date))
        .with_tool(ToolCapability::WebSearch))
}

/// Quote one material and aggregate the verified prices.
///
/// No verified price is not an error: both bounds come back `None`.
pub async fn quote_material<G>(
    gateway: &G,
    description: &str,
    current_date: &str,
    min_links: usize,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<Quotation>
where
    G: ModelGateway + ?Sized,
{
    if min_links < 1 {
        return Err(PipelineError::InvalidInput {
            reason: "min_links must be at least 1".to_string(),
        });
    }
    if description.trim().is_empty() {
        return Err(PipelineError::InvalidInput {
            reason: "material description is empty".to_string(),
        });
    }

    let request = quote_request(description, current_date, min_links, config);
    let mut quote: MaterialQuote = call_stage_json(gateway, &request, ctx).await?;

    if quote.material.trim().is_empty() {
        quote.material = description.trim().to_string();
    }

    if quote.links.len() < min_links {
        warn!(
            session_id = %ctx.session_id(),
            found = quote.links.len(),
            min_links,
            "Quoting returned fewer links than requested"
        );
    }

    let request = revision_request(&quote, current_date, config)?;
    let mut revised: RevisedQuote = call_stage_json(gateway, &request, ctx).await?;

    if revised.material.trim().is_empty() {
        revised.material = quote.material.clone();
    }

    let submitted = revised.research_results.len();
    let quotation = Quotation::from_revision(revised);

    info!(
        session_id = %ctx.session_id(),
        links = quote.links.len(),
        verified = quotation.research_results.len(),
        discarded = submitted - quotation.research_results.len(),
        "Quotation complete"
    );

    Ok(quotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::testing::MockGateway;

    fn ctx() -> RunContext {
        RunContext::new(Duration::from_secs(5), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_quote_then_revise_aggregates_prices() {
        let gateway = MockGateway::new()
            .with_response(
                Stage::Quoting,
                r#"{"material": "Cimento CP II 50kg", "links": ["https://a.com.br/1", "https://b.com.br/2"]}"#,
            )
            .with_response(
                Stage::QuoteRevision,
                r#"```json
{"material": "Cimento CP II 50kg", "research_results": [
    {"price": 38.9, "link": "https://a.com.br/1"},
    {"price": 32.5, "link": "https://b.com.br/2"}
]}
```"#,
            );

        let quotation = quote_material(
            &gateway,
            "Cimento CP II 50kg",
            "2026-10-18",
            2,
            &PipelineConfig::default(),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(quotation.highest_price, Some(38.9));
        assert_eq!(quotation.lowest_price, Some(32.5));

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].stage, Stage::Quoting);
        assert!(calls[1].input.contains("https://a.com.br/1"));
    }

    #[tokio::test]
    async fn test_no_verified_prices_is_not_an_error() {
        let gateway = MockGateway::new()
            .with_response(Stage::Quoting, r#"{"material": "Bomba", "links": []}"#)
            .with_response(
                Stage::QuoteRevision,
                r#"{"material": "Bomba", "research_results": []}"#,
            );

        let quotation = quote_material(
            &gateway,
            "Bomba",
            "2026-10-18",
            1,
            &PipelineConfig::default(),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(quotation.highest_price, None);
        assert_eq!(quotation.lowest_price, None);
        assert!(quotation.research_results.is_empty());
    }

    #[tokio::test]
    async fn test_bad_revision_entries_are_discarded() {
        let gateway = MockGateway::new()
            .with_response(
                Stage::Quoting,
                r#"{"links": ["https://a.com.br/1", "https://b.com.br/2", "https://c.com.br/3"]}"#,
            )
            .with_response(
                Stage::QuoteRevision,
                r#"{"research_results": [
    {"price": 41.0, "link": "https://a.com.br/1"},
    {"price": null, "link": "https://b.com.br/2"},
    {"price": "R$ 38,90", "link": "https://c.com.br/3"}
]}"#,
            );

        let quotation = quote_material(
            &gateway,
            "  Cimento CP II 50kg ",
            "2026-10-18",
            3,
            &PipelineConfig::default(),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(quotation.material, "Cimento CP II 50kg");
        assert_eq!(quotation.research_results.len(), 2);
        assert_eq!(quotation.highest_price, Some(41.0));
        assert_eq!(quotation.lowest_price, Some(38.9));
        assert!(gateway.calls()[1].input.contains("Cimento CP II 50kg"));
    }

    #[tokio::test]
    async fn test_zero_min_links_rejected() {
        let gateway = MockGateway::new();

        let err = quote_material(
            &gateway,
            "Cimento",
            "2026-10-18",
            0,
            &PipelineConfig::default(),
            &ctx(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput { .. }));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_quote_fails_with_stage() {
        let gateway = MockGateway::new().with_response(Stage::Quoting, "I found some links!");

        let err = quote_material(
            &gateway,
            "Cimento",
            "2026-10-18",
            1,
            &PipelineConfig::default(),
            &ctx(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Quoting));
        assert_eq!(err.raw_text(), Some("I found some links!"));
    }
}
