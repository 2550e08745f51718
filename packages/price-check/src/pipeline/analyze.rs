//! Quoted price vs. market range classification.
//!
//! Classification is plain arithmetic. The only model call is one batched
//! supplementary search for items that came back without a full range.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::call::{call_stage_json, RunContext};
use crate::pipeline::prompts;
use crate::pipeline::search::{CandidateIndex, RawQuote};
use crate::traits::gateway::{AgentRequest, ModelGateway, ToolCapability};
use crate::types::config::PipelineConfig;
use crate::types::material::{AnalyzedMaterial, MarketStatus, MaterialId, QuotedMaterial};
use crate::types::stage::Stage;

#[derive(Serialize)]
struct SupplementaryEntry<'a> {
    id: MaterialId,
    material: &'a str,
}

/// Percentage of `quoted` above (positive) or below (negative) the range midpoint.
///
/// `None` when the midpoint is not positive. Rounded to two decimals.
pub fn percentage_variation(quoted: f64, highest: f64, lowest: f64) -> Option<f64> {
    let average = (highest + lowest) / 2.0;
    if average <= 0.0 {
        return None;
    }
    let variation = (quoted - average) / average * 100.0;
    Some((variation * 100.0).round() / 100.0)
}

/// Classify a quoted price against a researched range.
///
/// A price inside `[lowest, highest]` is within market. Outside it, the price
/// is only flagged once it passes `threshold` beyond the nearest bound.
pub fn classify(
    quoted: Option<f64>,
    highest: Option<f64>,
    lowest: Option<f64>,
    threshold: f64,
) -> (Option<f64>, MarketStatus) {
    let (Some(quoted), Some(highest), Some(lowest)) = (quoted, highest, lowest) else {
        return (None, MarketStatus::ResearchNeeded);
    };

    let variation = percentage_variation(quoted, highest, lowest);

    let status = if quoted > highest * (1.0 + threshold) {
        MarketStatus::AboveMarket
    } else if quoted < lowest * (1.0 - threshold) {
        MarketStatus::BelowMarket
    } else {
        MarketStatus::WithinMarket
    };

    (variation, status)
}

pub fn analyze_item(item: QuotedMaterial, threshold: f64) -> AnalyzedMaterial {
    let (percentage_variation, status) = classify(
        item.quoted_price,
        item.highest_price,
        item.lowest_price,
        threshold,
    );

    AnalyzedMaterial {
        id: item.id,
        material: item.material,
        quoted_price: item.quoted_price,
        highest_price: item.highest_price,
        lowest_price: item.lowest_price,
        percentage_variation,
        status,
        lowest_price_links: item.lowest_price_links,
    }
}

/// Fill whichever bounds and links `item` lacks from a supplementary answer.
fn fill_range(item: &mut QuotedMaterial, answer: &RawQuote, max_links: usize) {
    let (highest, lowest) = answer.range();
    item.highest_price = item.highest_price.or(highest);
    item.lowest_price = item.lowest_price.or(lowest);

    if let (Some(h), Some(l)) = (item.highest_price, item.lowest_price) {
        if l > h {
            item.highest_price = Some(l);
            item.lowest_price = Some(h);
        }
    }

    if item.lowest_price_links.is_none() {
        item.lowest_price_links = answer.links(max_links);
    }
}

fn supplementary_request(
    items: &[&QuotedMaterial],
    current_date: &str,
    config: &PipelineConfig,
) -> Result<AgentRequest> {
    let entries: Vec<SupplementaryEntry<'_>> = items
        .iter()
        .map(|q| SupplementaryEntry {
            id: q.id,
            material: &q.material,
        })
        .collect();
    let materials_json = serde_json::to_string_pretty(&entries)?;

    Ok(AgentRequest::new(Stage::SupplementarySearch, &config.model)
        .with_instruction(prompts::format_supplementary_search_prompt(
            config.domain,
            config.max_links,
        ))
        .with_input(prompts::search_input(&materials_json, current_date))
        .with_tool(ToolCapability::WebSearch))
}

/// Search once more for every item without a full range.
///
/// An unreadable answer leaves the items as they were; gateway failures
/// propagate.
async fn supplementary_search<G>(
    gateway: &G,
    quoted: &mut [QuotedMaterial],
    current_date: &str,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<()>
where
    G: ModelGateway + ?Sized,
{
    let positions: Vec<usize> = quoted
        .iter()
        .enumerate()
        .filter(|(_, q)| !q.has_range())
        .map(|(i, _)| i)
        .collect();

    if positions.is_empty() {
        return Ok(());
    }

    let unresolved: Vec<&QuotedMaterial> = positions.iter().map(|&i| &quoted[i]).collect();
    let request = supplementary_request(&unresolved, current_date, config)?;
    let index = CandidateIndex::new(unresolved.iter().map(|q| (q.id, q.material.as_str())));

    let answers: Vec<RawQuote> = match call_stage_json(gateway, &request, ctx).await {
        Ok(answers) => answers,
        Err(PipelineError::Parse { source, .. }) => {
            warn!(
                session_id = %ctx.session_id(),
                item_count = positions.len(),
                error = %source,
                raw_text = %source.raw_text,
                "Supplementary search output unreadable, leaving items unresolved"
            );
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for answer in &answers {
        match index.resolve(answer) {
            Some(slot) => fill_range(&mut quoted[positions[slot]], answer, config.max_links),
            None => debug!(
                material = ?answer.material,
                "Ignoring unrequested supplementary result"
            ),
        }
    }

    let resolved = positions.iter().filter(|&&i| quoted[i].has_range()).count();
    info!(
        session_id = %ctx.session_id(),
        requested = positions.len(),
        resolved,
        "Supplementary search complete"
    );

    Ok(())
}

/// Classify every researched item, re-searching incomplete ranges first.
pub async fn analyze_prices<G>(
    gateway: &G,
    mut quoted: Vec<QuotedMaterial>,
    current_date: &str,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<Vec<AnalyzedMaterial>>
where
    G: ModelGateway + ?Sized,
{
    if config.supplementary_search {
        supplementary_search(gateway, &mut quoted, current_date, config, ctx).await?;
    }

    let analyzed: Vec<AnalyzedMaterial> = quoted
        .into_iter()
        .map(|item| analyze_item(item, config.significance_threshold))
        .collect();

    let flagged = analyzed.iter().filter(|a| a.status.is_flagged()).count();
    info!(
        session_id = %ctx.session_id(),
        item_count = analyzed.len(),
        flagged,
        "Price analysis complete"
    );

    Ok(analyzed)
}
