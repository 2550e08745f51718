//! Market price research for reconciled candidates.
//!
//! The model receives every candidate with its id and must answer with
//! exactly one entry per candidate. That correspondence is checked here
//! rather than trusted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::call::{call_stage_json, RunContext};
use crate::pipeline::extract::RawPrice;
use crate::pipeline::prompts;
use crate::traits::gateway::{AgentRequest, ModelGateway, ToolCapability};
use crate::types::config::PipelineConfig;
use crate::types::material::{
    normalize_material_name, MaterialCandidate, MaterialId, QuotedMaterial,
};
use crate::types::quote::is_web_link;
use crate::types::stage::Stage;

#[derive(Serialize)]
struct SearchEntry<'a> {
    id: MaterialId,
    material: &'a str,
    unit_price: Option<f64>,
}

/// A researched price range as the model wrote it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuote {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub material: Option<String>,

    #[serde(default)]
    pub highest_price: Option<RawPrice>,

    #[serde(default)]
    pub lowest_price: Option<RawPrice>,

    #[serde(default)]
    pub lowest_price_links: Option<Vec<String>>,
}

impl RawQuote {
    fn label(&self) -> String {
        self.material
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// `(highest, lowest)`, swapped if the model reversed them.
    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        let highest = self.highest_price.as_ref().and_then(RawPrice::value);
        let lowest = self.lowest_price.as_ref().and_then(RawPrice::value);
        match (highest, lowest) {
            (Some(h), Some(l)) if l > h => (Some(l), Some(h)),
            other => other,
        }
    }

    /// Web links only, capped at `max_links`; `None` when nothing usable remains.
    pub fn links(&self, max_links: usize) -> Option<Vec<String>> {
        let links: Vec<String> = self
            .lowest_price_links
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|link| link.trim())
            .filter(|link| is_web_link(link))
            .take(max_links)
            .map(str::to_string)
            .collect();

        (!links.is_empty()).then_some(links)
    }
}

/// Lookup from model answers back to input positions, by id then by name.
pub(crate) struct CandidateIndex {
    by_id: HashMap<MaterialId, usize>,
    by_name: HashMap<String, usize>,
}

impl CandidateIndex {
    pub(crate) fn new<'a>(items: impl IntoIterator<Item = (MaterialId, &'a str)>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();

        for (position, (id, name)) in items.into_iter().enumerate() {
            by_id.insert(id, position);
            by_name
                .entry(normalize_material_name(name))
                .or_insert(position);
        }

        Self { by_id, by_name }
    }

    pub(crate) fn resolve(&self, quote: &RawQuote) -> Option<usize> {
        let by_id = quote
            .id
            .as_deref()
            .and_then(MaterialId::parse)
            .and_then(|id| self.by_id.get(&id).copied());

        by_id.or_else(|| {
            quote.material.as_deref().and_then(|name| {
                self.by_name
                    .get(&normalize_material_name(name))
                    .copied()
            })
        })
    }
}

/// Pair each model answer with its candidate.
///
/// Fails unless every candidate is answered exactly once and nothing else is.
pub fn match_quotes(
    candidates: &[MaterialCandidate],
    raw: Vec<RawQuote>,
    max_links: usize,
) -> Result<Vec<QuotedMaterial>> {
    let index = CandidateIndex::new(candidates.iter().map(|c| (c.id, c.material.as_str())));
    let mut slots: Vec<Option<RawQuote>> = vec![None; candidates.len()];
    let mut unexpected = Vec::new();

    for quote in raw {
        match index.resolve(&quote) {
            Some(position) if slots[position].is_none() => slots[position] = Some(quote),
            _ => unexpected.push(quote.label()),
        }
    }

    let missing: Vec<String> = candidates
        .iter()
        .zip(&slots)
        .filter(|(_, slot)| slot.is_none())
        .map(|(c, _)| c.material.clone())
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(PipelineError::CorrespondenceMismatch {
            stage: Stage::MarketSearch,
            missing,
            unexpected,
        });
    }

    Ok(candidates
        .iter()
        .zip(slots)
        .filter_map(|(candidate, slot)| {
            let quote = slot?;
            let (highest_price, lowest_price) = quote.range();
            Some(QuotedMaterial {
                id: candidate.id,
                material: candidate.material.clone(),
                quoted_price: candidate.unit_price,
                highest_price,
                lowest_price,
                lowest_price_links: quote.links(max_links),
            })
        })
        .collect())
}

pub fn search_request(
    candidates: &[MaterialCandidate],
    current_date: &str,
    config: &PipelineConfig,
) -> Result<AgentRequest> {
    let entries: Vec<SearchEntry<'_>> = candidates
        .iter()
        .map(|c| SearchEntry {
            id: c.id,
            material: &c.material,
            unit_price: c.unit_price,
        })
        .collect();
    let materials_json = serde_json::to_string_pretty(&entries)?;

    Ok(AgentRequest::new(Stage::MarketSearch, &config.model)
        .with_instruction(prompts::format_search_prompt(config.domain, config.max_links))
        .with_input(prompts::search_input(&materials_json, current_date))
        .with_tool(ToolCapability::WebSearch))
}

/// Research a market price range for every candidate.
pub async fn search_market_prices<G>(
    gateway: &G,
    candidates: &[MaterialCandidate],
    current_date: &str,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<Vec<QuotedMaterial>>
where
    G: ModelGateway + ?Sized,
{
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let request = search_request(candidates, current_date, config)?;
    let raw: Vec<RawQuote> = call_stage_json(gateway, &request, ctx).await?;

    let quoted = match_quotes(candidates, raw, config.max_links).inspect_err(|e| {
        warn!(session_id = %ctx.session_id(), error = %e, "Market search answer rejected");
    })?;

    let with_range = quoted.iter().filter(|q| q.has_range()).count();
    info!(
        session_id = %ctx.session_id(),
        item_count = quoted.len(),
        with_range,
        "Market search complete"
    );

    Ok(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<MaterialCandidate> {
        vec![
            MaterialCandidate::new("Cimento Portland CP II E-32", Some(35.5)),
            MaterialCandidate::new("Areia média lavada", Some(140.0)),
            MaterialCandidate::new("Bomba de recalque", Some(19860.0)),
        ]
    }

    fn raw(id: Option<String>, material: &str, high: Option<f64>, low: Option<f64>) -> RawQuote {
        RawQuote {
            id,
            material: Some(material.to_string()),
            highest_price: high.map(RawPrice::Number),
            lowest_price: low.map(RawPrice::Number),
            lowest_price_links: None,
        }
    }

    #[test]
    fn test_three_item_bijection_by_id() {
        let candidates = candidates();
        // Answers out of order, with names reworded by the model.
        let answers = vec![
            raw(Some(candidates[2].id.to_string()), "Bomba recalque 1cv", None, None),
            raw(Some(candidates[0].id.to_string()), "Cimento CP II", Some(70.0), Some(30.0)),
            raw(Some(candidates[1].id.to_string()), "Areia", Some(70.0), Some(62.0)),
        ];

        let quoted = match_quotes(&candidates, answers, 5).unwrap();

        assert_eq!(quoted.len(), 3);
        for (q, c) in quoted.iter().zip(&candidates) {
            assert_eq!(q.id, c.id);
            assert_eq!(q.material, c.material);
            assert_eq!(q.quoted_price, c.unit_price);
        }
        assert_eq!(quoted[0].highest_price, Some(70.0));
        assert!(!quoted[2].has_range());
    }

    #[test]
    fn test_name_fallback_when_id_missing() {
        let candidates = candidates();
        let answers = vec![
            raw(None, "cimento portland cp ii e-32", Some(70.0), Some(30.0)),
            raw(None, "AREIA MÉDIA LAVADA", None, None),
            raw(Some("not-an-id".to_string()), "Bomba de recalque", None, None),
        ];

        let quoted = match_quotes(&candidates, answers, 5).unwrap();

        assert_eq!(quoted.len(), 3);
    }

    #[test]
    fn test_dropped_and_invented_items_are_rejected() {
        let candidates = candidates();
        let answers = vec![
            raw(Some(candidates[0].id.to_string()), "Cimento", Some(70.0), Some(30.0)),
            raw(Some(candidates[1].id.to_string()), "Areia", None, None),
            raw(None, "Piscina olímpica", None, None),
        ];

        let err = match_quotes(&candidates, answers, 5).unwrap_err();

        match err {
            PipelineError::CorrespondenceMismatch {
                stage,
                missing,
                unexpected,
            } => {
                assert_eq!(stage, Stage::MarketSearch);
                assert_eq!(missing, vec!["Bomba de recalque".to_string()]);
                assert_eq!(unexpected, vec!["Piscina olímpica".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_answer_is_unexpected() {
        let candidates = candidates();
        let id = candidates[0].id.to_string();
        let answers = vec![
            raw(Some(id.clone()), "Cimento", None, None),
            raw(Some(id), "Cimento de novo", None, None),
            raw(Some(candidates[1].id.to_string()), "Areia", None, None),
            raw(Some(candidates[2].id.to_string()), "Bomba", None, None),
        ];

        assert!(match_quotes(&candidates, answers, 5).is_err());
    }

    #[test]
    fn test_links_are_filtered_and_capped() {
        let quote = RawQuote {
            lowest_price_links: Some(
                (0..8)
                    .map(|i| format!("https://loja{i}.com.br/p"))
                    .chain(["link1".to_string()])
                    .collect(),
            ),
            ..Default::default()
        };

        let links = quote.links(5).unwrap();
        assert_eq!(links.len(), 5);
        assert!(links.iter().all(|l| l.starts_with("https://")));

        let empty = RawQuote {
            lowest_price_links: Some(vec!["n/a".to_string()]),
            ..Default::default()
        };
        assert_eq!(empty.links(5), None);
    }

    #[test]
    fn test_reversed_range_is_swapped() {
        let quote = raw(None, "x", Some(30.0), Some(70.0));
        assert_eq!(quote.range(), (Some(70.0), Some(30.0)));
    }
}
