//! First-pass extraction of material candidates from document text.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::call::{call_stage_json, RunContext};
use crate::pipeline::prompts;
use crate::traits::gateway::{AgentRequest, ModelGateway};
use crate::types::config::{MissingPricePolicy, PipelineConfig};
use crate::types::material::MaterialCandidate;
use crate::types::stage::Stage;

pub use crate::types::price::{parse_brl, RawPrice};

/// A candidate as the model wrote it, before cleanup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCandidate {
    #[serde(default, alias = "name", alias = "item")]
    pub material: Option<String>,

    #[serde(default, alias = "price", alias = "unit_value")]
    pub unit_price: Option<RawPrice>,
}

fn list_marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+\s*[.)\-:]\s+|[-*•·]\s+)").expect("list marker pattern is valid")
    })
}

/// Strip list numbering and bullets from a material name.
pub fn clean_material_name(name: &str) -> String {
    let stripped = list_marker_regex().replace(name, "");
    stripped.trim().to_string()
}

/// Turn raw model output into candidates with fresh ids.
///
/// Entries without a name are dropped. Prices that are absent, negative or
/// unreadable count as missing and follow `policy`.
pub fn candidates_from_raw(
    raw: Vec<RawCandidate>,
    policy: MissingPricePolicy,
) -> Vec<MaterialCandidate> {
    raw.into_iter()
        .filter_map(|entry| {
            let name = clean_material_name(entry.material.as_deref().unwrap_or_default());
            if name.is_empty() {
                return None;
            }
            let price = entry.unit_price.as_ref().and_then(RawPrice::value);
            Some(MaterialCandidate::new(name, policy.apply(price)))
        })
        .collect()
}

pub fn extract_request(document: &str, config: &PipelineConfig) -> AgentRequest {
    AgentRequest::new(Stage::Extraction, &config.model)
        .with_instruction(prompts::format_extract_prompt(
            config.domain,
            config.missing_price_policy,
        ))
        .with_input(prompts::extract_input(document))
}

/// Run the extraction stage on a document.
pub async fn extract_candidates<G>(
    gateway: &G,
    document: &str,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<Vec<MaterialCandidate>>
where
    G: ModelGateway + ?Sized,
{
    if document.trim().is_empty() {
        return Err(PipelineError::InvalidInput {
            reason: "document text is empty".to_string(),
        });
    }

    let request = extract_request(document, config);
    let raw: Vec<RawCandidate> = call_stage_json(gateway, &request, ctx).await?;
    let raw_count = raw.len();

    let candidates = candidates_from_raw(raw, config.missing_price_policy);

    if candidates.len() < raw_count {
        debug!(
            dropped = raw_count - candidates.len(),
            "Dropped extracted entries without a material name"
        );
    }

    info!(
        session_id = %ctx.session_id(),
        item_count = candidates.len(),
        "Extraction complete"
    );

    Ok(candidates)
}
