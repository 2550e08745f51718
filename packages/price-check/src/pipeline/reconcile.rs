//! Validate-and-repair loop over extracted candidates.
//!
//! Each round asks the validator which materials are missing from or
//! invented in the extraction, removes the invented ones, asks the model to
//! find the missing ones, and merges them in. The loop stops at the first
//! clean report or fails once `max_rounds` rounds have run.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::call::{call_stage_json, RunContext};
use crate::pipeline::extract::{candidates_from_raw, RawCandidate};
use crate::pipeline::prompts;
use crate::traits::gateway::{AgentRequest, ModelGateway};
use crate::types::config::PipelineConfig;
use crate::types::material::{normalize_material_name, MaterialCandidate};
use crate::types::stage::Stage;
use crate::types::validation::ValidationReport;

/// The shape the validator sees: the extraction without ids.
#[derive(Serialize)]
struct ExtractedEntry<'a> {
    material: &'a str,
    unit_price: Option<f64>,
}

/// Merge newly found candidates into the list.
///
/// Keyed by normalized name; the first entry for a name wins and the order
/// of first appearance is kept.
pub fn merge_candidates(
    existing: Vec<MaterialCandidate>,
    found: Vec<MaterialCandidate>,
) -> Vec<MaterialCandidate> {
    let mut merged: IndexMap<String, MaterialCandidate> = IndexMap::new();

    for candidate in existing.into_iter().chain(found) {
        merged.entry(candidate.normalized_name()).or_insert(candidate);
    }

    merged.into_values().collect()
}

/// Drop candidates the validator flagged as hallucinated.
pub fn remove_hallucinated(
    candidates: Vec<MaterialCandidate>,
    hallucinated: &[String],
) -> Vec<MaterialCandidate> {
    if hallucinated.is_empty() {
        return candidates;
    }

    let flagged: HashSet<String> = hallucinated
        .iter()
        .map(|name| normalize_material_name(name))
        .collect();

    candidates
        .into_iter()
        .filter(|c| !flagged.contains(&c.normalized_name()))
        .collect()
}

fn validate_request(
    document: &str,
    candidates: &[MaterialCandidate],
    config: &PipelineConfig,
) -> Result<AgentRequest> {
    let entries: Vec<ExtractedEntry<'_>> = candidates
        .iter()
        .map(|c| ExtractedEntry {
            material: &c.material,
            unit_price: c.unit_price,
        })
        .collect();
    let extracted_json = serde_json::to_string_pretty(&entries)?;

    Ok(AgentRequest::new(Stage::Validation, &config.model)
        .with_instruction(prompts::VALIDATE_PROMPT)
        .with_input(prompts::validate_input(document, &extracted_json)))
}

fn find_missing_request(
    document: &str,
    missing: &[String],
    config: &PipelineConfig,
) -> Result<AgentRequest> {
    let missing_json = serde_json::to_string(missing)?;

    Ok(AgentRequest::new(Stage::FindMissing, &config.model)
        .with_instruction(prompts::format_find_missing_prompt(
            config.missing_price_policy,
        ))
        .with_input(prompts::find_missing_input(document, &missing_json)))
}

/// Run the reconciliation loop and return the clean candidate list.
pub async fn reconcile<G>(
    gateway: &G,
    document: &str,
    mut candidates: Vec<MaterialCandidate>,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<Vec<MaterialCandidate>>
where
    G: ModelGateway + ?Sized,
{
    let mut last_report = ValidationReport::default();
    let mut last_parse_error = None;

    for round in 1..=config.max_rounds {
        let request = validate_request(document, &candidates, config)?;
        let report: ValidationReport = match call_stage_json(gateway, &request, ctx).await {
            Ok(report) => report,
            Err(PipelineError::Parse { source, .. }) => {
                warn!(
                    session_id = %ctx.session_id(),
                    round,
                    error = %source,
                    raw_text = %source.raw_text,
                    "Validator output unreadable, retrying round"
                );
                last_parse_error = Some(source);
                continue;
            }
            Err(e) => return Err(e),
        };
        last_parse_error = None;

        if report.is_clean() {
            info!(
                session_id = %ctx.session_id(),
                round,
                item_count = candidates.len(),
                "Extraction reconciled"
            );
            return Ok(candidates);
        }

        debug!(
            session_id = %ctx.session_id(),
            round,
            missing = report.missing_items.len(),
            hallucinated = report.hallucinated_items.len(),
            "Validator reported problems"
        );

        let before = candidates.len();
        candidates = remove_hallucinated(candidates, &report.hallucinated_items);
        if candidates.len() < before {
            info!(
                session_id = %ctx.session_id(),
                round,
                removed = before - candidates.len(),
                "Removed hallucinated items"
            );
        }

        if !report.missing_items.is_empty() {
            let request = find_missing_request(document, &report.missing_items, config)?;
            match call_stage_json::<_, Vec<RawCandidate>>(gateway, &request, ctx).await {
                Ok(raw) => {
                    let found = candidates_from_raw(raw, config.missing_price_policy);
                    let before = candidates.len();
                    candidates = merge_candidates(candidates, found);
                    info!(
                        session_id = %ctx.session_id(),
                        round,
                        added = candidates.len() - before,
                        "Merged missing items"
                    );
                }
                Err(PipelineError::Parse { source, .. }) => {
                    warn!(
                        session_id = %ctx.session_id(),
                        round,
                        error = %source,
                        raw_text = %source.raw_text,
                        "Missing-item output unreadable, retrying round"
                    );
                    last_parse_error = Some(source);
                }
                Err(e) => return Err(e),
            }
        }

        last_report = report;
    }

    warn!(
        session_id = %ctx.session_id(),
        rounds = config.max_rounds,
        missing = last_report.missing_items.len(),
        hallucinated = last_report.hallucinated_items.len(),
        last_output_unreadable = last_parse_error.is_some(),
        "Reconciliation exhausted"
    );

    Err(PipelineError::ReconciliationExhausted {
        rounds: config.max_rounds,
        missing: last_report.missing_items,
        hallucinated: last_report.hallucinated_items,
        last_parse_error,
    })
}
