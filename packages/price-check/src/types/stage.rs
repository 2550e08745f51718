//! Pipeline stage identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One model-backed step of a pipeline flow.
///
/// Every gateway call is tagged with the stage that issued it so failures can
/// be reported against the step that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First-pass extraction of materials and unit prices.
    Extraction,
    /// Checks an extraction against the source text.
    Validation,
    /// Re-reads the source text for items the validator reported missing.
    FindMissing,
    /// Researches a market price range per material.
    MarketSearch,
    /// Extra search for materials whose range came back incomplete.
    SupplementarySearch,
    /// Single-item flow: gathers candidate supplier links.
    Quoting,
    /// Single-item flow: verifies links and reads their prices.
    QuoteRevision,
}

impl Stage {
    /// Agent name tagged on each request, stable across releases.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::Extraction => "extractor_agent",
            Self::Validation => "validate_extraction_agent",
            Self::FindMissing => "find_missing_items_agent",
            Self::MarketSearch => "search_agent",
            Self::SupplementarySearch => "supplementary_search_agent",
            Self::Quoting => "quoting_agent",
            Self::QuoteRevision => "quote_revision_agent",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Extraction => "extraction",
            Self::Validation => "validation",
            Self::FindMissing => "missing item search",
            Self::MarketSearch => "market search",
            Self::SupplementarySearch => "supplementary search",
            Self::Quoting => "quoting",
            Self::QuoteRevision => "quote revision",
        };
        f.write_str(label)
    }
}
