//! Material records that flow through the batch pipeline.
//!
//! A material starts as a [`MaterialCandidate`] (extraction), becomes a
//! [`QuotedMaterial`] once a market range is researched, and ends as an
//! [`AnalyzedMaterial`] carrying a [`MarketStatus`]. The [`MaterialId`]
//! assigned at extraction is kept at every step.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable synthetic identifier for one material within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(Uuid);

impl MaterialId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse an id echoed back by a model. Returns `None` for anything malformed.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for MaterialId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Normalize a material name for identity comparisons.
///
/// Trims, collapses inner whitespace and case-folds.
pub fn normalize_material_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A material/price pair not yet validated against the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCandidate {
    pub id: MaterialId,

    /// Full descriptive name as it appears in the document.
    pub material: String,

    /// Unit price in BRL, `None` when the document states none.
    pub unit_price: Option<f64>,
}

impl MaterialCandidate {
    /// Create a candidate with a fresh id.
    pub fn new(material: impl Into<String>, unit_price: Option<f64>) -> Self {
        Self {
            id: MaterialId::new(),
            material: material.into(),
            unit_price,
        }
    }

    /// Name used for dedupe and hallucination matching.
    pub fn normalized_name(&self) -> String {
        normalize_material_name(&self.material)
    }
}

/// A candidate with its researched market range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedMaterial {
    pub id: MaterialId,
    pub material: String,
    pub quoted_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub lowest_price: Option<f64>,
    pub lowest_price_links: Option<Vec<String>>,
}

impl QuotedMaterial {
    /// A quoted material with no market data yet.
    pub fn unresearched(candidate: &MaterialCandidate) -> Self {
        Self {
            id: candidate.id,
            material: candidate.material.clone(),
            quoted_price: candidate.unit_price,
            highest_price: None,
            lowest_price: None,
            lowest_price_links: None,
        }
    }

    /// Both range bounds are known.
    pub fn has_range(&self) -> bool {
        self.highest_price.is_some() && self.lowest_price.is_some()
    }
}

/// Verdict on a quoted price relative to the market range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketStatus {
    #[serde(rename = "Within market")]
    WithinMarket,
    #[serde(rename = "Above market")]
    AboveMarket,
    #[serde(rename = "Below market")]
    BelowMarket,
    #[serde(rename = "Research needed")]
    ResearchNeeded,
}

impl MarketStatus {
    /// Display label, identical to the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WithinMarket => "Within market",
            Self::AboveMarket => "Above market",
            Self::BelowMarket => "Below market",
            Self::ResearchNeeded => "Research needed",
        }
    }

    /// Whether the item needs a human look.
    pub fn is_flagged(&self) -> bool {
        !matches!(self, Self::WithinMarket)
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal record of the batch flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedMaterial {
    pub id: MaterialId,
    pub material: String,
    pub quoted_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub lowest_price: Option<f64>,
    pub percentage_variation: Option<f64>,
    pub status: MarketStatus,
    pub lowest_price_links: Option<Vec<String>>,
}
