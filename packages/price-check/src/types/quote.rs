//! Types for the single-item quoting flow.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::price::RawPrice;

/// Output of the quoting stage: candidate supplier links for one material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialQuote {
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub links: Vec<String>,
}

/// One verified price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub price: f64,
    pub link: String,
}

impl ResearchResult {
    /// Finite non-negative price and an absolute http(s) link.
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price >= 0.0 && is_web_link(&self.link)
    }
}

/// A price observation as the revision stage wrote it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResearchResult {
    #[serde(default)]
    pub price: Option<RawPrice>,
    #[serde(default)]
    pub link: Option<String>,
}

impl RawResearchResult {
    /// The observation, if it has a readable price and a web link.
    pub fn usable(self) -> Option<ResearchResult> {
        let price = self.price.as_ref().and_then(RawPrice::value)?;
        let link = self.link?.trim().to_string();
        let result = ResearchResult { price, link };
        result.is_usable().then_some(result)
    }
}

/// Output of the revision stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisedQuote {
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub research_results: Vec<RawResearchResult>,
}

/// Final result of the quoting flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub material: String,
    pub highest_price: Option<f64>,
    pub lowest_price: Option<f64>,
    pub research_results: Vec<ResearchResult>,
}

impl Quotation {
    /// Aggregate a revision into `(max, min)` prices.
    ///
    /// Unusable observations are dropped first. No observations leaves both
    /// aggregates `None`; that is a valid outcome, not an error.
    pub fn from_revision(revised: RevisedQuote) -> Self {
        let research_results: Vec<ResearchResult> = revised
            .research_results
            .into_iter()
            .filter_map(RawResearchResult::usable)
            .collect();

        let highest_price = research_results
            .iter()
            .map(|r| r.price)
            .reduce(f64::max);
        let lowest_price = research_results
            .iter()
            .map(|r| r.price)
            .reduce(f64::min);

        Self {
            material: revised.material,
            highest_price,
            lowest_price,
            research_results,
        }
    }
}

/// Whether a string is an absolute http(s) URL with a host.
pub fn is_web_link(link: &str) -> bool {
    Url::parse(link.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
