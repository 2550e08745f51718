//! Status counts for a finished analysis.

use serde::{Deserialize, Serialize};

use super::material::{AnalyzedMaterial, MarketStatus};

/// Per-status counts plus the items that need attention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub within_market: usize,
    pub above_market: usize,
    pub below_market: usize,
    pub research_needed: usize,

    /// Items whose status is anything but within market, in input order.
    pub flagged: Vec<AnalyzedMaterial>,
}

impl AnalysisSummary {
    /// Summarize a list of analyzed materials.
    pub fn from_items(items: &[AnalyzedMaterial]) -> Self {
        let mut summary = Self {
            total: items.len(),
            ..Default::default()
        };

        for item in items {
            match item.status {
                MarketStatus::WithinMarket => summary.within_market += 1,
                MarketStatus::AboveMarket => summary.above_market += 1,
                MarketStatus::BelowMarket => summary.below_market += 1,
                MarketStatus::ResearchNeeded => summary.research_needed += 1,
            }
            if item.status.is_flagged() {
                summary.flagged.push(item.clone());
            }
        }

        summary
    }

    /// Count for one status.
    pub fn count(&self, status: MarketStatus) -> usize {
        match status {
            MarketStatus::WithinMarket => self.within_market,
            MarketStatus::AboveMarket => self.above_market,
            MarketStatus::BelowMarket => self.below_market,
            MarketStatus::ResearchNeeded => self.research_needed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::material::MaterialId;

    fn item(material: &str, status: MarketStatus) -> AnalyzedMaterial {
        AnalyzedMaterial {
            id: MaterialId::new(),
            material: material.to_string(),
            quoted_price: Some(10.0),
            highest_price: None,
            lowest_price: None,
            percentage_variation: None,
            status,
            lowest_price_links: None,
        }
    }

    #[test]
    fn test_counts_and_flags() {
        let items = vec![
            item("Cimento", MarketStatus::WithinMarket),
            item("Areia", MarketStatus::AboveMarket),
            item("Tijolo", MarketStatus::WithinMarket),
            item("Bomba", MarketStatus::ResearchNeeded),
        ];

        let summary = AnalysisSummary::from_items(&items);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.count(MarketStatus::WithinMarket), 2);
        assert_eq!(summary.count(MarketStatus::AboveMarket), 1);
        assert_eq!(summary.count(MarketStatus::BelowMarket), 0);
        assert_eq!(summary.flagged.len(), 2);
        assert_eq!(summary.flagged[0].material, "Areia");
    }
}
