//! Validator output for one reconciliation round.

use serde::{Deserialize, Serialize};

/// What the validator found wrong with an extraction.
///
/// Lives for a single reconciliation round only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Materials present in the document but absent from the extraction.
    #[serde(default)]
    pub missing_items: Vec<String>,

    /// Extracted materials with no support in the document.
    #[serde(default)]
    pub hallucinated_items: Vec<String>,
}

impl ValidationReport {
    /// Nothing missing and nothing hallucinated.
    pub fn is_clean(&self) -> bool {
        self.missing_items.is_empty() && self.hallucinated_items.is_empty()
    }
}
