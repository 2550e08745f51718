//! Prices as models write them.

use serde::{Deserialize, Serialize};

/// Models sometimes return prices as formatted strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

impl RawPrice {
    /// The price as a plain number, if it is a usable one.
    pub fn value(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_brl(s),
        }?;

        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

/// Parse a Brazilian currency string such as `R$ 5.120,00` or `5.795,00 R$`.
///
/// With both separators present the last one is the decimal mark. A lone
/// comma is a decimal mark. A lone dot followed by exactly three digits is a
/// thousands separator, unless the integer part is zero (`0.125`).
pub fn parse_brl(text: &str) -> Option<f64> {
    let cleaned: String = text
        .replace("R$", "")
        .replace("BRL", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty()
        || !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        (Some(dot), None) => {
            let dots = cleaned.matches('.').count();
            let decimals = cleaned.len() - dot - 1;
            let whole_is_zero = cleaned[..dot].chars().all(|c| c == '0');
            if dots > 1 || (decimals == 3 && !whole_is_zero) {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().ok()
}
