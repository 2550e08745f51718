//! Pull a JSON value out of free-text model output.
//!
//! Models are told to answer with bare JSON but regularly wrap it in a
//! markdown fence or add a sentence around it. Candidates are tried in order:
//! fenced blocks, the trimmed whole text, then the outermost bracketed span.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ParseError;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(.*?)```").expect("fence pattern is valid"))
}

/// Parse the JSON value embedded in a model response.
///
/// Fails with the raw text attached when no candidate is valid JSON.
pub fn parse_json(text: &str) -> Result<Value, ParseError> {
    let mut first_error: Option<String> = None;

    for candidate in candidates(text) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(ParseError {
        raw_text: text.to_string(),
        reason: first_error.unwrap_or_else(|| "response is empty".to_string()),
    })
}

/// Parse a model response straight into a typed value.
pub fn parse_json_as<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let value = parse_json(text)?;
    serde_json::from_value(value).map_err(|e| ParseError {
        raw_text: text.to_string(),
        reason: format!("unexpected JSON shape: {e}"),
    })
}

fn candidates(text: &str) -> Vec<&str> {
    let mut out = Vec::new();

    for captures in fence_regex().captures_iter(text) {
        if let Some(inner) = captures.get(1) {
            let inner = inner.as_str();
            let untagged = strip_language_tag(inner).trim();
            if !untagged.is_empty() {
                out.push(untagged);
            }
            let whole = inner.trim();
            if whole != untagged && !whole.is_empty() {
                out.push(whole);
            }
        }
    }

    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }

    if let Some(span) = bracketed_span(text) {
        out.push(span);
    }

    out
}

/// Drop a leading info string such as `json` or `JSON5` from a fence body.
fn strip_language_tag(inner: &str) -> &str {
    let start = inner.trim_start_matches([' ', '\t']);
    let tag_len = start
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(start.len());

    if tag_len == 0 || !start.as_bytes()[0].is_ascii_alphabetic() {
        return inner;
    }

    &start[tag_len..]
}

/// Outermost `[...]` or `{...}` span, opened by whichever bracket comes first.
fn bracketed_span(text: &str) -> Option<&str> {
    let open = text.find(['[', '{'])?;
    let close_char = if text.as_bytes()[open] == b'[' { ']' } else { '}' };
    let close = text.rfind(close_char)?;
    (close > open).then(|| &text[open..=close])
}
