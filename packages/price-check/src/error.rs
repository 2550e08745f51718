//! Typed errors for the price-check pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! retryable upstream overload apart from every other fault.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::stage::Stage;

/// Classification of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upstream capacity error (HTTP 503/529, rate limiting). Worth retrying later.
    Overloaded,

    /// Anything else: bad request, auth, network, timeout.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overloaded => f.write_str("model overloaded"),
            Self::Other => f.write_str("model call failed"),
        }
    }
}

/// A failed model call, as normalized by a [`ModelGateway`](crate::ModelGateway).
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct GatewayFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl GatewayFailure {
    /// An upstream capacity failure.
    pub fn overloaded(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Overloaded,
            message: message.into(),
        }
    }

    /// Any other failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.kind == FailureKind::Overloaded
    }
}

/// Model output that could not be read as JSON.
///
/// Always carries the offending text so it can be surfaced for diagnosis.
#[derive(Debug, Clone, Error)]
#[error("failed to parse JSON from model response: {reason}")]
pub struct ParseError {
    pub raw_text: String,
    pub reason: String,
}

/// Errors surfaced by the pipeline stages and the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The model call behind a stage failed.
    #[error("{stage} failed: {failure}")]
    Gateway {
        stage: Stage,
        #[source]
        failure: GatewayFailure,
    },

    /// A stage received output that is not valid JSON or has the wrong shape.
    #[error("{stage} returned unparseable output: {source}")]
    Parse {
        stage: Stage,
        #[source]
        source: ParseError,
    },

    /// A stage produced blank output.
    #[error("{stage} returned no result")]
    EmptyResult { stage: Stage },

    /// The reconciliation loop hit its round cap with problems still reported.
    ///
    /// `last_parse_error` is set when the final round's output could not be
    /// read, so the offending text is not lost.
    #[error(
        "extraction did not reconcile after {rounds} rounds ({})",
        exhaustion_detail(missing, hallucinated, last_parse_error.as_ref())
    )]
    ReconciliationExhausted {
        rounds: usize,
        missing: Vec<String>,
        hallucinated: Vec<String>,
        last_parse_error: Option<ParseError>,
    },

    /// A stage's output is not a one-to-one mapping of its input.
    #[error(
        "{stage} output does not match its input (missing: {missing:?}, unexpected: {unexpected:?})"
    )]
    CorrespondenceMismatch {
        stage: Stage,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// The caller supplied input the pipeline cannot run on.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A stage payload could not be serialized for the model.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// The stage this error originated from, when it is stage-specific.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Gateway { stage, .. }
            | Self::Parse { stage, .. }
            | Self::EmptyResult { stage }
            | Self::CorrespondenceMismatch { stage, .. } => Some(*stage),
            Self::ReconciliationExhausted { .. } => Some(Stage::Validation),
            Self::InvalidInput { .. }
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Cancelled => None,
        }
    }

    /// Whether the failure is a transient upstream overload.
    ///
    /// The pipeline never retries these itself; the caller decides.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Gateway { failure, .. } if failure.is_overloaded())
    }

    /// The raw model text behind a parse failure, if any.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Parse { source, .. } => Some(&source.raw_text),
            Self::ReconciliationExhausted {
                last_parse_error: Some(source),
                ..
            } => Some(&source.raw_text),
            _ => None,
        }
    }
}

fn exhaustion_detail(
    missing: &[String],
    hallucinated: &[String],
    last_parse_error: Option<&ParseError>,
) -> String {
    let counts = format!(
        "{} missing, {} hallucinated still reported",
        missing.len(),
        hallucinated.len()
    );
    match last_parse_error {
        Some(e) if missing.is_empty() && hallucinated.is_empty() => {
            format!("last output unreadable: {}", e.reason)
        }
        Some(e) => format!("{counts}; last output unreadable: {}", e.reason),
        None => counts,
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
