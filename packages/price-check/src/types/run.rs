//! Per-run correlation identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Opaque `user-…` / `session-…` pair keying one pipeline run.
///
/// Any conversation state a gateway keeps is scoped to this pair and must not
/// outlive the call it was passed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId {
    user_id: String,
    session_id: String,
}

impl CorrelationId {
    /// Generate a fresh pair for a new run.
    pub fn generate() -> Self {
        Self {
            user_id: format!("user-{}", Uuid::new_v4()),
            session_id: format!("session-{}", Uuid::new_v4()),
        }
    }

    /// Build from caller-supplied parts.
    ///
    /// Both parts must be non-empty and free of whitespace.
    pub fn from_parts(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let user_id = user_id.into();
        let session_id = session_id.into();

        for (name, value) in [("user_id", &user_id), ("session_id", &session_id)] {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return Err(PipelineError::InvalidInput {
                    reason: format!("malformed correlation {name}: {value:?}"),
                });
            }
        }

        Ok(Self {
            user_id,
            session_id,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();

        assert!(a.user_id().starts_with("user-"));
        assert!(a.session_id().starts_with("session-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_parts_rejects_malformed() {
        assert!(CorrelationId::from_parts("user-1", "session-1").is_ok());
        assert!(CorrelationId::from_parts("", "session-1").is_err());
        assert!(CorrelationId::from_parts("user 1", "session-1").is_err());
    }
}
