//! Model gateway trait.
//!
//! The gateway abstracts the one capability the pipeline needs from a
//! language model: take an instruction plus an input and return text. Every
//! expected failure comes back as a [`GatewayFailure`] value; implementations
//! must not panic on upstream errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayFailure;
use crate::types::{run::CorrelationId, stage::Stage};

/// Tools a stage allows the model to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    /// Live web search for current prices and supplier pages.
    WebSearch,
}

/// A single model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    /// Stage issuing the call.
    pub stage: Stage,

    /// Model identifier, opaque to the pipeline.
    pub model: String,

    /// System-level instruction for the stage.
    pub instruction: String,

    /// User-level input (document text, JSON payload, description).
    pub input: String,

    /// Tools the model may use.
    pub tools: Vec<ToolCapability>,
}

impl AgentRequest {
    /// Create a request for a stage and model with empty prompts.
    pub fn new(stage: Stage, model: impl Into<String>) -> Self {
        Self {
            stage,
            model: model.into(),
            instruction: String::new(),
            input: String::new(),
            tools: Vec::new(),
        }
    }

    /// Set the instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Set the input.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Allow a tool.
    pub fn with_tool(mut self, tool: ToolCapability) -> Self {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
        self
    }

    /// Whether the model may search the web.
    pub fn allows_web_search(&self) -> bool {
        self.tools.contains(&ToolCapability::WebSearch)
    }
}

/// A text-generating, tool-augmented model.
///
/// `invoke` returns exactly one of text or failure. Each call is stateless:
/// conversation memory, if any, is keyed by `correlation` and discarded
/// before the call returns.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure>;
}

#[async_trait]
impl<G: ModelGateway + ?Sized> ModelGateway for Arc<G> {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure> {
        (**self).invoke(request, correlation).await
    }
}

#[async_trait]
impl<G: ModelGateway + ?Sized> ModelGateway for Box<G> {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure> {
        (**self).invoke(request, correlation).await
    }
}
