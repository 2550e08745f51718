//! Testing utilities including a mock gateway.
//!
//! Useful for testing applications that use the price-check library without
//! making real model calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayFailure;
use crate::traits::gateway::{AgentRequest, ModelGateway, ToolCapability};
use crate::types::{run::CorrelationId, stage::Stage};

type Handler = Arc<dyn Fn(&AgentRequest) -> Result<String, GatewayFailure> + Send + Sync>;

/// A mock gateway for testing.
///
/// Responses are scripted per stage. For each call the mock takes, in
/// order: the next queued response, the stage handler, the stage default.
/// A stage with none of these fails with an `Other` failure.
#[derive(Default)]
pub struct MockGateway {
    /// Queued responses by stage, consumed front to back
    queued: Arc<RwLock<HashMap<Stage, VecDeque<Result<String, GatewayFailure>>>>>,

    /// Computed responses by stage
    handlers: Arc<RwLock<HashMap<Stage, Handler>>>,

    /// Repeated responses by stage
    defaults: Arc<RwLock<HashMap<Stage, Result<String, GatewayFailure>>>>,

    /// Delay before every response
    delay: Option<Duration>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockGatewayCall>>>,
}

/// Record of a call made to the mock gateway.
#[derive(Debug, Clone)]
pub struct MockGatewayCall {
    pub stage: Stage,
    pub agent: &'static str,
    pub model: String,
    pub instruction: String,
    pub input: String,
    pub tools: Vec<ToolCapability>,
    pub session_id: String,
}

impl MockGateway {
    /// Create a new mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text response for a stage.
    pub fn with_response(self, stage: Stage, text: impl Into<String>) -> Self {
        self.enqueue(stage, Ok(text.into()));
        self
    }

    /// Queue a failure for a stage.
    pub fn with_failure(self, stage: Stage, failure: GatewayFailure) -> Self {
        self.enqueue(stage, Err(failure));
        self
    }

    /// Respond to a stage by computing from the request.
    pub fn with_handler<F>(self, stage: Stage, handler: F) -> Self
    where
        F: Fn(&AgentRequest) -> Result<String, GatewayFailure> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap()
            .insert(stage, Arc::new(handler));
        self
    }

    /// Response used for a stage whenever its queue is empty.
    pub fn with_default_response(self, stage: Stage, text: impl Into<String>) -> Self {
        self.defaults
            .write()
            .unwrap()
            .insert(stage, Ok(text.into()));
        self
    }

    /// Failure used for a stage whenever its queue is empty.
    pub fn with_default_failure(self, stage: Stage, failure: GatewayFailure) -> Self {
        self.defaults.write().unwrap().insert(stage, Err(failure));
        self
    }

    /// Wait before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockGatewayCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of calls made for a stage.
    pub fn calls_for(&self, stage: Stage) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.stage == stage)
            .count()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn enqueue(&self, stage: Stage, response: Result<String, GatewayFailure>) {
        self.queued
            .write()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(response);
    }

    fn next_response(&self, request: &AgentRequest) -> Result<String, GatewayFailure> {
        let stage = request.stage;

        if let Some(response) = self
            .queued
            .write()
            .unwrap()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        let handler = self.handlers.read().unwrap().get(&stage).cloned();
        if let Some(handler) = handler {
            return handler(request);
        }

        self.defaults
            .read()
            .unwrap()
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| {
                Err(GatewayFailure::other(format!(
                    "no scripted response for {stage}"
                )))
            })
    }
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure> {
        self.calls.write().unwrap().push(MockGatewayCall {
            stage: request.stage,
            agent: request.stage.agent_name(),
            model: request.model.clone(),
            instruction: request.instruction.clone(),
            input: request.input.clone(),
            tools: request.tools.clone(),
            session_id: correlation.session_id().to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_response(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_default() {
        let mock = MockGateway::new()
            .with_response(Stage::Validation, "first")
            .with_default_response(Stage::Validation, "again");
        let request = AgentRequest::new(Stage::Validation, "m");
        let correlation = CorrelationId::generate();

        assert_eq!(mock.invoke(&request, &correlation).await.unwrap(), "first");
        assert_eq!(mock.invoke(&request, &correlation).await.unwrap(), "again");
        assert_eq!(mock.invoke(&request, &correlation).await.unwrap(), "again");
        assert_eq!(mock.calls_for(Stage::Validation), 3);
    }

    #[tokio::test]
    async fn test_unscripted_stage_fails() {
        let mock = MockGateway::new();
        let request = AgentRequest::new(Stage::Extraction, "m");

        let failure = mock
            .invoke(&request, &CorrelationId::generate())
            .await
            .unwrap_err();

        assert!(!failure.is_overloaded());
        assert!(failure.message.contains("extraction"));
    }

    #[tokio::test]
    async fn test_records_session() {
        let mock = MockGateway::new().with_response(Stage::Quoting, "{}");
        let correlation = CorrelationId::generate();

        mock.invoke(&AgentRequest::new(Stage::Quoting, "m"), &correlation)
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].session_id, correlation.session_id());
        assert_eq!(calls[0].agent, "quoting_agent");
    }
}
