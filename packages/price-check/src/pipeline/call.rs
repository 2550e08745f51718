//! One model call on behalf of a stage.
//!
//! Every stage goes through [`call_stage`], which races the gateway against
//! the run's cancellation token and per-call timeout, then tags failures
//! with the stage that issued them.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{GatewayFailure, PipelineError, Result};
use crate::pipeline::response::parse_json_as;
use crate::traits::gateway::{AgentRequest, ModelGateway};
use crate::types::run::CorrelationId;

/// State shared by every call within one pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub correlation: CorrelationId,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

impl RunContext {
    /// Context with a fresh correlation pair.
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            correlation: CorrelationId::generate(),
            cancel,
            timeout,
        }
    }

    pub fn session_id(&self) -> &str {
        self.correlation.session_id()
    }
}

/// Invoke the gateway and return non-blank text.
///
/// `ctx.timeout` bounds the entire `invoke`, wrappers included.
pub async fn call_stage<G>(
    gateway: &G,
    request: &AgentRequest,
    ctx: &RunContext,
) -> Result<String>
where
    G: ModelGateway + ?Sized,
{
    let stage = request.stage;

    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    debug!(
        stage = %stage,
        agent = stage.agent_name(),
        session_id = %ctx.session_id(),
        input_len = request.input.len(),
        "Invoking model"
    );

    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
        result = tokio::time::timeout(
            ctx.timeout,
            gateway.invoke(request, &ctx.correlation),
        ) => result,
    };

    let text = match outcome {
        Ok(Ok(text)) => text,
        Ok(Err(failure)) => return Err(PipelineError::Gateway { stage, failure }),
        Err(_) => {
            return Err(PipelineError::Gateway {
                stage,
                failure: GatewayFailure::other(format!(
                    "timed out after {}s",
                    ctx.timeout.as_secs()
                )),
            })
        }
    };

    if text.trim().is_empty() {
        return Err(PipelineError::EmptyResult { stage });
    }

    Ok(text)
}

/// Invoke the gateway and parse its answer into `T`.
pub async fn call_stage_json<G, T>(
    gateway: &G,
    request: &AgentRequest,
    ctx: &RunContext,
) -> Result<T>
where
    G: ModelGateway + ?Sized,
    T: DeserializeOwned,
{
    let text = call_stage(gateway, request, ctx).await?;
    parse_json_as(&text).map_err(|source| PipelineError::Parse {
        stage: request.stage,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use crate::types::stage::Stage;

    fn ctx() -> RunContext {
        RunContext::new(Duration::from_secs(5), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_failure_is_tagged_with_stage() {
        let gateway =
            MockGateway::new().with_failure(Stage::MarketSearch, GatewayFailure::overloaded("503"));
        let request = AgentRequest::new(Stage::MarketSearch, "m");

        let err = call_stage(&gateway, &request, &ctx()).await.unwrap_err();

        assert!(err.is_overloaded());
        assert_eq!(err.stage(), Some(Stage::MarketSearch));
    }

    #[tokio::test]
    async fn test_blank_text_is_empty_result() {
        let gateway = MockGateway::new().with_response(Stage::Extraction, "  \n ");
        let request = AgentRequest::new(Stage::Extraction, "m");

        let err = call_stage(&gateway, &request, &ctx()).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::EmptyResult {
                stage: Stage::Extraction
            }
        ));
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_raw_text() {
        let gateway = MockGateway::new().with_response(Stage::Validation, "all good!");
        let request = AgentRequest::new(Stage::Validation, "m");

        let err = call_stage_json::<_, serde_json::Value>(&gateway, &request, &ctx())
            .await
            .unwrap_err();

        assert_eq!(err.raw_text(), Some("all good!"));
    }

    #[tokio::test]
    async fn test_timeout_is_other_failure() {
        let gateway = MockGateway::new()
            .with_response(Stage::Quoting, "{}")
            .with_delay(Duration::from_secs(10));
        let request = AgentRequest::new(Stage::Quoting, "m");
        let ctx = RunContext::new(Duration::from_millis(20), CancellationToken::new());

        let err = call_stage(&gateway, &request, &ctx).await.unwrap_err();

        match err {
            PipelineError::Gateway { failure, .. } => assert!(!failure.is_overloaded()),
            other => panic!("expected gateway failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let gateway = MockGateway::new();
        let request = AgentRequest::new(Stage::Quoting, "m");
        let ctx = ctx();
        ctx.cancel.cancel();

        let err = call_stage(&gateway, &request, &ctx).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(gateway.calls().is_empty());
    }
}
