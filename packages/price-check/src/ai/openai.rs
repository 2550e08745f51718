//! OpenAI implementation of the ModelGateway trait.
//!
//! A reference implementation over the chat-completions endpoint. Stages that
//! allow web search are sent with `web_search_options`, which the
//! `*-search-preview` models require.
//!
//! # Example
//!
//! ```rust,ignore
//! use price_check::ai::OpenAIGateway;
//! use price_check::GatewayConfig;
//!
//! let gateway = OpenAIGateway::new(GatewayConfig::new(api_key))?;
//! let checker = PriceChecker::new(gateway);
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayFailure, PipelineError};
use crate::security::GatewayConfig;
use crate::traits::gateway::{AgentRequest, ModelGateway};
use crate::types::run::CorrelationId;

/// OpenAI-compatible chat-completions gateway.
#[derive(Clone)]
pub struct OpenAIGateway {
    client: Client,
    config: GatewayConfig,
}

impl OpenAIGateway {
    /// Create a gateway from explicit configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, PipelineError> {
        if config.api_key.is_empty() {
            return Err(PipelineError::Config("API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Config(Box::new(e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn build_request<'a>(
        &'a self,
        request: &'a AgentRequest,
        correlation: &'a CorrelationId,
    ) -> ChatRequest<'a> {
        let model = if request.model.is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let web_search = request.allows_web_search();

        ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.input,
                },
            ],
            // Search models reject sampling parameters.
            temperature: (!web_search).then_some(self.config.temperature),
            web_search_options: web_search.then(WebSearchOptions::default),
            user: correlation.user_id(),
            metadata: ChatMetadata {
                agent: request.stage.agent_name(),
                session_id: correlation.session_id(),
            },
        }
    }
}

/// Map an HTTP error response onto a gateway failure.
pub fn classify_failure(status: StatusCode, body: &str) -> GatewayFailure {
    let overloaded = matches!(status.as_u16(), 429 | 503 | 529)
        || body.contains("UNAVAILABLE")
        || body.to_lowercase().contains("overloaded");

    let message = format!("OpenAI API error {}: {}", status.as_u16(), body.trim());

    if overloaded {
        GatewayFailure::overloaded(message)
    } else {
        GatewayFailure::other(message)
    }
}

#[async_trait]
impl ModelGateway for OpenAIGateway {
    async fn invoke(
        &self,
        request: &AgentRequest,
        correlation: &CorrelationId,
    ) -> Result<String, GatewayFailure> {
        let body = self.build_request(request, correlation);

        debug!(
            stage = %request.stage,
            agent = body.metadata.agent,
            model = body.model,
            web_search = body.web_search_options.is_some(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayFailure::other(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayFailure::other(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| GatewayFailure::other("No response from OpenAI"))
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
    user: &'a str,
    metadata: ChatMetadata<'a>,
}

/// Tags that let calls be filtered per stage and run upstream.
#[derive(Serialize)]
struct ChatMetadata<'a> {
    agent: &'static str,
    session_id: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Default)]
struct WebSearchOptions {}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
