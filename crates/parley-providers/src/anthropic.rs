//! Adapter for the Anthropic Messages API.
//!
//! Differences from the OpenAI dialect: `x-api-key` + `anthropic-version`
//! headers, the system prompt in a top-level `system` field, a required
//! `max_tokens`, and content returned as a list of typed blocks.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_core::config::schema::ProviderConfig;
use parley_core::types::{NormalizedRequest, NormalizedResponse, Role, Usage};

use crate::error::ProviderError;
use crate::http::{self, Endpoint};
use crate::registry::{estimate_cost, key_format_ok, ProviderSpec};
use crate::traits::{ModelInfo, ProviderAdapter};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

/// Build the wire body.
///
/// The system prompt and any in-conversation system messages are joined into
/// the top-level `system` field; only user/assistant turns go in `messages`.
fn build_body<'a>(model: &'a str, request: &'a NormalizedRequest) -> MessagesRequest<'a> {
    let options = request.options();

    let system_parts: Vec<&str> = options
        .system_prompt
        .as_deref()
        .into_iter()
        .chain(
            request
                .messages()
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str()),
        )
        .collect();
    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

    let messages = request
        .messages()
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            Some(WireMessage {
                role,
                content: &m.content,
            })
        })
        .collect();

    MessagesRequest {
        model,
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system,
        messages,
        temperature: options.temperature,
    }
}

// ─────────────────────────────────────────────
// AnthropicAdapter
// ─────────────────────────────────────────────

pub struct AnthropicAdapter {
    endpoint: Endpoint,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("api_base", &self.endpoint.api_base)
            .finish()
    }
}

impl AnthropicAdapter {
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec) -> Self {
        AnthropicAdapter {
            endpoint: Endpoint::new(config, spec),
            spec,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &str {
        self.spec.name
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }

    async fn send(
        &self,
        model: &str,
        request: &NormalizedRequest,
        credential: &str,
    ) -> Result<NormalizedResponse, ProviderError> {
        let provider = self.spec.name;
        debug!(
            provider = self.spec.display_name,
            model = %model,
            messages = request.messages().len(),
            "Calling LLM"
        );

        let started = Instant::now();
        let response = self
            .endpoint
            .client
            .post(self.endpoint.url("/v1/messages"))
            .header("x-api-key", credential)
            .header("anthropic-version", API_VERSION)
            .headers(self.endpoint.extra_headers.clone())
            .json(&build_body(model, request))
            .send()
            .await
            .map_err(|e| http::transport(provider, e))?;

        let response = http::check_status(provider, response).await?;
        let body: MessagesResponse = http::decode(provider, response).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let content: String = body
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        let usage = match body.usage {
            Some(u) => Usage::reported(u.input_tokens, u.output_tokens, None),
            None => Usage::estimate(request, &content),
        };

        debug!(
            provider = self.spec.display_name,
            model = %model,
            latency_ms,
            total_tokens = usage.total_tokens,
            "LLM response received"
        );

        Ok(NormalizedResponse {
            estimated_cost: estimate_cost(model, &usage),
            content,
            usage,
            provider: provider.to_string(),
            model: model.to_string(),
            latency_ms: Some(latency_ms),
            is_mock: None,
        })
    }

    /// Key format check only.
    async fn test_connection(&self, credential: &str) -> bool {
        key_format_ok(self.spec, credential)
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        self.spec.models.iter().map(ModelInfo::from).collect()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find_by_name;
    use parley_core::types::{ChatMessage, RequestOptions};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(api_base: &str) -> AnthropicAdapter {
        let config = ProviderConfig {
            api_base: Some(api_base.to_string()),
            extra_headers: None,
        };
        AnthropicAdapter::new(&config, find_by_name("anthropic").unwrap())
    }

    #[test]
    fn test_system_prompt_goes_to_field() {
        let request = NormalizedRequest::new(
            vec![
                ChatMessage::system("Inline rule."),
                ChatMessage::user("hi"),
            ],
            RequestOptions {
                system_prompt: Some("Be terse.".into()),
                ..Default::default()
            },
        );
        let body = serde_json::to_value(build_body("claude-3-5-haiku-20241022", &request)).unwrap();
        assert_eq!(body["system"], "Be terse.\n\nInline rule.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_no_system_field_when_absent() {
        let request = NormalizedRequest::from_prompt("hi", RequestOptions::default());
        let body = serde_json::to_value(build_body("claude-3-opus-20240229", &request)).unwrap();
        assert!(body.get("system").is_none());
    }

    #[tokio::test]
    async fn test_send_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-3-5-sonnet-20241022",
                "system": "Be terse."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Hello"},
                    {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                    {"type": "text", "text": " there"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 4}
            })))
            .mount(&mock_server)
            .await;

        let request = NormalizedRequest::from_prompt(
            "hi",
            RequestOptions {
                system_prompt: Some("Be terse.".into()),
                ..Default::default()
            },
        );
        let resp = adapter(&mock_server.uri())
            .send("claude-3-5-sonnet-20241022", &request, "sk-ant-test")
            .await
            .unwrap();

        assert_eq!(resp.content, "Hello there");
        assert_eq!(resp.provider, "anthropic");
        assert_eq!(resp.usage.prompt_tokens, 12);
        assert_eq!(resp.usage.completion_tokens, 4);
        assert_eq!(resp.usage.total_tokens, 16);
    }

    #[tokio::test]
    async fn test_send_error_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&mock_server)
            .await;

        let request = NormalizedRequest::from_prompt("hi", RequestOptions::default());
        let err = adapter(&mock_server.uri())
            .send("claude-3-5-haiku-20241022", &request, "sk-ant-bad")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_connection_is_format_check() {
        let provider = adapter("http://127.0.0.1:1");
        assert!(provider.test_connection("sk-ant-api03-xyz").await);
        assert!(!provider.test_connection("sk-proj-xyz").await);
        assert!(!provider.test_connection("").await);
    }
}
