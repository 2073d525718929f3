//! Adapter for OpenAI-compatible APIs.
//!
//! Talks to any `/chat/completions` endpoint with bearer auth. Covers OpenAI,
//! Groq, DeepSeek, Mistral, and OpenRouter; they differ only in base URL and
//! catalog.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_core::config::schema::ProviderConfig;
use parley_core::types::{NormalizedRequest, NormalizedResponse, Role, Usage};

use crate::error::ProviderError;
use crate::http::{self, Endpoint};
use crate::registry::{estimate_cost, ProviderSpec};
use crate::traits::{ModelInfo, ProviderAdapter};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

/// Build the wire body. The system prompt becomes a leading `system` message.
fn build_body<'a>(model: &'a str, request: &'a NormalizedRequest) -> CompletionRequest<'a> {
    let options = request.options();
    let mut messages = Vec::with_capacity(request.messages().len() + 1);
    if let Some(system) = options.system_prompt.as_deref() {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(request.messages().iter().map(|m| WireMessage {
        role: role_name(m.role),
        content: &m.content,
    }));

    CompletionRequest {
        model,
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

// ─────────────────────────────────────────────
// OpenAiCompatAdapter
// ─────────────────────────────────────────────

/// Adapter for any OpenAI-compatible HTTP API.
pub struct OpenAiCompatAdapter {
    endpoint: Endpoint,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for OpenAiCompatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatAdapter")
            .field("api_base", &self.endpoint.api_base)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl OpenAiCompatAdapter {
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec) -> Self {
        OpenAiCompatAdapter {
            endpoint: Endpoint::new(config, spec),
            spec,
        }
    }

    fn completions_url(&self) -> String {
        self.endpoint.url("/chat/completions")
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
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
            .post(self.completions_url())
            .bearer_auth(credential)
            .headers(self.endpoint.extra_headers.clone())
            .json(&build_body(model, request))
            .send()
            .await
            .map_err(|e| http::transport(provider, e))?;

        let response = http::check_status(provider, response).await?;
        let body: CompletionResponse = http::decode(provider, response).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let choice = body.choices.into_iter().next().ok_or_else(|| ProviderError::Decode {
            provider: provider.to_string(),
            message: "response had no choices".to_string(),
        })?;
        let content = choice.message.content.unwrap_or_default();

        let usage = match body.usage {
            Some(u) => Usage::reported(u.prompt_tokens, u.completion_tokens, u.total_tokens),
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

    async fn test_connection(&self, credential: &str) -> bool {
        let result = self
            .endpoint
            .client
            .get(self.endpoint.url("/models"))
            .bearer_auth(credential)
            .headers(self.endpoint.extra_headers.clone())
            .send()
            .await;
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(provider = self.spec.name, error = %e, "Connection test failed");
                false
            }
        }
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

    fn adapter(name: &str, api_base: &str) -> OpenAiCompatAdapter {
        let config = ProviderConfig {
            api_base: Some(api_base.to_string()),
            extra_headers: None,
        };
        OpenAiCompatAdapter::new(&config, find_by_name(name).unwrap())
    }

    fn prompt(text: &str) -> NormalizedRequest {
        NormalizedRequest::from_prompt(text, RequestOptions::default())
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        let provider = adapter("openai", "https://api.openai.com/v1/");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_system_prompt_becomes_leading_message() {
        let request = NormalizedRequest::new(
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            RequestOptions {
                system_prompt: Some("Be terse.".into()),
                temperature: Some(0.2),
                max_tokens: None,
            },
        );
        let body = serde_json::to_value(build_body("gpt-4o", &request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be terse.");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(body["temperature"], 0.2);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_list_models_from_catalog() {
        let provider = adapter("deepseek", "http://unused");
        let ids: Vec<String> = provider.list_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["deepseek-chat", "deepseek-reasoner"]);
    }

    #[tokio::test]
    async fn test_send_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-test",
                "choices": [{
                    "message": { "content": "Hello from the mock." },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 10,
                    "completion_tokens": 5,
                    "total_tokens": 15
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = adapter("openai", &mock_server.uri());
        let resp = provider
            .send("gpt-4o", &prompt("Hello"), "test-key-123")
            .await
            .unwrap();

        assert_eq!(resp.content, "Hello from the mock.");
        assert_eq!(resp.provider, "openai");
        assert_eq!(resp.model, "gpt-4o");
        assert_eq!(resp.usage.total_tokens, 15);
        assert!(!resp.usage.estimated);
        assert!(resp.latency_ms.is_some());
        assert!(resp.estimated_cost.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_send_partial_usage_defaults_to_zero() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "ok" } }],
                "usage": { "completion_tokens": 3 }
            })))
            .mount(&mock_server)
            .await;

        let provider = adapter("groq", &mock_server.uri());
        let resp = provider
            .send("llama-3.3-70b-versatile", &prompt("x"), "gsk_abc")
            .await
            .unwrap();

        assert_eq!(resp.usage.prompt_tokens, 0);
        assert_eq!(resp.usage.completion_tokens, 3);
        assert_eq!(resp.usage.total_tokens, 3);
    }

    #[tokio::test]
    async fn test_send_missing_usage_is_estimated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "12345678" } }]
            })))
            .mount(&mock_server)
            .await;

        let provider = adapter("mistral", &mock_server.uri());
        let resp = provider
            .send("mistral-small-latest", &prompt("abcd"), "key")
            .await
            .unwrap();

        assert!(resp.usage.estimated);
        assert_eq!(resp.usage.prompt_tokens, 1);
        assert_eq!(resp.usage.completion_tokens, 2);
    }

    #[tokio::test]
    async fn test_send_api_error_uses_provider_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "message": "Rate limit exceeded",
                    "type": "rate_limit_error"
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = adapter("openai", &mock_server.uri());
        let err = provider
            .send("gpt-4o", &prompt("Hello"), "key")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_send_api_error_without_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = adapter("openai", &mock_server.uri());
        let err = provider
            .send("gpt-4o", &prompt("Hello"), "key")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("HTTP 503 Service Unavailable"));
    }

    #[tokio::test]
    async fn test_send_network_error() {
        // Point to a port that's not listening
        let provider = adapter("openai", "http://127.0.0.1:1");
        let err = provider
            .send("gpt-4o", &prompt("Hello"), "key")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_send_no_choices_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&mock_server)
            .await;

        let provider = adapter("openai", &mock_server.uri());
        let err = provider
            .send("gpt-4o", &prompt("Hello"), "key")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_connection_success_and_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("Authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let provider = adapter("openai", &mock_server.uri());
        assert!(provider.test_connection("good").await);
        assert!(!provider.test_connection("bad").await);

        let offline = adapter("openai", "http://127.0.0.1:1");
        assert!(!offline.test_connection("good").await);
    }
}
