//! Adapter for the Google Gemini `generateContent` API.
//!
//! The key travels as the `key` query parameter, assistant turns use the role
//! `model`, and the system prompt goes in `systemInstruction`.

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

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
    }
}

fn build_body(request: &NormalizedRequest) -> GenerateRequest {
    let options = request.options();

    let mut system_parts: Vec<Part> = options
        .system_prompt
        .as_deref()
        .map(text_part)
        .into_iter()
        .collect();
    let mut contents = Vec::with_capacity(request.messages().len());
    for message in request.messages() {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
            Role::System => {
                system_parts.push(text_part(&message.content));
                continue;
            }
        };
        contents.push(Content {
            role,
            parts: vec![text_part(&message.content)],
        });
    }

    GenerateRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then_some(SystemInstruction {
            parts: system_parts,
        }),
        generation_config: GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
        },
    }
}

// ─────────────────────────────────────────────
// GeminiAdapter
// ─────────────────────────────────────────────

pub struct GeminiAdapter {
    endpoint: Endpoint,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("api_base", &self.endpoint.api_base)
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec) -> Self {
        GeminiAdapter {
            endpoint: Endpoint::new(config, spec),
            spec,
        }
    }

    fn generate_url(&self, model: &str) -> String {
        self.endpoint.url(&format!("/v1beta/models/{}:generateContent", model))
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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
            .post(self.generate_url(model))
            .query(&[("key", credential)])
            .headers(self.endpoint.extra_headers.clone())
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| http::transport(provider, e.without_url()))?;

        let response = http::check_status(provider, response).await?;
        let body: GenerateResponse = http::decode(provider, response).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let candidate = body.candidates.into_iter().next().ok_or_else(|| ProviderError::Decode {
            provider: provider.to_string(),
            message: "response had no candidates".to_string(),
        })?;
        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let usage = match body.usage_metadata {
            Some(u) => Usage::reported(
                u.prompt_token_count,
                u.candidates_token_count,
                u.total_token_count,
            ),
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
            .get(self.endpoint.url("/v1beta/models"))
            .query(&[("key", credential), ("pageSize", "1")])
            .send()
            .await;
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(provider = self.spec.name, error = %e.without_url(), "Connection test failed");
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
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(api_base: &str) -> GeminiAdapter {
        let config = ProviderConfig {
            api_base: Some(api_base.to_string()),
            extra_headers: None,
        };
        GeminiAdapter::new(&config, find_by_name("gemini").unwrap())
    }

    #[test]
    fn test_body_roles_and_system_instruction() {
        let request = NormalizedRequest::new(
            vec![
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
                ChatMessage::user("q2"),
            ],
            RequestOptions {
                system_prompt: Some("Be terse.".into()),
                temperature: Some(0.3),
                max_tokens: Some(256),
            },
        );
        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["generationConfig"]["temperature"], 0.3);
    }

    #[tokio::test]
    async fn test_send_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "AIza-test"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 3,
                    "candidatesTokenCount": 2,
                    "totalTokenCount": 5
                }
            })))
            .mount(&mock_server)
            .await;

        let request = NormalizedRequest::from_prompt("hi", RequestOptions::default());
        let resp = adapter(&mock_server.uri())
            .send("gemini-1.5-flash", &request, "AIza-test")
            .await
            .unwrap();

        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.provider, "gemini");
        assert_eq!(resp.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_send_missing_total_is_derived() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}],
                "usageMetadata": {"promptTokenCount": 7}
            })))
            .mount(&mock_server)
            .await;

        let request = NormalizedRequest::from_prompt("hi", RequestOptions::default());
        let resp = adapter(&mock_server.uri())
            .send("gemini-1.5-pro", &request, "AIza-test")
            .await
            .unwrap();

        assert_eq!(resp.usage.prompt_tokens, 7);
        assert_eq!(resp.usage.completion_tokens, 0);
        assert_eq!(resp.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_send_error_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&mock_server)
            .await;

        let request = NormalizedRequest::from_prompt("hi", RequestOptions::default());
        let err = adapter(&mock_server.uri())
            .send("gemini-1.5-pro", &request, "AIza-bad")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("API key not valid."));
        assert!(!err.to_string().contains("AIza-bad"));
    }

    #[tokio::test]
    async fn test_connection_lists_models() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(query_param("key", "AIza-good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let provider = adapter(&mock_server.uri());
        assert!(provider.test_connection("AIza-good").await);
        assert!(!provider.test_connection("AIza-bad").await);
    }
}
