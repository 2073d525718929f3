//! HTTP plumbing shared by every adapter: client, headers, status handling.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use parley_core::config::schema::ProviderConfig;

use crate::error::ProviderError;
use crate::registry::ProviderSpec;

/// Connection settings resolved from config + registry defaults.
#[derive(Clone)]
pub(crate) struct Endpoint {
    pub client: reqwest::Client,
    pub api_base: String,
    pub extra_headers: HeaderMap,
}

impl Endpoint {
    pub fn new(config: &ProviderConfig, spec: &ProviderSpec) -> Self {
        // Resolve API base: config > spec default
        let api_base = config
            .api_base
            .as_deref()
            .unwrap_or(spec.default_api_base)
            .trim_end_matches('/')
            .to_string();

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!(provider = spec.name, header = %key, "Invalid extra header, skipping");
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Endpoint {
            client,
            api_base,
            extra_headers,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

/// Turn a non-success status into [`ProviderError::Http`], passing success through.
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or_else(|| {
        format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("error")
        )
    });
    error!(provider, status = %status, message = %message, "API error");

    Err(ProviderError::Http {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    })
}

/// Decode a JSON body into the provider's wire type.
pub(crate) async fn decode<T: DeserializeOwned>(
    provider: &str,
    response: Response,
) -> Result<T, ProviderError> {
    let text = response.text().await.map_err(|e| ProviderError::Decode {
        provider: provider.to_string(),
        message: e.without_url().to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| {
        error!(provider, error = %e, "Failed to parse response");
        ProviderError::Decode {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    })
}

pub(crate) fn transport(provider: &str, source: reqwest::Error) -> ProviderError {
    error!(provider, error = %source, "HTTP request failed");
    ProviderError::Transport {
        provider: provider.to_string(),
        source,
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"error": {"message": ...}}` (OpenAI, Anthropic, Gemini),
/// `{"error": "..."}` and `{"message": ...}`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value
        .pointer("/error/message")
        .or_else(|| value.get("error").filter(|e| e.is_string()))
        .or_else(|| value.get("message"))?
        .as_str()?
        .trim();
    (!message.is_empty()).then(|| message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_extract_nested_message() {
        let body = r#"{"error": {"message": "Rate limit exceeded", "type": "rate_limit_error"}}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("Rate limit exceeded"));
    }

    #[test]
    fn test_extract_flat_messages() {
        assert_eq!(
            extract_error_message(r#"{"error": "bad key"}"#).as_deref(),
            Some("bad key")
        );
        assert_eq!(
            extract_error_message(r#"{"message": "Unauthorized"}"#).as_deref(),
            Some("Unauthorized")
        );
    }

    #[test]
    fn test_extract_unparseable() {
        assert!(extract_error_message("<html>502</html>").is_none());
        assert!(extract_error_message(r#"{"error": {"code": 5}}"#).is_none());
        assert!(extract_error_message(r#"{"message": "  "}"#).is_none());
    }

    #[test]
    fn test_endpoint_base_and_headers() {
        let spec = crate::registry::find_by_name("openai").unwrap();
        let mut headers = HashMap::new();
        headers.insert("X-Org".to_string(), "acme".to_string());
        headers.insert("bad header".to_string(), "x".to_string());
        let config = ProviderConfig {
            api_base: Some("https://proxy.local/v1/".into()),
            extra_headers: Some(headers),
        };
        let endpoint = Endpoint::new(&config, spec);
        assert_eq!(endpoint.url("/models"), "https://proxy.local/v1/models");
        assert!(endpoint.extra_headers.contains_key("x-org"));
        assert_eq!(endpoint.extra_headers.len(), 1);

        let endpoint = Endpoint::new(&ProviderConfig::default(), spec);
        assert_eq!(endpoint.api_base, "https://api.openai.com/v1");
    }
}
