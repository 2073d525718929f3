//! Provider registry: static specs for every supported backend.
//!
//! Each `ProviderSpec` describes how to reach a provider: which wire format it
//! speaks, the keywords used to match free-form model names, its default API
//! base, the expected credential prefix, and a small model catalog with
//! per-million-token prices for cost estimates.

use parley_core::types::Usage;

// ─────────────────────────────────────────────
// ProviderSpec: static metadata for one provider
// ─────────────────────────────────────────────

/// Request/response dialect spoken by a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST /chat/completions` with bearer auth.
    OpenAiCompatible,
    /// `POST /v1/messages` with `x-api-key`.
    Anthropic,
    /// `POST /v1beta/models/{model}:generateContent?key=...`.
    Gemini,
}

/// A catalog model and its list prices (USD per million tokens).
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub input_price: f64,
    pub output_price: f64,
}

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name, also the credential key in the vault (e.g. `"openai"`).
    pub name: &'static str,
    /// Human-readable name for logs. E.g. `"OpenAI"`.
    pub display_name: &'static str,
    pub wire: WireFormat,
    /// Keywords to match in model names (lowercase). E.g. `&["claude", "anthropic"]`.
    pub keywords: &'static [&'static str],
    /// Default API base URL.
    pub default_api_base: &'static str,
    /// Expected credential prefix, used for format checks. E.g. `Some("sk-ant-")`.
    pub key_prefix: Option<&'static str>,
    /// Whether this is a gateway/aggregator. Gateways never win keyword matches.
    pub is_gateway: bool,
    pub models: &'static [ModelSpec],
}

impl ProviderSpec {
    /// Look up a catalog model of this provider.
    pub fn model(&self, id: &str) -> Option<&'static ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }
}

// ─────────────────────────────────────────────
// All providers (in matching priority order)
// ─────────────────────────────────────────────

/// Complete list of supported provider specifications, in matching priority order.
pub static PROVIDERS: &[ProviderSpec] = &[
    // 1. OpenAI
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        wire: WireFormat::OpenAiCompatible,
        keywords: &["gpt", "openai", "o1-", "o3-"],
        default_api_base: "https://api.openai.com/v1",
        key_prefix: Some("sk-"),
        is_gateway: false,
        models: &[
            ModelSpec {
                id: "gpt-4o",
                display_name: "GPT-4o",
                input_price: 2.50,
                output_price: 10.00,
            },
            ModelSpec {
                id: "gpt-4o-mini",
                display_name: "GPT-4o mini",
                input_price: 0.15,
                output_price: 0.60,
            },
            ModelSpec {
                id: "gpt-4-turbo",
                display_name: "GPT-4 Turbo",
                input_price: 10.00,
                output_price: 30.00,
            },
        ],
    },
    // 2. Anthropic
    ProviderSpec {
        name: "anthropic",
        display_name: "Anthropic",
        wire: WireFormat::Anthropic,
        keywords: &["claude", "anthropic"],
        default_api_base: "https://api.anthropic.com",
        key_prefix: Some("sk-ant-"),
        is_gateway: false,
        models: &[
            ModelSpec {
                id: "claude-3-5-sonnet-20241022",
                display_name: "Claude 3.5 Sonnet",
                input_price: 3.00,
                output_price: 15.00,
            },
            ModelSpec {
                id: "claude-3-5-haiku-20241022",
                display_name: "Claude 3.5 Haiku",
                input_price: 0.80,
                output_price: 4.00,
            },
            ModelSpec {
                id: "claude-3-opus-20240229",
                display_name: "Claude 3 Opus",
                input_price: 15.00,
                output_price: 75.00,
            },
        ],
    },
    // 3. Gemini: key travels as a query parameter
    ProviderSpec {
        name: "gemini",
        display_name: "Gemini",
        wire: WireFormat::Gemini,
        keywords: &["gemini"],
        default_api_base: "https://generativelanguage.googleapis.com",
        key_prefix: Some("AIza"),
        is_gateway: false,
        models: &[
            ModelSpec {
                id: "gemini-1.5-pro",
                display_name: "Gemini 1.5 Pro",
                input_price: 1.25,
                output_price: 5.00,
            },
            ModelSpec {
                id: "gemini-1.5-flash",
                display_name: "Gemini 1.5 Flash",
                input_price: 0.075,
                output_price: 0.30,
            },
            ModelSpec {
                id: "gemini-2.0-flash",
                display_name: "Gemini 2.0 Flash",
                input_price: 0.10,
                output_price: 0.40,
            },
        ],
    },
    // 4. Groq
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        wire: WireFormat::OpenAiCompatible,
        keywords: &["groq", "llama"],
        default_api_base: "https://api.groq.com/openai/v1",
        key_prefix: Some("gsk_"),
        is_gateway: false,
        models: &[
            ModelSpec {
                id: "llama-3.3-70b-versatile",
                display_name: "Llama 3.3 70B (Groq)",
                input_price: 0.59,
                output_price: 0.79,
            },
            ModelSpec {
                id: "llama-3.1-8b-instant",
                display_name: "Llama 3.1 8B Instant (Groq)",
                input_price: 0.05,
                output_price: 0.08,
            },
        ],
    },
    // 5. DeepSeek
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        wire: WireFormat::OpenAiCompatible,
        keywords: &["deepseek"],
        default_api_base: "https://api.deepseek.com/v1",
        key_prefix: Some("sk-"),
        is_gateway: false,
        models: &[
            ModelSpec {
                id: "deepseek-chat",
                display_name: "DeepSeek V3",
                input_price: 0.27,
                output_price: 1.10,
            },
            ModelSpec {
                id: "deepseek-reasoner",
                display_name: "DeepSeek R1",
                input_price: 0.55,
                output_price: 2.19,
            },
        ],
    },
    // 6. Mistral
    ProviderSpec {
        name: "mistral",
        display_name: "Mistral",
        wire: WireFormat::OpenAiCompatible,
        keywords: &["mistral", "codestral", "pixtral"],
        default_api_base: "https://api.mistral.ai/v1",
        key_prefix: None,
        is_gateway: false,
        models: &[
            ModelSpec {
                id: "mistral-large-latest",
                display_name: "Mistral Large",
                input_price: 2.00,
                output_price: 6.00,
            },
            ModelSpec {
                id: "mistral-small-latest",
                display_name: "Mistral Small",
                input_price: 0.20,
                output_price: 0.60,
            },
            ModelSpec {
                id: "codestral-latest",
                display_name: "Codestral",
                input_price: 0.30,
                output_price: 0.90,
            },
        ],
    },
    // 7. OpenRouter: gateway, only reached through its own catalog ids
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        wire: WireFormat::OpenAiCompatible,
        keywords: &["openrouter"],
        default_api_base: "https://openrouter.ai/api/v1",
        key_prefix: Some("sk-or-"),
        is_gateway: true,
        models: &[
            ModelSpec {
                id: "meta-llama/llama-3.1-405b-instruct",
                display_name: "Llama 3.1 405B (OpenRouter)",
                input_price: 2.70,
                output_price: 2.70,
            },
            ModelSpec {
                id: "qwen/qwen-2.5-72b-instruct",
                display_name: "Qwen 2.5 72B (OpenRouter)",
                input_price: 0.35,
                output_price: 0.40,
            },
        ],
    },
];

// ─────────────────────────────────────────────
// Matching functions
// ─────────────────────────────────────────────

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Find a provider spec by matching keywords against a model name.
///
/// Skips gateways. Returns the first match in priority order.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    PROVIDERS.iter().find(|spec| {
        !spec.is_gateway && spec.keywords.iter().any(|kw| model_lower.contains(kw))
    })
}

/// Find the catalog entry for an exact model id.
pub fn find_model(model: &str) -> Option<(&'static ProviderSpec, &'static ModelSpec)> {
    PROVIDERS
        .iter()
        .find_map(|spec| spec.model(model).map(|m| (spec, m)))
}

/// Resolve which provider serves `model`: exact catalog match first, then keywords.
pub fn resolve_provider(model: &str) -> Option<&'static ProviderSpec> {
    find_model(model)
        .map(|(spec, _)| spec)
        .or_else(|| find_by_model(model))
}

/// Every catalog model id, in registry order.
pub fn known_model_ids() -> Vec<&'static str> {
    PROVIDERS
        .iter()
        .flat_map(|spec| spec.models.iter().map(|m| m.id))
        .collect()
}

/// Estimated cost in USD from catalog prices. `None` for uncatalogued models.
pub fn estimate_cost(model: &str, usage: &Usage) -> Option<f64> {
    let (_, spec) = find_model(model)?;
    let input = usage.prompt_tokens as f64 * spec.input_price;
    let output = usage.completion_tokens as f64 * spec.output_price;
    Some((input + output) / 1_000_000.0)
}

/// Whether `credential` looks like a key for this provider.
///
/// Providers without a documented prefix only require a non-blank key.
pub fn key_format_ok(spec: &ProviderSpec, credential: &str) -> bool {
    let credential = credential.trim();
    match spec.key_prefix {
        Some(prefix) => credential.len() > prefix.len() && credential.starts_with(prefix),
        None => !credential.is_empty(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
