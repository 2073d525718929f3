//! Configuration schema.
//!
//! Hierarchy: `Config` → `RunDefaults`, `ProvidersConfig`, `OrchestratorConfig`,
//! `VaultConfig`, `RoutingConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! API keys are deliberately absent: they live in the encrypted vault only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::RequestOptions;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.parley/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub defaults: RunDefaults,
    pub providers: ProvidersConfig,
    pub orchestrator: OrchestratorConfig,
    pub vault: VaultConfig,
    pub routing: RoutingConfig,
}

// ─────────────────────────────────────────────
// Run defaults
// ─────────────────────────────────────────────

/// Defaults applied to every run unless overridden on the command line.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunDefaults {
    /// Models to run when neither the caller nor a routing rule picks any.
    pub models: Vec<String>,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Optional system prompt sent with every run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Active preset, matched by routing rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            models: vec!["gpt-4o-mini".to_string(), "claude-3-5-haiku-20241022".to_string()],
            temperature: 0.7,
            max_tokens: 4096,
            system_prompt: None,
            preset: None,
        }
    }
}

impl RunDefaults {
    /// Request options derived from these defaults.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Connection overrides for a single provider (no secrets).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// Custom API base URL (overrides the provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

/// All provider configurations, one per supported backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub gemini: ProviderConfig,
    pub groq: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub mistral: ProviderConfig,
    pub openrouter: ProviderConfig,
}

impl ProvidersConfig {
    /// Get a provider config by name (e.g. `"anthropic"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.openai),
            "anthropic" => Some(&self.anthropic),
            "gemini" => Some(&self.gemini),
            "groq" => Some(&self.groq),
            "deepseek" => Some(&self.deepseek),
            "mistral" => Some(&self.mistral),
            "openrouter" => Some(&self.openrouter),
            _ => None,
        }
    }

    /// Mutable variant of [`get_by_name`](Self::get_by_name).
    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openai" => Some(&mut self.openai),
            "anthropic" => Some(&mut self.anthropic),
            "gemini" => Some(&mut self.gemini),
            "groq" => Some(&mut self.groq),
            "deepseek" => Some(&mut self.deepseek),
            "mistral" => Some(&mut self.mistral),
            "openrouter" => Some(&mut self.openrouter),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

/// Run orchestrator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Per-task timeout in seconds. `None` or `0` means no timeout.
    pub task_timeout_secs: Option<u64>,
    /// Capacity of the status event channel.
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: Some(120),
            event_buffer: 256,
        }
    }
}

impl OrchestratorConfig {
    /// Effective timeout, treating `0` as disabled.
    pub fn task_timeout(&self) -> Option<std::time::Duration> {
        self.task_timeout_secs
            .filter(|s| *s > 0)
            .map(std::time::Duration::from_secs)
    }
}

// ─────────────────────────────────────────────
// Vault
// ─────────────────────────────────────────────

/// Credential vault settings.
///
/// The KDF iteration count is not configurable: the blob does not record it,
/// so a changed count would lock out an existing vault.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Blob location. Defaults to `~/.parley/vault.dat`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ─────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────

/// Routing rule settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Rules file. Defaults to `~/.parley/rules.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<String>,
    /// Consult routing rules when no models are given explicitly.
    pub auto_route: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            auto_route: true,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
