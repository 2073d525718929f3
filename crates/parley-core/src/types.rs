//! Core types for Parley: the normalized contract every provider adapter speaks.
//!
//! Providers disagree on nearly everything (role names, where the system prompt
//! goes, how usage is reported). Adapters translate to and from these types so
//! that the orchestrator never branches on provider.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Role of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single role-tagged chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────

/// Generation options shared by every provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Sampling temperature (0.0 – 2.0). Provider default when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate. Provider default when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// System prompt. Each adapter decides where it goes on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// A provider-agnostic chat request.
///
/// Immutable once constructed: fields are private and only exposed by reference.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedRequest {
    messages: Vec<ChatMessage>,
    options: RequestOptions,
}

impl NormalizedRequest {
    /// Create a request from an ordered message list and options.
    pub fn new(messages: Vec<ChatMessage>, options: RequestOptions) -> Self {
        NormalizedRequest { messages, options }
    }

    /// Convenience: a single user prompt.
    pub fn from_prompt(prompt: impl Into<String>, options: RequestOptions) -> Self {
        Self::new(vec![ChatMessage::user(prompt)], options)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Total characters across all message bodies and the system prompt.
    pub fn char_count(&self) -> usize {
        let messages: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        let system = self
            .options
            .system_prompt
            .as_deref()
            .map_or(0, |s| s.chars().count());
        messages + system
    }
}

// ─────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────

/// Token usage for one call.
///
/// `estimated` is set when the provider did not report usage and the counts
/// come from [`estimate_tokens`]. Estimated counts are advisory and never a
/// billing figure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl Usage {
    /// Build usage from provider-reported counters, defaulting missing ones to 0.
    ///
    /// A missing total is derived from the other two.
    pub fn reported(prompt: Option<u64>, completion: Option<u64>, total: Option<u64>) -> Self {
        let prompt_tokens = prompt.unwrap_or(0);
        let completion_tokens = completion.unwrap_or(0);
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: total.unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
            estimated: false,
        }
    }

    /// Heuristic usage for providers that report nothing.
    pub fn estimate(request: &NormalizedRequest, completion: &str) -> Self {
        let prompt_tokens = chars_to_tokens(request.char_count());
        let completion_tokens = estimate_tokens(completion);
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            estimated: true,
        }
    }
}

/// Estimate a token count as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    chars_to_tokens(text.chars().count())
}

fn chars_to_tokens(chars: usize) -> u64 {
    (chars as u64).div_ceil(4)
}

/// A provider-agnostic chat response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub content: String,
    pub usage: Usage,
    /// Provider id (e.g. `"openai"`).
    pub provider: String,
    /// Model id as requested.
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Estimated cost in USD, from catalog prices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mock: Option<bool>,
}

// ─────────────────────────────────────────────
// Task status
// ─────────────────────────────────────────────

/// Status of one model's task within a run.
///
/// `Pending` and `Running` are transient; the rest are terminal.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success {
        response: Box<NormalizedResponse>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        can_retry: bool,
    },
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn can_retry(&self) -> bool {
        match self {
            TaskStatus::Error { can_retry, .. } => *can_retry,
            TaskStatus::Success { .. } | TaskStatus::Cancelled => true,
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    /// Short state label (`"pending"`, `"success"`, …).
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success { .. } => "success",
            TaskStatus::Error { .. } => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn response(&self) -> Option<&NormalizedResponse> {
        match self {
            TaskStatus::Success { response } => Some(response),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────

/// Provider id → secret. Only ever held in plaintext while the vault is unlocked.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet(BTreeMap<String, String>);

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, provider: &str) -> Option<&str> {
        self.0.get(provider).map(String::as_str)
    }

    pub fn insert(&mut self, provider: impl Into<String>, secret: impl Into<String>) {
        self.0.insert(provider.into(), secret.into());
    }

    pub fn remove(&mut self, provider: &str) -> Option<String> {
        self.0.remove(provider)
    }

    /// Provider ids with a stored secret, sorted.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        CredentialSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Read-only credential lookup used by the orchestrator.
///
/// Implemented by the unlocked vault and, for tests and one-shot runs,
/// by a plain [`CredentialSet`].
pub trait CredentialSource: Send + Sync {
    /// Secret for `provider`, or `None` if none is configured.
    fn credential(&self, provider: &str) -> Option<String>;
}

impl CredentialSource for CredentialSet {
    fn credential(&self, provider: &str) -> Option<String> {
        self.get(provider).map(String::from)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
