//! The set of live adapters, keyed by provider name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use parley_core::config::schema::{ProviderConfig, ProvidersConfig};

use crate::anthropic::AnthropicAdapter;
use crate::gemini::GeminiAdapter;
use crate::openai::OpenAiCompatAdapter;
use crate::registry::{resolve_provider, ProviderSpec, WireFormat, PROVIDERS};
use crate::traits::ProviderAdapter;

/// Build the adapter variant for a spec's wire format.
pub fn create_adapter(
    spec: &'static ProviderSpec,
    config: &ProviderConfig,
) -> Arc<dyn ProviderAdapter> {
    debug!(
        provider = spec.display_name,
        api_base = config.api_base.as_deref().unwrap_or(spec.default_api_base),
        "Creating provider adapter"
    );
    match spec.wire {
        WireFormat::OpenAiCompatible => Arc::new(OpenAiCompatAdapter::new(config, spec)),
        WireFormat::Anthropic => Arc::new(AnthropicAdapter::new(config, spec)),
        WireFormat::Gemini => Arc::new(GeminiAdapter::new(config, spec)),
    }
}

/// Adapters available to a run.
#[derive(Clone, Default)]
pub struct ProviderSet {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per registry provider, with connection overrides from config.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut set = Self::new();
        for spec in PROVIDERS {
            let provider_config = config.get_by_name(spec.name).cloned().unwrap_or_default();
            set.insert(spec.name, create_adapter(spec, &provider_config));
        }
        set
    }

    /// Add or replace the adapter for `name`.
    pub fn insert(&mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Find the adapter serving `model`, with its provider name.
    pub fn resolve(&self, model: &str) -> Option<(&'static str, Arc<dyn ProviderAdapter>)> {
        let spec = resolve_provider(model)?;
        self.get(spec.name).map(|adapter| (spec.name, adapter))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
