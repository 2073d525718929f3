//! Provider adapter trait: the one contract every backend implements.
//!
//! Each adapter owns the translation between [`NormalizedRequest`] /
//! [`NormalizedResponse`] and its backend's wire format. Adapters are
//! stateless apart from connection settings, so one instance can serve any
//! number of concurrent calls.

use async_trait::async_trait;
use serde::Serialize;

use parley_core::types::{NormalizedRequest, NormalizedResponse};

use crate::error::ProviderError;
use crate::registry::ModelSpec;

/// A model offered by an adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
}

impl From<&ModelSpec> for ModelInfo {
    fn from(spec: &ModelSpec) -> Self {
        ModelInfo {
            id: spec.id.to_string(),
            display_name: spec.display_name.to_string(),
        }
    }
}

/// Trait that all provider adapters implement.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name (e.g. `"anthropic"`).
    fn provider_id(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;

    /// Send one chat request.
    ///
    /// # Arguments
    /// * `model`     : Model identifier as the user selected it.
    /// * `request`   : Messages and options.
    /// * `credential`: The provider's secret, straight from the vault.
    ///
    /// Missing usage fields default to 0; a response with no usage at all gets
    /// an estimated [`Usage`](parley_core::types::Usage).
    async fn send(
        &self,
        model: &str,
        request: &NormalizedRequest,
        credential: &str,
    ) -> Result<NormalizedResponse, ProviderError>;

    /// Cheapest available credential check. Never fails: any error is `false`.
    async fn test_connection(&self, credential: &str) -> bool;

    /// Models this adapter knows about, in catalog order.
    fn list_models(&self) -> Vec<ModelInfo>;
}
