//! LLM provider layer for Parley.
//!
//! # Architecture
//!
//! - [`traits::ProviderAdapter`]: trait that all adapters implement
//! - [`registry`]: static specs for every supported provider + matching logic
//! - [`openai::OpenAiCompatAdapter`], [`anthropic::AnthropicAdapter`],
//!   [`gemini::GeminiAdapter`]: one adapter per wire format
//! - [`set::ProviderSet`]: the live adapters, resolved by model id

pub mod anthropic;
pub mod error;
pub mod gemini;
mod http;
pub mod openai;
pub mod registry;
pub mod set;
pub mod traits;

// Re-export main types for convenience
pub use error::ProviderError;
pub use registry::{ModelSpec, ProviderSpec, WireFormat, PROVIDERS};
pub use set::{create_adapter, ProviderSet};
pub use traits::{ModelInfo, ProviderAdapter};
