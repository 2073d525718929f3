//! Provider error type.

use thiserror::Error;

/// Failure of a single adapter call.
///
/// Every variant is a transport-level failure from the orchestrator's point of
/// view and is recorded as a retryable task error.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-success HTTP status. `message` is the provider's own message when
    /// the body carried one, else derived from the status.
    #[error("{provider} API error ({status}): {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// Connection, TLS, or client-side timeout failure.
    #[error("request to {provider} failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The body could not be read or did not have the expected shape.
    #[error("invalid response from {provider}: {message}")]
    Decode { provider: String, message: String },
}

impl ProviderError {
    /// HTTP status, if the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
