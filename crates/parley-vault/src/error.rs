//! Vault error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Any decryption failure. Deliberately uninformative.
    #[error("incorrect passphrase")]
    IncorrectPassphrase,

    #[error("vault is locked")]
    Locked,

    #[error("failed to access vault file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("encryption failed: {0}")]
    Crypto(CryptoError),

    #[error("key derivation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("KDF iteration count must be positive")]
    InvalidIterations,
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Encoding | CryptoError::Truncated | CryptoError::Authentication => {
                VaultError::IncorrectPassphrase
            }
            CryptoError::Random | CryptoError::Seal => VaultError::Crypto(err),
        }
    }
}
