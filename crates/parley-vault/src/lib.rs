//! # parley-vault
//!
//! Provider credentials encrypted at rest under a user passphrase.
//!
//! - [`crypto`]: PBKDF2-HMAC-SHA256 key derivation + AES-256-GCM blob format
//! - [`store`]: where the blob lives (file or memory)
//! - [`session`]: the in-process passphrase cache
//! - [`vault::Vault`]: the locked/unlocked state machine

pub mod crypto;
pub mod error;
pub mod session;
pub mod store;
pub mod vault;

pub use error::VaultError;
pub use session::SessionContext;
pub use store::{get_vault_path, BlobStore, FileBlobStore, MemoryBlobStore};
pub use vault::Vault;
