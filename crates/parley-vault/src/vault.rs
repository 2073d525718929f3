//! The credential vault state machine.
//!
//! ```text
//! locked --unlock(p)--> unlocked --lock()--> locked
//! unlocked --save(creds, p)--> unlocked
//! ```
//!
//! Key derivation runs on the blocking pool so concurrent adapter calls keep
//! making progress. It is not cancellable once started.

use std::num::NonZeroU32;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use parley_core::config::schema::VaultConfig;
use parley_core::types::{CredentialSet, CredentialSource};
use parley_core::utils::expand_home;

use crate::crypto;
use crate::error::VaultError;
use crate::session::SessionContext;
use crate::store::{BlobStore, FileBlobStore};

enum VaultState {
    Locked,
    Unlocked(CredentialSet),
}

/// Encrypted-at-rest credential store plus its lock state.
pub struct Vault {
    store: Arc<dyn BlobStore>,
    session: Arc<SessionContext>,
    iterations: NonZeroU32,
    state: RwLock<VaultState>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("unlocked", &self.is_unlocked())
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl Vault {
    pub fn new(
        store: Arc<dyn BlobStore>,
        session: Arc<SessionContext>,
        iterations: u32,
    ) -> Result<Self, VaultError> {
        let iterations = NonZeroU32::new(iterations).ok_or(VaultError::InvalidIterations)?;
        Ok(Vault {
            store,
            session,
            iterations,
            state: RwLock::new(VaultState::Locked),
        })
    }

    /// File-backed vault at `config.path` (default `~/.parley/vault.dat`),
    /// keyed with [`crypto::DEFAULT_ITERATIONS`] rounds.
    pub fn from_config(
        config: &VaultConfig,
        session: Arc<SessionContext>,
    ) -> Result<Self, VaultError> {
        let path = config.path.as_deref().map(expand_home);
        Self::new(
            Arc::new(FileBlobStore::new(path)),
            session,
            crypto::DEFAULT_ITERATIONS,
        )
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(*self.state.read(), VaultState::Unlocked(_))
    }

    /// Whether an encrypted blob has been persisted.
    pub fn exists(&self) -> Result<bool, VaultError> {
        Ok(self.store.load()?.is_some())
    }

    /// Snapshot of the decrypted credentials, `None` while locked.
    pub fn credentials(&self) -> Option<CredentialSet> {
        match &*self.state.read() {
            VaultState::Unlocked(creds) => Some(creds.clone()),
            VaultState::Locked => None,
        }
    }

    // ─────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────

    /// Unlock with `passphrase`. Returns `false` on any failure, leaving the
    /// current state untouched.
    pub async fn unlock(&self, passphrase: &str) -> bool {
        match self.try_unlock(passphrase).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Vault unlock failed");
                false
            }
        }
    }

    /// [`unlock`](Self::unlock) with the failure reason. Every decryption
    /// failure surfaces as [`VaultError::IncorrectPassphrase`].
    pub async fn try_unlock(&self, passphrase: &str) -> Result<(), VaultError> {
        let Some(blob) = self.store.load()? else {
            info!("No vault found, creating an empty one");
            self.session.cache(passphrase);
            *self.state.write() = VaultState::Unlocked(CredentialSet::new());
            return Ok(());
        };

        let iterations = self.iterations;
        let pass = passphrase.to_string();
        let plaintext =
            tokio::task::spawn_blocking(move || crypto::open(&blob, &pass, iterations)).await??;
        let credentials: CredentialSet =
            serde_json::from_slice(&plaintext).map_err(|_| VaultError::IncorrectPassphrase)?;

        debug!(providers = credentials.len(), "Vault unlocked");
        self.session.cache(passphrase);
        *self.state.write() = VaultState::Unlocked(credentials);
        Ok(())
    }

    /// Silent re-unlock with the session's cached passphrase.
    pub async fn resume(&self) -> bool {
        if self.is_unlocked() {
            return true;
        }
        match self.session.cached() {
            Some(passphrase) => self.unlock(&passphrase).await,
            None => false,
        }
    }

    /// Encrypt and persist `credentials` under `passphrase` with a fresh salt
    /// and IV, then switch to them.
    pub async fn save(
        &self,
        credentials: CredentialSet,
        passphrase: &str,
    ) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(&credentials)?;
        let iterations = self.iterations;
        let pass = passphrase.to_string();
        let blob =
            tokio::task::spawn_blocking(move || crypto::seal(&plaintext, &pass, iterations))
                .await??;

        self.store.save(&blob)?;
        debug!(providers = credentials.len(), "Vault saved");
        self.session.cache(passphrase);
        *self.state.write() = VaultState::Unlocked(credentials);
        Ok(())
    }

    /// Add or replace one credential and persist with the session passphrase.
    pub async fn set_credential(&self, provider: &str, secret: &str) -> Result<(), VaultError> {
        let (mut credentials, passphrase) = self.unlocked_parts()?;
        credentials.insert(provider, secret);
        self.save(credentials, &passphrase).await
    }

    /// Remove one credential. Returns whether it was present.
    pub async fn remove_credential(&self, provider: &str) -> Result<bool, VaultError> {
        let (mut credentials, passphrase) = self.unlocked_parts()?;
        if credentials.remove(provider).is_none() {
            return Ok(false);
        }
        self.save(credentials, &passphrase).await?;
        Ok(true)
    }

    /// Drop the plaintext credentials and the cached passphrase.
    pub fn lock(&self) {
        *self.state.write() = VaultState::Locked;
        self.session.clear();
        debug!("Vault locked");
    }

    /// Delete the persisted blob and lock.
    pub fn clear(&self) -> Result<(), VaultError> {
        self.store.clear()?;
        self.lock();
        info!("Vault cleared");
        Ok(())
    }

    fn unlocked_parts(&self) -> Result<(CredentialSet, String), VaultError> {
        let credentials = self.credentials().ok_or(VaultError::Locked)?;
        let passphrase = self.session.cached().ok_or(VaultError::Locked)?;
        Ok((credentials, passphrase))
    }
}

impl CredentialSource for Vault {
    fn credential(&self, provider: &str) -> Option<String> {
        match &*self.state.read() {
            VaultState::Unlocked(creds) => creds.get(provider).map(String::from),
            VaultState::Locked => None,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
