//! Durable storage for the encrypted blob.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::VaultError;

/// Default blob path (`~/.parley/vault.dat`).
pub fn get_vault_path() -> PathBuf {
    parley_core::utils::get_data_path().join("vault.dat")
}

/// Where the single opaque blob lives.
pub trait BlobStore: Send + Sync {
    /// `None` if no vault has been created yet.
    fn load(&self) -> Result<Option<String>, VaultError>;
    fn save(&self, blob: &str) -> Result<(), VaultError>;
    fn clear(&self) -> Result<(), VaultError>;
}

// ─────────────────────────────────────────────
// File store
// ─────────────────────────────────────────────

/// Blob in a single text file, owner read/write only on Unix.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    /// `path` defaults to `~/.parley/vault.dat` if `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        FileBlobStore {
            path: path.unwrap_or_else(get_vault_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> VaultError {
        VaultError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self) -> Result<Option<String>, VaultError> {
        match std::fs::read_to_string(&self.path) {
            Ok(blob) if blob.trim().is_empty() => Ok(None),
            Ok(blob) => Ok(Some(blob.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn save(&self, blob: &str) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        // Write to a sibling temp file, then rename over the old blob
        let tmp = self.path.with_extension("dat.tmp");
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(blob.as_bytes()).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        debug!(path = %self.path.display(), "Vault blob saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), VaultError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Vault blob removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

// ─────────────────────────────────────────────
// Memory store
// ─────────────────────────────────────────────

/// In-memory blob, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blob: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored blob as-is.
    pub fn put_raw(&self, blob: impl Into<String>) {
        *self.blob.lock() = Some(blob.into());
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self) -> Result<Option<String>, VaultError> {
        Ok(self.blob.lock().clone())
    }

    fn save(&self, blob: &str) -> Result<(), VaultError> {
        *self.blob.lock() = Some(blob.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), VaultError> {
        self.blob.lock().take();
        Ok(())
    }
}
