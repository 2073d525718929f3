//! Session-scoped passphrase cache.
//!
//! Lives only in process memory. The vault caches the passphrase here on a
//! successful unlock or save and clears it on lock; the owner of the session
//! calls [`SessionContext::end`] on teardown.

use parking_lot::Mutex;
use tracing::debug;

#[derive(Default)]
pub struct SessionContext {
    passphrase: Mutex<Option<String>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self, passphrase: &str) {
        *self.passphrase.lock() = Some(passphrase.to_string());
    }

    pub fn cached(&self) -> Option<String> {
        self.passphrase.lock().clone()
    }

    pub fn is_cached(&self) -> bool {
        self.passphrase.lock().is_some()
    }

    pub fn clear(&self) {
        self.passphrase.lock().take();
    }

    /// Session teardown.
    pub fn end(&self) {
        self.clear();
        debug!("Vault session ended");
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.passphrase.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_and_clear() {
        let session = SessionContext::new();
        assert!(session.cached().is_none());
        session.cache("p1");
        assert_eq!(session.cached().as_deref(), Some("p1"));
        session.end();
        assert!(!session.is_cached());
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let session = SessionContext::new();
        session.cache("hunter2");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("cached: true"));
    }
}
