//! Session persistence boundary and startup validation.
//!
//! Credentials live in the host's secure key-value store, consumed here
//! through [`SessionStore`]. [`SessionRepository`] is the typed view over it
//! that enforces the credential invariant, and [`SessionValidator`] is the
//! startup reconciliation against server truth.

use std::sync::Arc;

use log::{info, warn};

use crate::api::ApiClient;
use crate::types::Session;

pub const KEY_TOKEN: &str = "token";
pub const KEY_DEPLOYMENT_CODE: &str = "deploymentCode";
pub const KEY_LOCK_FLAG: &str = "lockFlag";

/// Host-side secure key-value storage. Consumed, never implemented, by this
/// crate; the FFI layer adapts the host's store to it.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Typed view over the raw store enforcing the credential invariant: token
/// and deployment code are both present or both absent, never one without
/// the other.
pub struct SessionRepository {
    store: Arc<dyn SessionStore>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Load the cached session. A half-written credential pair violates the
    /// invariant and is treated as absent: it is cleared on sight.
    pub fn load(&self) -> Option<Session> {
        let token = self.store.get(KEY_TOKEN);
        let deployment_code = self.store.get(KEY_DEPLOYMENT_CODE);

        match (token, deployment_code) {
            (Some(token), Some(deployment_code)) => Some(Session {
                token,
                deployment_code,
                lock_flag: self
                    .store
                    .get(KEY_LOCK_FLAG)
                    .map(|value| value == "true")
                    .unwrap_or(false),
            }),
            (None, None) => None,
            _ => {
                warn!("[Session] half-written credential pair, clearing");
                self.clear();
                None
            }
        }
    }

    pub fn save(&self, session: &Session) {
        self.store.set(KEY_TOKEN, &session.token);
        self.store.set(KEY_DEPLOYMENT_CODE, &session.deployment_code);
        self.store
            .set(KEY_LOCK_FLAG, if session.lock_flag { "true" } else { "false" });
    }

    /// The documented clearing contract: remove both credentials and reset
    /// the lock flag to false.
    pub fn clear(&self) {
        self.store.remove(KEY_TOKEN);
        self.store.remove(KEY_DEPLOYMENT_CODE);
        self.store.set(KEY_LOCK_FLAG, "false");
    }
}

/// Startup reconciliation of cached credentials against server truth.
pub struct SessionValidator {
    api: Arc<ApiClient>,
}

impl SessionValidator {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// True only when the server confirms the session is still logged in.
    /// Fails closed: transport failures, timeouts, rejections, and missing
    /// `isLoggedIn` fields all read as false, and nothing propagates.
    ///
    /// On false the caller is expected to clear the cached session via
    /// [`SessionRepository::clear`] and route to re-authentication.
    pub async fn validate(&self, token: &str, deployment_code: &str) -> bool {
        let result = self.api.check_status(token, deployment_code).await;
        if !result.success {
            info!("[Session] validation failed: {}", result.message);
            return false;
        }

        let logged_in = result.is_logged_in();
        info!("[Session] server verdict: isLoggedIn={logged_in}");
        logged_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, String>>,
    }

    impl SessionStore for MemoryStore {
        fn get(&self, key: &str) -> Option<String> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }

        fn remove(&self, key: &str) {
            self.entries.lock().unwrap().remove(key);
        }
    }

    fn repository() -> (SessionRepository, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (SessionRepository::new(Arc::clone(&store) as _), store)
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (repo, _store) = repository();
        repo.save(&Session {
            token: "T1".to_string(),
            deployment_code: "D1".to_string(),
            lock_flag: true,
        });

        let session = repo.load().unwrap();
        assert_eq!(session.token, "T1");
        assert_eq!(session.deployment_code, "D1");
        assert!(session.lock_flag);
    }

    #[test]
    fn test_empty_store_loads_none() {
        let (repo, _store) = repository();
        assert!(repo.load().is_none());
    }

    #[test]
    fn test_half_written_pair_is_cleared() {
        let (repo, store) = repository();
        store.set(KEY_TOKEN, "T1");
        // deployment code never written

        assert!(repo.load().is_none());
        assert!(store.get(KEY_TOKEN).is_none(), "orphan token removed");
        assert_eq!(store.get(KEY_LOCK_FLAG).unwrap(), "false");
    }

    #[test]
    fn test_clear_contract() {
        let (repo, store) = repository();
        repo.save(&Session {
            token: "T1".to_string(),
            deployment_code: "D1".to_string(),
            lock_flag: true,
        });

        repo.clear();
        assert!(store.get(KEY_TOKEN).is_none());
        assert!(store.get(KEY_DEPLOYMENT_CODE).is_none());
        assert_eq!(store.get(KEY_LOCK_FLAG).unwrap(), "false");
    }

    #[test]
    fn test_missing_lock_flag_defaults_false() {
        let (repo, store) = repository();
        store.set(KEY_TOKEN, "T1");
        store.set(KEY_DEPLOYMENT_CODE, "D1");

        let session = repo.load().unwrap();
        assert!(!session.lock_flag);
    }
}
