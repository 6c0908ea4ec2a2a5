use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use stratum_persistence::session::{Session, SessionStorage};

/// An in-memory session storage keeping one session per factory key for the
/// whole process. Suitable for tests and simple single-threaded applications;
/// web applications supply a request-scoped strategy instead.
pub struct SimpleSessionStorage {
    sessions: RwLock<HashMap<String, Arc<dyn Session>>>,
}

impl SimpleSessionStorage {
    /// Creates an empty storage.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionStorage for SimpleSessionStorage {
    fn get_session(&self, factory_key: &str) -> Option<Arc<dyn Session>> {
        self.sessions
            .read()
            .expect("RwLock should not be poisoned")
            .get(factory_key)
            .cloned()
    }

    fn set_session(&self, factory_key: &str, session: Arc<dyn Session>) {
        self.sessions
            .write()
            .expect("RwLock should not be poisoned")
            .insert(factory_key.to_string(), session);
    }

    fn all_sessions(&self) -> Vec<Arc<dyn Session>> {
        self.sessions
            .read()
            .expect("RwLock should not be poisoned")
            .values()
            .cloned()
            .collect()
    }
}
