use std::sync::Arc;

use stratum_persistence::{
    registry::ResolveSessionError,
    session::Session,
};

use crate::Client;

/// Wrapper for session lifecycle functionality.
pub struct SessionsClient {
    pub(crate) client: Client,
}

impl SessionsClient {
    /// The current session, for single-database applications.
    pub fn current(&self) -> Result<Arc<dyn Session>, ResolveSessionError> {
        self.client.internal.registry().current()
    }

    /// The current session for a specific factory key.
    pub fn current_for(&self, factory_key: &str) -> Result<Arc<dyn Session>, ResolveSessionError> {
        self.client.internal.registry().current_for(factory_key)
    }

    /// Whether the client is configured for multiple databases.
    pub fn is_multi_database(&self) -> bool {
        self.client.internal.registry().is_multi_database()
    }

    /// Walks the session storage and closes every open session.
    pub fn close_all(&self) {
        self.client.internal.registry().close_all_sessions();
    }

    /// Resets the underlying registry for test isolation.
    pub fn reset(&self) {
        self.client.internal.registry().reset();
    }
}
