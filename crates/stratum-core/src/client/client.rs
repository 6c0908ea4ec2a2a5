use std::sync::Arc;

use stratum_persistence::{
    registry::SessionRegistry, repository::Entity, session_repository::SessionRepository,
};

use super::{internal::InternalClient, sessions_client::SessionsClient};

/// The main struct to interact with the Stratum SDK.
#[derive(Debug, Clone)]
pub struct Client {
    // Important: The [`Client`] struct requires its `Clone` implementation to return an owned
    // reference to the same instance, so that sub-clients and repositories handed out by one
    // clone observe the same registry state as every other. Any mutable state lives behind the
    // shared [`InternalClient`].
    #[doc(hidden)]
    pub internal: Arc<InternalClient>,
}

impl Client {
    /// Wraps a configured [SessionRegistry].
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            internal: Arc::new(InternalClient::new(Arc::new(registry))),
        }
    }

    /// Session lifecycle operations.
    pub fn sessions(&self) -> SessionsClient {
        SessionsClient {
            client: self.clone(),
        }
    }

    /// A typed repository over the client's registry. The backing session is
    /// resolved per call, so the repository can be held for the lifetime of
    /// the client.
    pub fn repository<T: Entity>(&self) -> SessionRepository<T> {
        SessionRepository::new(self.internal.registry().clone())
    }
}
