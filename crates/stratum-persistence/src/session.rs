use std::sync::Arc;

use serde_json::Value;

/// An error produced by a persistence-engine session.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The session has been closed and can no longer be used.
    #[error("The session has been closed")]
    Closed,

    /// The session's configuration has no mapping for the entity type.
    #[error("The entity {0} is not mapped in this session's configuration")]
    UnmappedEntity(String),

    /// An error reported by the underlying database engine.
    #[error("Database error: {0}")]
    Database(String),

    /// An internal unspecified error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An entity body could not be serialized or deserialized.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A unit-of-work handle produced by a [SessionFactory].
///
/// Sessions speak a type-erased record API: entities are addressed by their
/// registered type name and identifier, with bodies carried as JSON. Writes
/// are queued until [Session::flush]; reads observe the session's own pending
/// writes and deletes, and `list`/`count` flush before querying the engine.
#[async_trait::async_trait]
pub trait Session: Send + Sync + std::fmt::Debug {
    /// Direct lookup of an entity by type name and identifier.
    async fn get(&self, entity: &str, id: &str) -> Result<Option<Value>, SessionError>;

    /// Queues a write of the given entity body.
    async fn save(&self, entity: &str, id: &str, body: Value) -> Result<(), SessionError>;

    /// Queues a delete of the given entity.
    async fn delete(&self, entity: &str, id: &str) -> Result<(), SessionError>;

    /// All persisted entities of the given type.
    async fn list(&self, entity: &str) -> Result<Vec<Value>, SessionError>;

    /// The number of persisted entities of the given type.
    async fn count(&self, entity: &str) -> Result<u64, SessionError>;

    /// Applies all queued work to the engine.
    async fn flush(&self) -> Result<(), SessionError>;

    /// Whether the session is still usable.
    fn is_open(&self) -> bool;

    /// Closes the session. Queued, unflushed work is discarded.
    fn close(&self);
}

/// Produces sessions for one configured database.
///
/// Factories are expensive to construct; applications hold one per database
/// for the lifetime of the process, registered in a
/// [crate::registry::SessionRegistry] under a factory key.
pub trait SessionFactory: Send + Sync {
    /// Opens a new session, passing along the registry's interceptor if one
    /// was configured.
    fn open_session(
        &self,
        interceptor: Option<Arc<dyn Interceptor>>,
    ) -> Result<Arc<dyn Session>, SessionError>;

    /// Whether this factory has a mapping for the given entity type name.
    fn maps_entity(&self, entity: &str) -> bool;
}

/// The externally supplied session-scoping strategy: where the "current"
/// session for a factory key lives (per thread, per request, per test, ...).
pub trait SessionStorage: Send + Sync {
    /// The session currently associated with the factory key, if any.
    fn get_session(&self, factory_key: &str) -> Option<Arc<dyn Session>>;

    /// Associates a session with the factory key, replacing any previous one.
    fn set_session(&self, factory_key: &str, session: Arc<dyn Session>);

    /// Every session currently held by the storage, across all factory keys.
    fn all_sessions(&self) -> Vec<Arc<dyn Session>>;
}

/// A hook invoked by engine sessions around writes. At most one interceptor
/// can be configured per registry.
pub trait Interceptor: Send + Sync {
    /// Called before an entity body is queued for writing. May rewrite the
    /// body.
    fn on_save(&self, _entity: &str, _id: &str, _body: &mut Value) {}

    /// Called before an entity delete is queued.
    fn on_delete(&self, _entity: &str, _id: &str) {}
}
