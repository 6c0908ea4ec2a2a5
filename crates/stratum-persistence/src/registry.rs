use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::debug;

use crate::{
    repository::Entity,
    session::{Interceptor, Session, SessionError, SessionFactory, SessionStorage},
};

/// The factory key used if only one database is being communicated with.
pub const DEFAULT_FACTORY_KEY: &str = "stratum.current_session";

/// No session storage mechanism was provided to the builder.
#[derive(Debug, thiserror::Error)]
#[error("A session storage mechanism was not provided but must be")]
pub struct StorageNotConfiguredError;

/// A session factory has already been configured with the key.
#[derive(Debug, thiserror::Error)]
#[error("A session factory has already been configured with the key of {0}")]
pub struct DuplicateFactoryKeyError(pub String);

/// Errors resolving a current session through the registry.
#[derive(Debug, thiserror::Error)]
pub enum ResolveSessionError {
    /// The factory key was empty.
    #[error("The factory key may not be empty")]
    EmptyFactoryKey,

    /// No factory is registered under the key.
    #[error("A session factory does not exist with a factory key of {0}")]
    UnknownFactoryKey(String),

    /// The single-database accessor was called on a multi-database registry.
    #[error(
        "The current() accessor may only be invoked if you have one session factory; i.e., \
         you're only communicating with one database. Since you've configured multiple \
         databases, you should instead call current_for(factory_key)"
    )]
    MultipleDatabases,

    /// No registered factory maps the entity type.
    #[error("A session factory does not exist that maps the entity {0}")]
    NoFactoryForEntity(String),

    /// More than one registered factory maps the entity type.
    #[error("More than one session factory maps the entity {0}")]
    AmbiguousEntityFactory(String),

    /// Opening a session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A registry that maintains the session factories of an application, one per
/// database, keyed by factory key. The key is used to look up the associated
/// database and to decorate the respective repositories; if only one database
/// is being used, the registry holds a single factory under
/// [DEFAULT_FACTORY_KEY].
///
/// The registry is an owned object: construct it with [SessionRegistry::builder],
/// pass it (or share it behind an `Arc`) wherever sessions are resolved. The
/// storage mechanism and the optional interceptor are fixed at build time.
pub struct SessionRegistry {
    storage: Arc<dyn SessionStorage>,
    interceptor: Option<Arc<dyn Interceptor>>,
    factories: RwLock<HashMap<String, Arc<dyn SessionFactory>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish()
    }
}

impl SessionRegistry {
    /// Starts building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registers a session factory under the given key. Fails if a factory
    /// has already been configured with the same key.
    pub fn add_factory(
        &self,
        factory_key: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<(), DuplicateFactoryKeyError> {
        let key = factory_key.into();
        let mut factories = self
            .factories
            .write()
            .expect("RwLock should not be poisoned");

        if factories.contains_key(&key) {
            return Err(DuplicateFactoryKeyError(key));
        }

        debug!("registering session factory under key {key}");
        factories.insert(key, factory);
        Ok(())
    }

    /// The current session, for applications communicating with a single
    /// database. When communicating with multiple databases, invoke
    /// [SessionRegistry::current_for] instead.
    pub fn current(&self) -> Result<Arc<dyn Session>, ResolveSessionError> {
        if self.is_multi_database() {
            return Err(ResolveSessionError::MultipleDatabases);
        }
        self.current_for(DEFAULT_FACTORY_KEY)
    }

    /// The current session associated with a factory key; i.e., the key
    /// associated with a session factory for a specific database.
    ///
    /// The session cached in the storage is reused while it is open. When the
    /// storage holds nothing usable for the key, a session is opened through
    /// the factory (with the configured interceptor) and cached.
    pub fn current_for(&self, factory_key: &str) -> Result<Arc<dyn Session>, ResolveSessionError> {
        if factory_key.is_empty() {
            return Err(ResolveSessionError::EmptyFactoryKey);
        }
        let factory = self
            .factory_for(factory_key)
            .ok_or_else(|| ResolveSessionError::UnknownFactoryKey(factory_key.to_string()))?;

        if let Some(session) = self.storage.get_session(factory_key) {
            if session.is_open() {
                return Ok(session);
            }
            debug!("cached session for {factory_key} is closed, opening a new one");
        }

        let session = factory.open_session(self.interceptor.clone())?;
        self.storage.set_session(factory_key, session.clone());
        Ok(session)
    }

    /// The current session for the database that maps the entity type,
    /// located by probing each registered factory for an entity mapping.
    pub fn current_for_entity<T: Entity>(&self) -> Result<Arc<dyn Session>, ResolveSessionError> {
        let key = self.factory_key_for_entity(T::NAME)?;
        self.current_for(&key)
    }

    /// The factory key whose factory maps the given entity type name. Fails
    /// when no factory, or more than one, maps the entity.
    pub fn factory_key_for_entity(&self, entity: &str) -> Result<String, ResolveSessionError> {
        let factories = self
            .factories
            .read()
            .expect("RwLock should not be poisoned");

        let mut keys = factories
            .iter()
            .filter(|(_, factory)| factory.maps_entity(entity))
            .map(|(key, _)| key.clone());

        let Some(key) = keys.next() else {
            return Err(ResolveSessionError::NoFactoryForEntity(entity.to_string()));
        };
        if keys.next().is_some() {
            return Err(ResolveSessionError::AmbiguousEntityFactory(
                entity.to_string(),
            ));
        }
        Ok(key)
    }

    /// The factory that maps the given entity type name.
    pub fn factory_for_entity(
        &self,
        entity: &str,
    ) -> Result<Arc<dyn SessionFactory>, ResolveSessionError> {
        let key = self.factory_key_for_entity(entity)?;
        self.factory_for(&key)
            .ok_or(ResolveSessionError::UnknownFactoryKey(key))
    }

    /// The factory registered under the given key, if any.
    pub fn factory_for(&self, factory_key: &str) -> Option<Arc<dyn SessionFactory>> {
        self.factories
            .read()
            .expect("RwLock should not be poisoned")
            .get(factory_key)
            .cloned()
    }

    /// The factory registered under [DEFAULT_FACTORY_KEY], if any.
    pub fn default_factory(&self) -> Option<Arc<dyn SessionFactory>> {
        self.factory_for(DEFAULT_FACTORY_KEY)
    }

    /// Removes and returns the factory registered under the given key.
    pub fn remove_factory(&self, factory_key: &str) -> Option<Arc<dyn SessionFactory>> {
        self.factories
            .write()
            .expect("RwLock should not be poisoned")
            .remove(factory_key)
    }

    /// Whether more than one database has been configured.
    pub fn is_multi_database(&self) -> bool {
        self.factories
            .read()
            .expect("RwLock should not be poisoned")
            .len()
            > 1
    }

    /// The storage mechanism sessions are scoped by.
    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Walks the storage and closes every open session.
    pub fn close_all_sessions(&self) {
        for session in self.storage.all_sessions() {
            if session.is_open() {
                session.close();
            }
        }
    }

    /// Resets the registry for test isolation: closes all sessions and clears
    /// the factory map. The storage mechanism and interceptor are part of the
    /// registry's construction and stay in place.
    pub fn reset(&self) {
        self.close_all_sessions();
        self.factories
            .write()
            .expect("RwLock should not be poisoned")
            .clear();
        debug!("session registry reset");
    }
}

/// Builds a [SessionRegistry]. The storage mechanism is required; the
/// interceptor is optional and at most one can be configured.
#[derive(Default)]
pub struct RegistryBuilder {
    storage: Option<Arc<dyn SessionStorage>>,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl RegistryBuilder {
    /// The session storage mechanism scoping the current sessions.
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// The interceptor passed to every session opened by the registry.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Builds the registry, failing when no storage mechanism was provided.
    pub fn build(self) -> Result<SessionRegistry, StorageNotConfiguredError> {
        let storage = self.storage.ok_or(StorageNotConfiguredError)?;
        Ok(SessionRegistry {
            storage,
            interceptor: self.interceptor,
            factories: RwLock::new(HashMap::new()),
        })
    }
}
