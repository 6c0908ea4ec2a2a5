use std::{marker::PhantomData, sync::Arc};

use crate::{
    registry::SessionRegistry,
    repository::{Entity, Repository, RepositoryError},
    session::{Session, SessionError},
};

/// A persist that failed and was cleaned up, carrying the engine failure and
/// whether the failing session was closed while handling it.
#[derive(Debug, thiserror::Error)]
#[error("Failed to persist entity: {source}")]
pub struct PersistError {
    /// The engine failure that aborted the persist.
    #[source]
    pub source: SessionError,
    /// Whether the failing session was closed during cleanup.
    pub session_closed: bool,
}

/// A repository backed by the registry's current session for the entity type.
///
/// The session is resolved on every call through entity-type probing, so the
/// repository follows whatever unit of work the application's session storage
/// is scoped to.
pub struct SessionRepository<T: Entity> {
    registry: Arc<SessionRegistry>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SessionRepository<T> {
    /// Binds a repository for `T` to the given registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            _entity: PhantomData,
        }
    }

    fn session(&self) -> Result<Arc<dyn Session>, RepositoryError> {
        Ok(self.registry.current_for_entity::<T>()?)
    }
}

#[async_trait::async_trait]
impl<T: Entity> Repository<T> for SessionRepository<T> {
    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        let session = self.session()?;
        session
            .list(T::NAME)
            .await?
            .into_iter()
            .map(|body| Ok(serde_json::from_value(body)?))
            .collect()
    }

    /// Persists and flushes immediately. On any failure during save or flush
    /// the session is closed (if still open) and the failure propagates
    /// unchanged inside a [PersistError]. No retry, no recovery.
    async fn add(&self, item: T) -> Result<(), RepositoryError> {
        let session = self.session()?;
        let id = item.id().to_string();
        let body = serde_json::to_value(&item)?;

        let result = async {
            session.save(T::NAME, &id, body).await?;
            session.flush().await
        }
        .await;

        if let Err(source) = result {
            let session_closed = session.is_open();
            if session_closed {
                session.close();
            }
            return Err(PersistError {
                source,
                session_closed,
            }
            .into());
        }
        Ok(())
    }

    /// Issues a delete without an explicit flush; the engine applies it at
    /// the next flush point.
    async fn remove(&self, item: &T) -> Result<(), RepositoryError> {
        let session = self.session()?;
        session.delete(T::NAME, &item.id().to_string()).await?;
        Ok(())
    }

    /// A direct get-by-identifier against the active session.
    async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let session = self.session()?;
        match session.get(T::NAME, &id.to_string()).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.session()?.count(T::NAME).await?)
    }

    async fn contains(&self, item: &T) -> Result<bool, RepositoryError> {
        let session = self.session()?;
        Ok(session.get(T::NAME, &item.id().to_string()).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex, RwLock,
        },
    };

    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::*;
    use crate::{
        register_entity,
        session::{Interceptor, SessionFactory, SessionStorage},
    };

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Customer {
        id: u64,
        name: String,
    }

    register_entity!(Customer, "Customer", id: u64, |c| c.id);

    #[derive(Default, Debug)]
    enum FailureMode {
        #[default]
        None,
        FailSave,
        FailFlush,
    }

    /// An in-memory engine session: pending ops applied to a map on flush.
    #[derive(Debug)]
    struct FakeSession {
        committed: Mutex<HashMap<String, Value>>,
        pending: Mutex<Vec<(String, Option<Value>)>>,
        open: AtomicBool,
        failure: FailureMode,
    }

    impl FakeSession {
        fn new(failure: FailureMode) -> Arc<Self> {
            Arc::new(Self {
                committed: Mutex::new(HashMap::new()),
                pending: Mutex::new(Vec::new()),
                open: AtomicBool::new(true),
                failure,
            })
        }

        fn ensure_open(&self) -> Result<(), SessionError> {
            if self.is_open() {
                Ok(())
            } else {
                Err(SessionError::Closed)
            }
        }
    }

    #[async_trait::async_trait]
    impl Session for FakeSession {
        async fn get(&self, _entity: &str, id: &str) -> Result<Option<Value>, SessionError> {
            self.ensure_open()?;
            let pending = self.pending.lock().unwrap();
            if let Some((_, body)) = pending.iter().rev().find(|(k, _)| k == id) {
                return Ok(body.clone());
            }
            Ok(self.committed.lock().unwrap().get(id).cloned())
        }

        async fn save(&self, _entity: &str, id: &str, body: Value) -> Result<(), SessionError> {
            self.ensure_open()?;
            if matches!(self.failure, FailureMode::FailSave) {
                return Err(SessionError::Database("disk full".into()));
            }
            self.pending
                .lock()
                .unwrap()
                .push((id.to_string(), Some(body)));
            Ok(())
        }

        async fn delete(&self, _entity: &str, id: &str) -> Result<(), SessionError> {
            self.ensure_open()?;
            self.pending.lock().unwrap().push((id.to_string(), None));
            Ok(())
        }

        async fn list(&self, _entity: &str) -> Result<Vec<Value>, SessionError> {
            self.flush().await?;
            Ok(self.committed.lock().unwrap().values().cloned().collect())
        }

        async fn count(&self, _entity: &str) -> Result<u64, SessionError> {
            self.flush().await?;
            Ok(self.committed.lock().unwrap().len() as u64)
        }

        async fn flush(&self) -> Result<(), SessionError> {
            self.ensure_open()?;
            if matches!(self.failure, FailureMode::FailFlush) {
                return Err(SessionError::Database("constraint violated".into()));
            }
            let ops: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
            let mut committed = self.committed.lock().unwrap();
            for (id, body) in ops {
                match body {
                    Some(body) => {
                        committed.insert(id, body);
                    }
                    None => {
                        committed.remove(&id);
                    }
                }
            }
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    struct FakeFactory {
        failure: fn() -> FailureMode,
    }

    impl SessionFactory for FakeFactory {
        fn open_session(
            &self,
            _interceptor: Option<Arc<dyn Interceptor>>,
        ) -> Result<Arc<dyn Session>, SessionError> {
            Ok(FakeSession::new((self.failure)()))
        }

        fn maps_entity(&self, entity: &str) -> bool {
            entity == Customer::NAME
        }
    }

    struct MapStorage {
        sessions: RwLock<HashMap<String, Arc<dyn Session>>>,
    }

    impl SessionStorage for MapStorage {
        fn get_session(&self, factory_key: &str) -> Option<Arc<dyn Session>> {
            self.sessions.read().unwrap().get(factory_key).cloned()
        }
        fn set_session(&self, factory_key: &str, session: Arc<dyn Session>) {
            self.sessions
                .write()
                .unwrap()
                .insert(factory_key.to_string(), session);
        }
        fn all_sessions(&self) -> Vec<Arc<dyn Session>> {
            self.sessions.read().unwrap().values().cloned().collect()
        }
    }

    fn repository(failure: fn() -> FailureMode) -> SessionRepository<Customer> {
        let registry = SessionRegistry::builder()
            .storage(Arc::new(MapStorage {
                sessions: RwLock::new(HashMap::new()),
            }))
            .build()
            .unwrap();
        registry
            .add_factory("db1", Arc::new(FakeFactory { failure }))
            .unwrap();
        SessionRepository::new(Arc::new(registry))
    }

    fn customer(id: u64, name: &str) -> Customer {
        Customer {
            id,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn add_then_get_returns_the_entity() {
        let repo = repository(FailureMode::default);

        repo.add(customer(1, "Ada")).await.unwrap();

        assert_eq!(repo.get(&1).await.unwrap(), Some(customer(1, "Ada")));
        assert_eq!(repo.load(&1).await.unwrap(), customer(1, "Ada"));
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.contains(&customer(1, "Ada")).await.unwrap());
    }

    #[tokio::test]
    async fn remove_then_get_finds_nothing() {
        let repo = repository(FailureMode::default);
        repo.add(customer(1, "Ada")).await.unwrap();

        repo.remove(&customer(1, "Ada")).await.unwrap();

        // The delete is pending but already observed by the session.
        assert_eq!(repo.get(&1).await.unwrap(), None);
        assert!(repo.load(&1).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_tracks_persisted_entities() {
        let repo = repository(FailureMode::default);

        for i in 0..3 {
            repo.add(customer(i, "x")).await.unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 3);

        repo.remove(&customer(1, "x")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failing_save_closes_the_session() {
        let repo = repository(|| FailureMode::FailSave);

        let err = repo.add(customer(1, "Ada")).await.unwrap_err();
        let RepositoryError::Persist(persist) = err else {
            panic!("expected a persist error, got {err:?}");
        };
        assert!(persist.session_closed);
        assert!(matches!(persist.source, SessionError::Database(_)));

        // The closed session stays in storage; the registry hands out a fresh
        // one on the next resolution.
        let err = repo.add(customer(1, "Ada")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Persist(_)));
    }

    #[tokio::test]
    async fn failing_flush_closes_the_session() {
        let repo = repository(|| FailureMode::FailFlush);

        let err = repo.add(customer(1, "Ada")).await.unwrap_err();
        let RepositoryError::Persist(persist) = err else {
            panic!("expected a persist error, got {err:?}");
        };
        assert!(persist.session_closed);
    }

    #[tokio::test]
    async fn clear_stays_unsupported() {
        let repo = repository(FailureMode::default);
        assert!(matches!(
            repo.clear().await.unwrap_err(),
            RepositoryError::Unsupported("clear")
        ));
    }
}
