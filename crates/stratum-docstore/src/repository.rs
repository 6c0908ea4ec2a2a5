use std::{marker::PhantomData, sync::Arc};

use stratum_persistence::repository::{Entity, Repository, RepositoryError};

use crate::store::DocumentSession;

/// Binds a [DocumentSession] to the generic repository contract for one
/// entity type. The constructor is all there is to it; behavior comes from
/// the document session, with the entity's registered name as the collection.
pub struct DocRepository<T: Entity> {
    session: Arc<DocumentSession>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> DocRepository<T> {
    /// Binds a repository for `T` to the given session.
    pub fn new(session: Arc<DocumentSession>) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T: Entity> Repository<T> for DocRepository<T> {
    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        self.session
            .list(T::NAME)
            .into_iter()
            .map(|body| Ok(serde_json::from_value(body)?))
            .collect()
    }

    async fn add(&self, item: T) -> Result<(), RepositoryError> {
        let id = item.id().to_string();
        let body = serde_json::to_value(&item)?;
        self.session.store(T::NAME, &id, body);
        self.session.save_changes();
        Ok(())
    }

    async fn remove(&self, item: &T) -> Result<(), RepositoryError> {
        self.session.delete(T::NAME, &item.id().to_string());
        self.session.save_changes();
        Ok(())
    }

    async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        match self.session.load(T::NAME, &id.to_string()) {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.session.count(T::NAME) as u64)
    }

    async fn contains(&self, item: &T) -> Result<bool, RepositoryError> {
        Ok(self.session.load(T::NAME, &item.id().to_string()).is_some())
    }
}
