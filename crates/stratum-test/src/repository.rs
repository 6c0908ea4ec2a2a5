use stratum_persistence::repository::{Entity, Repository, RepositoryError};

/// A simple in-memory repository implementation. The data is only stored in
/// memory and will not persist beyond the lifetime of the repository
/// instance.
///
/// Only the required methods of the repository contract are implemented, so
/// the provided collection semantics (get, load, count, contains, clear) run
/// against the enumeration. Primary use case is unit and integration tests.
pub struct MemoryRepository<T: Entity> {
    store: std::sync::Mutex<std::collections::HashMap<String, T>>,
}

impl<T: Entity + Clone> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            store: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl<T: Entity + Clone> Repository<T> for MemoryRepository<T> {
    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        let store = self
            .store
            .lock()
            .map_err(|e| RepositoryError::Internal(e.to_string()))?;
        Ok(store.values().cloned().collect())
    }

    async fn add(&self, item: T) -> Result<(), RepositoryError> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| RepositoryError::Internal(e.to_string()))?;
        store.insert(item.id().to_string(), item);
        Ok(())
    }

    async fn remove(&self, item: &T) -> Result<(), RepositoryError> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| RepositoryError::Internal(e.to_string()))?;
        store.remove(&item.id().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use stratum_persistence::register_entity;
    use uuid::Uuid;

    use super::*;

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Note {
        id: Uuid,
        text: String,
    }

    register_entity!(Note, "Note", id: Uuid, |n| n.id);

    fn note(text: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn add_get_remove_roundtrip() {
        let repo = MemoryRepository::<Note>::default();
        let n = note("hello");

        repo.add(n.clone()).await.unwrap();
        assert_eq!(repo.get(&n.id).await.unwrap(), Some(n.clone()));
        assert_eq!(repo.count().await.unwrap(), 1);

        repo.remove(&n).await.unwrap();
        assert_eq!(repo.get(&n.id).await.unwrap(), None);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_with_same_id_replaces() {
        let repo = MemoryRepository::<Note>::default();
        let first = note("first");
        let second = Note {
            id: first.id,
            text: "second".to_string(),
        };

        repo.add(first).await.unwrap();
        repo.add(second.clone()).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.load(&second.id).await.unwrap().text, "second");
    }
}
