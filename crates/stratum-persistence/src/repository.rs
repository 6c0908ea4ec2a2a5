use std::fmt::Display;

use serde::{de::DeserializeOwned, Serialize};

use crate::{registry::ResolveSessionError, session::SessionError, session_repository::PersistError};

/// An error resulting from operations on a repository.
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    /// An internal unspecified error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// No entity with the requested identifier exists.
    #[error("No {entity} found with id {id}")]
    NotFound {
        /// The entity type name.
        entity: &'static str,
        /// The requested identifier.
        id: String,
    },

    /// More than one entity matched the requested identifier.
    #[error("More than one {entity} found with id {id}")]
    DuplicateId {
        /// The entity type name.
        entity: &'static str,
        /// The requested identifier.
        id: String,
    },

    /// The operation is not part of the repository contract.
    #[error("The {0} operation is not supported by this repository")]
    Unsupported(&'static str),

    /// A session-level failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The current session could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveSessionError),

    /// A persist failed and was cleaned up.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// An entity body could not be serialized or deserialized.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// This trait marks a domain object that can be kept in a repository. An
/// entity's identity is its identifier: two instances with equal ids denote
/// the same persisted object. It should not be implemented manually; instead,
/// users should use the [crate::register_entity] macro to register their
/// entity types.
pub trait Entity: Internal + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identifier type.
    type Id: Display + PartialEq + Clone + Send + Sync;

    /// The name of the entity type. The provided name must be unique across
    /// the application and not be changed once data has been persisted, as it
    /// is what matches entities to the factory that maps them.
    const NAME: &'static str;

    /// The identifier of this instance.
    fn id(&self) -> Self::Id;
}

/// Register a type for use in repositories. The type must only be registered
/// once in the crate where it's defined.
#[macro_export]
macro_rules! register_entity {
    ($ty:ty, $name:literal, id: $id_ty:ty, $get:expr) => {
        const _: () = {
            impl $crate::repository::___internal::Internal for $ty {}
            impl $crate::repository::Entity for $ty {
                type Id = $id_ty;
                const NAME: &'static str = $name;
                fn id(&self) -> $id_ty {
                    let get: fn(&$ty) -> $id_ty = $get;
                    get(self)
                }
            }
        };
    };
}

/// This trait represents the generic repository contract: a collection-like
/// view over the entities of a single type, delegating all storage work to
/// the implementation.
///
/// `list`, `add` and `remove` are left to implementations. The remaining
/// collection semantics are provided in terms of the enumeration and may be
/// overridden where the backing engine can answer them directly.
#[async_trait::async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Lists all entities in the repository.
    async fn list(&self) -> Result<Vec<T>, RepositoryError>;

    /// Adds an entity to the repository.
    async fn add(&self, item: T) -> Result<(), RepositoryError>;

    /// Removes an entity from the repository.
    async fn remove(&self, item: &T) -> Result<(), RepositoryError>;

    /// Retrieves the entity with the given identifier, or `None` when no
    /// entity matches. Fails if the enumeration yields more than one match.
    async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let mut matches = self.list().await?.into_iter().filter(|e| e.id() == *id);

        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            return Err(RepositoryError::DuplicateId {
                entity: T::NAME,
                id: id.to_string(),
            });
        }
        Ok(first)
    }

    /// Retrieves the entity with the given identifier, failing when zero or
    /// multiple matches exist.
    async fn load(&self, id: &T::Id) -> Result<T, RepositoryError> {
        self.get(id).await?.ok_or_else(|| RepositoryError::NotFound {
            entity: T::NAME,
            id: id.to_string(),
        })
    }

    /// The number of entities currently in the repository.
    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.list().await?.len() as u64)
    }

    /// Whether an entity with the same identity is present.
    async fn contains(&self, item: &T) -> Result<bool, RepositoryError> {
        Ok(self.get(&item.id()).await?.is_some())
    }

    /// Clearing a whole repository is not part of the contract and always
    /// fails.
    async fn clear(&self) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unsupported("clear"))
    }
}

/// This code is not meant to be used directly, users of this crate should use
/// the [crate::register_entity] macro to register their types.
#[doc(hidden)]
pub mod ___internal {

    // This trait is just to try to discourage users from implementing `Entity` directly.
    pub trait Internal {}
}
pub(crate) use ___internal::Internal;

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Order {
        number: u32,
        total: i64,
    }

    register_entity!(Order, "Order", id: u32, |o| o.number);

    /// A repository over a plain vector, implementing only the required
    /// methods so the provided collection semantics get exercised. Duplicate
    /// identifiers are representable on purpose.
    struct VecRepository {
        items: Mutex<Vec<Order>>,
    }

    impl VecRepository {
        fn with(items: Vec<Order>) -> Self {
            Self {
                items: Mutex::new(items),
            }
        }
    }

    #[async_trait::async_trait]
    impl Repository<Order> for VecRepository {
        async fn list(&self) -> Result<Vec<Order>, RepositoryError> {
            let items = self
                .items
                .lock()
                .map_err(|e| RepositoryError::Internal(e.to_string()))?;
            Ok(items.clone())
        }

        async fn add(&self, item: Order) -> Result<(), RepositoryError> {
            let mut items = self
                .items
                .lock()
                .map_err(|e| RepositoryError::Internal(e.to_string()))?;
            items.push(item);
            Ok(())
        }

        async fn remove(&self, item: &Order) -> Result<(), RepositoryError> {
            let mut items = self
                .items
                .lock()
                .map_err(|e| RepositoryError::Internal(e.to_string()))?;
            items.retain(|o| o.number != item.number);
            Ok(())
        }
    }

    fn order(number: u32, total: i64) -> Order {
        Order { number, total }
    }

    #[tokio::test]
    async fn get_returns_single_match() {
        let repo = VecRepository::with(vec![order(1, 100), order(2, 200)]);

        assert_eq!(repo.get(&2).await.unwrap(), Some(order(2, 200)));
        assert_eq!(repo.get(&3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_fails_on_duplicate_identifiers() {
        let repo = VecRepository::with(vec![order(1, 100), order(1, 150)]);

        let err = repo.get(&1).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DuplicateId { entity: "Order", .. }
        ));
    }

    #[tokio::test]
    async fn load_fails_when_absent() {
        let repo = VecRepository::with(vec![order(1, 100)]);

        assert_eq!(repo.load(&1).await.unwrap(), order(1, 100));

        let err = repo.load(&9).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::NotFound { entity: "Order", .. }
        ));
    }

    #[tokio::test]
    async fn count_follows_the_enumeration() {
        let repo = VecRepository::with(vec![]);
        assert_eq!(repo.count().await.unwrap(), 0);

        repo.add(order(1, 100)).await.unwrap();
        repo.add(order(2, 200)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.remove(&order(1, 100)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn contains_is_identity_membership() {
        let repo = VecRepository::with(vec![order(1, 100)]);

        // Same id but different state still counts as contained.
        assert!(repo.contains(&order(1, 999)).await.unwrap());
        assert!(!repo.contains(&order(2, 200)).await.unwrap());
    }

    #[tokio::test]
    async fn clear_is_unsupported() {
        let repo = VecRepository::with(vec![order(1, 100)]);

        let err = repo.clear().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Unsupported("clear")));

        // The entities are untouched.
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
