//! Bootstrap entry points: build (or load from cache) the engine
//! configuration, build the factory, register it.

use std::{path::PathBuf, sync::Arc};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use stratum_persistence::registry::{
    DuplicateFactoryKeyError, SessionRegistry, DEFAULT_FACTORY_KEY,
};

use crate::{
    config_cache::{ConfigCacheError, ConfigurationFileCache},
    connection::{ConnectionConfig, ConnectionError, DatabaseLocation},
    factory::SqliteSessionFactory,
    mapping::{AutomapModel, EngineConfiguration, MappingError},
};

/// Configuration cache wiring: where the serialized configuration lives and
/// which file's modification time invalidates it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Path of the serialized configuration.
    pub cache_file: PathBuf,
    /// Path whose modification time reflects when the mapping definitions
    /// last changed.
    pub definitions_file: PathBuf,
}

/// The externally supplied engine configuration for one database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Where the database lives.
    pub database: DatabaseLocation,
    /// Connection pool tuning.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Optional configuration file cache.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// An error bootstrapping a store. Nothing is registered when this is
/// returned; the configuration can be corrected and the call repeated.
#[derive(Debug, thiserror::Error)]
pub enum InitStoreError {
    /// The configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    /// The automapper rejected the model.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The database or its pool could not be opened.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The configuration cache could not be written.
    #[error(transparent)]
    Cache(#[from] ConfigCacheError),

    /// The factory key is already taken.
    #[error(transparent)]
    DuplicateFactoryKey(#[from] DuplicateFactoryKeyError),
}

impl StoreConfig {
    /// Reads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, InitStoreError> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Builds a SQLite-backed session factory and registers it under
/// [DEFAULT_FACTORY_KEY], for applications communicating with a single
/// database.
pub fn init(
    registry: &SessionRegistry,
    model: &AutomapModel,
    config: &StoreConfig,
) -> Result<EngineConfiguration, InitStoreError> {
    add_store(registry, DEFAULT_FACTORY_KEY, model, config)
}

/// Builds a SQLite-backed session factory and registers it under the given
/// factory key. Invoke once per database when communicating with several.
///
/// When a cache is configured and holds a valid configuration, the automap
/// step is skipped entirely; otherwise the model is built and the result
/// written back to the cache.
pub fn add_store(
    registry: &SessionRegistry,
    factory_key: &str,
    model: &AutomapModel,
    config: &StoreConfig,
) -> Result<EngineConfiguration, InitStoreError> {
    let cache = config
        .cache
        .as_ref()
        .map(|c| ConfigurationFileCache::new(&c.cache_file, &c.definitions_file));

    let configuration = match cache.as_ref().and_then(ConfigurationFileCache::load) {
        Some(cached) => {
            debug!("using cached engine configuration for {factory_key}");
            cached
        }
        None => {
            let built = model.build()?;
            if let Some(cache) = &cache {
                cache.save(&built)?;
            }
            built
        }
    };

    let factory = SqliteSessionFactory::new(&configuration, config)?;
    registry.add_factory(factory_key, Arc::new(factory))?;

    info!(
        "registered sqlite store under key {factory_key} with {} mapped entities",
        configuration.mappings.len()
    );
    Ok(configuration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_from_a_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{
                "database": { "file": { "path": "/var/lib/app/crm.db" } },
                "connection": { "poolSize": 4 }
            }"#,
        )
        .unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(
            config.database,
            DatabaseLocation::File {
                path: "/var/lib/app/crm.db".into()
            }
        );
        assert_eq!(config.connection.pool_size, 4);
        assert!(config.cache.is_none());
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let err = StoreConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, InitStoreError::Io(_)));
    }
}
