use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use stratum_persistence::session::{Interceptor, Session, SessionError, SessionFactory};

use crate::{
    connection::{self, ConnectionError, ConnectionPool},
    mapping::EngineConfiguration,
    session::SqliteSession,
    store::StoreConfig,
};

/// A session factory over one `SQLite` database.
///
/// Construction is the expensive part: the pool is opened and the schema for
/// every mapped entity is created. Applications build one factory per
/// database and register it in a session registry.
pub struct SqliteSessionFactory {
    pool: ConnectionPool,
    tables: Arc<HashMap<String, String>>,
    // Keeps the shared in-memory database alive for the factory's lifetime.
    _keepalive: Option<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionFactory").finish()
    }
}

impl SqliteSessionFactory {
    /// Opens the database and prepares one table per mapped entity.
    pub fn new(
        configuration: &EngineConfiguration,
        config: &StoreConfig,
    ) -> Result<Self, ConnectionError> {
        let (pool, keepalive) = connection::new_pool(&config.database, &config.connection)?;

        let conn = pool.get()?;
        let mut tables = HashMap::new();
        for mapping in &configuration.mappings {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
                mapping.table
            ))?;
            tables.insert(mapping.entity.clone(), mapping.table.clone());
        }

        Ok(Self {
            pool,
            tables: Arc::new(tables),
            _keepalive: keepalive.map(Mutex::new),
        })
    }
}

impl SessionFactory for SqliteSessionFactory {
    fn open_session(
        &self,
        interceptor: Option<Arc<dyn Interceptor>>,
    ) -> Result<Arc<dyn Session>, SessionError> {
        Ok(Arc::new(SqliteSession::new(
            self.pool.clone(),
            self.tables.clone(),
            interceptor,
        )))
    }

    fn maps_entity(&self, entity: &str) -> bool {
        self.tables.contains_key(entity)
    }
}
