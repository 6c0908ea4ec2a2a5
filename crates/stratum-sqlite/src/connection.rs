//! `SQLite` connection pool with WAL mode and foreign keys enabled.
//!
//! Uses `r2d2` connection pooling with the `r2d2_sqlite` backend. A pragma
//! customizer runs on each new connection. In-memory databases are opened
//! with a shared cache so that every pooled connection sees the same data,
//! and the factory holds one extra connection to keep the database alive.

use std::{path::PathBuf, time::Duration};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// An error opening the database or building its pool.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// An error reported by `SQLite`.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// An error reported by the connection pool.
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
}

/// Where a database lives.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseLocation {
    /// A private in-memory database, shared by all sessions of one factory.
    InMemory,
    /// A database file on disk.
    File {
        /// Path of the database file.
        path: PathBuf,
    },
}

/// Connection pool tuning.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    /// Maximum pool size.
    pub pool_size: u32,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Page cache size in KiB.
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        // journal_mode stays "memory" on in-memory databases; that is fine.
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))?;
        Ok(())
    }
}

/// Opens the pool for the given database location.
///
/// For in-memory databases the returned extra [Connection] must be kept alive
/// as long as the pool is used; dropping it may drop the shared database.
pub fn new_pool(
    location: &DatabaseLocation,
    config: &ConnectionConfig,
) -> Result<(ConnectionPool, Option<Connection>), ConnectionError> {
    let (manager, keepalive) = match location {
        DatabaseLocation::InMemory => {
            let uri = format!("file:stratum-{}?mode=memory&cache=shared", Uuid::new_v4());
            let keepalive = Connection::open(&uri)?;
            (SqliteConnectionManager::file(&uri), Some(keepalive))
        }
        DatabaseLocation::File { path } => (SqliteConnectionManager::file(path), None),
    };

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;

    Ok((pool, keepalive))
}
