use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use stratum_persistence::session::{Interceptor, Session, SessionError};

use crate::connection::{ConnectionPool, PooledConnection};

enum PendingOp {
    Save {
        table: String,
        id: String,
        body: Value,
    },
    Delete {
        table: String,
        id: String,
    },
}

impl PendingOp {
    fn matches(&self, table: &str, id: &str) -> bool {
        match self {
            PendingOp::Save { table: t, id: i, .. } | PendingOp::Delete { table: t, id: i } => {
                t == table && i == id
            }
        }
    }
}

/// A unit of work over a pooled `SQLite` database.
///
/// Writes and deletes are queued and applied in one transaction on flush.
/// `get` observes the queue before touching the database; `list` and `count`
/// flush first so the engine answers over up-to-date rows.
pub(crate) struct SqliteSession {
    pool: ConnectionPool,
    tables: Arc<HashMap<String, String>>,
    interceptor: Option<Arc<dyn Interceptor>>,
    pending: Mutex<Vec<PendingOp>>,
    open: AtomicBool,
}

impl SqliteSession {
    pub(crate) fn new(
        pool: ConnectionPool,
        tables: Arc<HashMap<String, String>>,
        interceptor: Option<Arc<dyn Interceptor>>,
    ) -> Self {
        Self {
            pool,
            tables,
            interceptor,
            pending: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    fn table_for(&self, entity: &str) -> Result<&str, SessionError> {
        self.tables
            .get(entity)
            .map(String::as_str)
            .ok_or_else(|| SessionError::UnmappedEntity(entity.to_string()))
    }

    fn conn(&self) -> Result<PooledConnection, SessionError> {
        self.pool.get().map_err(database_error)
    }
}

fn database_error(e: impl std::fmt::Display) -> SessionError {
    SessionError::Database(e.to_string())
}

fn internal_error(e: impl std::fmt::Display) -> SessionError {
    SessionError::Internal(e.to_string())
}

impl std::fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSession")
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Session for SqliteSession {
    async fn get(&self, entity: &str, id: &str) -> Result<Option<Value>, SessionError> {
        self.ensure_open()?;
        let table = self.table_for(entity)?;

        {
            let pending = self.pending.lock().map_err(internal_error)?;
            if let Some(op) = pending.iter().rev().find(|op| op.matches(table, id)) {
                return Ok(match op {
                    PendingOp::Save { body, .. } => Some(body.clone()),
                    PendingOp::Delete { .. } => None,
                });
            }
        }

        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT body FROM {table} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(database_error)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entity: &str, id: &str, mut body: Value) -> Result<(), SessionError> {
        self.ensure_open()?;
        let table = self.table_for(entity)?.to_string();

        if let Some(interceptor) = &self.interceptor {
            interceptor.on_save(entity, id, &mut body);
        }

        self.pending.lock().map_err(internal_error)?.push(PendingOp::Save {
            table,
            id: id.to_string(),
            body,
        });
        Ok(())
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        let table = self.table_for(entity)?.to_string();

        if let Some(interceptor) = &self.interceptor {
            interceptor.on_delete(entity, id);
        }

        self.pending.lock().map_err(internal_error)?.push(PendingOp::Delete {
            table,
            id: id.to_string(),
        });
        Ok(())
    }

    async fn list(&self, entity: &str) -> Result<Vec<Value>, SessionError> {
        self.flush().await?;
        let table = self.table_for(entity)?;

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT body FROM {table} ORDER BY id"))
            .map_err(database_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(database_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(database_error)?;

        rows.into_iter()
            .map(|raw| Ok(serde_json::from_str(&raw)?))
            .collect()
    }

    async fn count(&self, entity: &str) -> Result<u64, SessionError> {
        self.flush().await?;
        let table = self.table_for(entity)?;

        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(database_error)?;
        Ok(count as u64)
    }

    async fn flush(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let ops = {
            let mut pending = self.pending.lock().map_err(internal_error)?;
            std::mem::take(&mut *pending)
        };
        if ops.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(database_error)?;
        for op in ops {
            match op {
                PendingOp::Save { table, id, body } => {
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} (id, body) VALUES (?1, ?2) \
                             ON CONFLICT(id) DO UPDATE SET body = excluded.body"
                        ),
                        params![id, body.to_string()],
                    )
                    .map_err(database_error)?;
                }
                PendingOp::Delete { table, id } => {
                    tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])
                        .map_err(database_error)?;
                }
            }
        }
        tx.commit().map_err(database_error)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
