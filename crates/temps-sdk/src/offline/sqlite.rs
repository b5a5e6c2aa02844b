use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use super::{OfflineStore, PendingEntry, PendingRequest};
use crate::error::StoreError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS pending_deliveries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    body TEXT NOT NULL,
    queued_at TEXT NOT NULL
)";

/// SQLite-backed store; entries survive process restarts
///
/// Calls run on the blocking thread pool so the async runtime is never
/// stalled on disk I/O.
#[derive(Clone)]
pub struct SqliteOfflineStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOfflineStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!("Opening offline store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard).map_err(StoreError::from)
        })
        .await?
    }
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn enqueue(&self, request: PendingRequest) -> Result<PendingEntry, StoreError> {
        self.with_conn(move |conn| {
            let queued_at = Utc::now();
            conn.execute(
                "INSERT INTO pending_deliveries (url, body, queued_at) VALUES (?1, ?2, ?3)",
                params![request.url, request.body, queued_at],
            )?;
            Ok(PendingEntry {
                id: conn.last_insert_rowid(),
                request,
                queued_at,
            })
        })
        .await
    }

    async fn list_pending(&self) -> Result<Vec<PendingEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, body, queued_at FROM pending_deliveries ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(PendingEntry {
                    id: row.get(0)?,
                    request: PendingRequest {
                        url: row.get(1)?,
                        body: row.get(2)?,
                    },
                    queued_at: row.get::<_, DateTime<Utc>>(3)?,
                })
            })?;
            let entries = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn remove(&self, request: &PendingRequest) -> Result<usize, StoreError> {
        let request = request.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM pending_deliveries WHERE url = ?1 AND body = ?2",
                params![request.url, request.body],
            )
        })
        .await
    }
}
