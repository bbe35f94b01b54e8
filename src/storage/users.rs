//! Known chats, used for the user count and broadcast fan-out.
//!
//! Every operation is keyed by chat id and idempotent, so concurrent
//! requests can call [`UserStore::record_if_new`] without coordination.

use super::db::{get_connection, DbPool};
use crate::core::error::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::DashSet;
use rusqlite::params;
use std::sync::Arc;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Remembers `chat_id`; returns `true` if it was not known before.
    async fn record_if_new(&self, chat_id: i64) -> AppResult<bool>;

    async fn count(&self) -> AppResult<u64>;

    /// Every known chat id. Order is implementation-defined.
    async fn list_all(&self) -> AppResult<Vec<i64>>;

    async fn remove(&self, chat_id: i64) -> AppResult<()>;
}

/// SQLite-backed store on the shared r2d2 pool.
///
/// rusqlite is blocking, so every call runs on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: Arc<DbPool>,
}

impl SqliteUserStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> AppResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = get_connection(&pool)?;
            f(&*conn)
        })
        .await
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!("database task failed: {}", e)))?
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn record_if_new(&self, chat_id: i64) -> AppResult<bool> {
        self.with_conn(move |conn| {
            let inserted = conn.execute("INSERT OR IGNORE INTO users (chat_id) VALUES (?1)", params![chat_id])?;
            if inserted > 0 {
                log::info!("👤 New user: {}", chat_id);
            }
            Ok(inserted > 0)
        })
        .await
    }

    async fn count(&self) -> AppResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn list_all(&self) -> AppResult<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT chat_id FROM users ORDER BY first_seen, chat_id")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
    }

    async fn remove(&self, chat_id: i64) -> AppResult<()> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM users WHERE chat_id = ?1", params![chat_id])?;
            Ok(())
        })
        .await
    }
}

/// In-memory store used by tests. `list_all` returns ids sorted ascending.
#[derive(Default)]
pub struct MemoryUserStore {
    chats: DashSet<i64>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(chats: impl IntoIterator<Item = i64>) -> Self {
        Self {
            chats: chats.into_iter().collect(),
        }
    }

    pub fn contains(&self, chat_id: i64) -> bool {
        self.chats.contains(&chat_id)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn record_if_new(&self, chat_id: i64) -> AppResult<bool> {
        Ok(self.chats.insert(chat_id))
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.chats.len() as u64)
    }

    async fn list_all(&self) -> AppResult<Vec<i64>> {
        let mut ids: Vec<i64> = self.chats.iter().map(|id| *id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn remove(&self, chat_id: i64) -> AppResult<()> {
        self.chats.remove(&chat_id);
        Ok(())
    }
}
