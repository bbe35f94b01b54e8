//! Songs already sent by `/song`, so repeated searches skip them.

use super::db::{get_connection, DbPool};
use crate::core::error::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// One downloaded song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait SongHistory: Send + Sync {
    /// True when `identifier` matches a stored video id or URL.
    async fn is_downloaded(&self, identifier: &str) -> AppResult<bool>;

    /// Stores `record`; returns `false` if its id or URL was already known.
    async fn add(&self, record: &SongRecord) -> AppResult<bool>;

    async fn count(&self) -> AppResult<u64>;
}

/// SQLite-backed history on the shared r2d2 pool.
#[derive(Clone)]
pub struct SqliteSongHistory {
    pool: Arc<DbPool>,
}

impl SqliteSongHistory {
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
impl SongHistory for SqliteSongHistory {
    async fn is_downloaded(&self, identifier: &str) -> AppResult<bool> {
        let identifier = identifier.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM song_history WHERE video_id = ?1 OR url = ?1 LIMIT 1",
                    params![identifier],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn add(&self, record: &SongRecord) -> AppResult<bool> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let known = conn
                .query_row(
                    "SELECT 1 FROM song_history WHERE video_id = ?1 OR url = ?2 LIMIT 1",
                    params![record.video_id, record.url],
                    |_| Ok(()),
                )
                .optional()?;
            if known.is_some() {
                log::debug!("Song already in history: {}", record.title);
                return Ok(false);
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO song_history (video_id, title, url) VALUES (?1, ?2, ?3)",
                params![record.video_id, record.title, record.url],
            )?;
            if inserted > 0 {
                log::info!("🎵 Added to song history: {}", record.title);
            }
            Ok(inserted > 0)
        })
        .await
    }

    async fn count(&self) -> AppResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM song_history", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

/// In-memory history keyed by video id.
#[derive(Default)]
pub struct MemorySongHistory {
    songs: DashMap<String, SongRecord>,
}

impl MemorySongHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SongHistory for MemorySongHistory {
    async fn is_downloaded(&self, identifier: &str) -> AppResult<bool> {
        Ok(self.songs.contains_key(identifier) || self.songs.iter().any(|song| song.url == identifier))
    }

    async fn add(&self, record: &SongRecord) -> AppResult<bool> {
        if self.is_downloaded(&record.url).await? {
            return Ok(false);
        }
        Ok(self.songs.insert(record.video_id.clone(), record.clone()).is_none())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.songs.len() as u64)
    }
}
