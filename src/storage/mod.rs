//! Persistence for known chats and downloaded songs

pub mod db;
pub mod songs;
pub mod users;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use songs::{MemorySongHistory, SongHistory, SongRecord, SqliteSongHistory};
pub use users::{MemoryUserStore, SqliteUserStore, UserStore};
