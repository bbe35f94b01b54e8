use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a pool with up to 10 connections and makes sure the schema
/// exists before the first request is served.
///
/// # Example
///
/// ```no_run
/// use mediarelay::storage::create_pool;
///
/// let pool = create_pool("users.sqlite")?;
/// # Ok::<(), mediarelay::core::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> Result<DbPool, crate::core::AppError> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    });
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let conn = pool.get()?;
    ensure_schema(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Creates the `users` and `song_history` tables if they are missing. Safe to run repeatedly.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            chat_id    INTEGER PRIMARY KEY,
            first_seen TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE TABLE IF NOT EXISTS song_history (
            video_id      TEXT PRIMARY KEY,
            title         TEXT NOT NULL,
            url           TEXT NOT NULL,
            downloaded_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_song_history_url ON song_history (url);",
    )
}
