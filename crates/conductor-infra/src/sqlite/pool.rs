//! SQLite pools behind the execution snapshot store.
//!
//! Each persisted transition rewrites one `executions` row in full
//! (`INSERT .. ON CONFLICT(id) DO UPDATE`). All of those upserts go through a
//! single writer connection, so concurrent executions queue inside the
//! process instead of racing for SQLite's file lock. `status`, `logs`, and
//! `list` read through a small read-only pool; under WAL they see the last
//! committed snapshot while a write is in progress.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

/// File name of the store inside the data directory.
pub const DATABASE_FILE: &str = "conductor.db";

const READER_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader and writer pools over one SQLite file.
///
/// - `reader`: read-only connections for snapshot loads and listings.
/// - `writer`: exactly one connection, kept open, for snapshot upserts.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open `{data_dir}/conductor.db`, creating it and its schema if needed.
    pub async fn open(data_dir: &Path) -> Result<Self, sqlx::Error> {
        Self::connect(SqliteConnectOptions::new().filename(database_path(data_dir))).await
    }

    /// Open the store at a `sqlite://` URL.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(SqliteConnectOptions::from_str(database_url)?).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        // NORMAL under WAL: a power loss can drop the newest snapshots but
        // never leaves the file inconsistent.
        let base_opts = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        // The schema must exist before read-only connections open the file.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(base_opts.read_only(true))
            .await?;

        tracing::debug!(readers = READER_CONNECTIONS, "execution store opened");
        Ok(Self { reader, writer })
    }
}

/// Location of the store inside `data_dir`.
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = DatabasePool::new(&url).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(table_names, vec!["executions"]);
    }

    #[tokio::test]
    async fn test_writer_uses_wal_with_normal_sync() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(dir.path()).await.unwrap();

        let (journal,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");

        // 1 = NORMAL
        let (sync,): (i64,) = sqlx::query_as("PRAGMA synchronous")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(sync, 1);
    }

    #[tokio::test]
    async fn test_reader_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(dir.path()).await.unwrap();

        let result = sqlx::query("DELETE FROM executions")
            .execute(&pool.reader)
            .await;
        assert!(result.is_err());

        sqlx::query("DELETE FROM executions")
            .execute(&pool.writer)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_file_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(database_path(dir.path()), dir.path().join("conductor.db"));

        DatabasePool::open(dir.path()).await.unwrap();
        assert!(dir.path().join("conductor.db").exists());
    }
}
