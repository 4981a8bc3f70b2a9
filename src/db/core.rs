use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use std::path::Path;
use tokio::time::Duration;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::TARGET_DB;

/// File name of the post store inside the configured database directory.
pub const DATABASE_FILE: &str = "feedmirror.db";

#[derive(Clone, Debug)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Get access to the database pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Opens the store under `config.database_dir` and makes sure the posts
    /// table exists.
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_in(&config.database_dir).await
    }

    /// Opens `{dir}/feedmirror.db`, creating the directory and file if missing.
    pub async fn open_in(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::StorageUnavailable(sqlx::Error::Configuration(
                format!("cannot create database directory {}: {}", dir.display(), e).into(),
            ))
        })?;
        Self::new(&dir.join(DATABASE_FILE)).await
    }

    #[instrument(target = "db_query", level = "info")]
    pub async fn new(database_path: &Path) -> Result<Self> {
        info!(target: TARGET_DB, "Creating database pool for: {}", database_path.display());

        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(Error::StorageUnavailable)?;

        info!(target: TARGET_DB, "Database pool created");

        let db = Database { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
