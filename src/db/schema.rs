use tracing::debug;

use super::core::Database;
use crate::error::{Error, Result};
use crate::TARGET_DB;

impl Database {
    /// Idempotent; safe to call before every batch.
    pub(crate) async fn initialize_schema(&self) -> Result<()> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(Error::StorageUnavailable)?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                author TEXT NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                published INTEGER NOT NULL,
                enclosure_url TEXT,
                enclosure_type TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_posts_published ON posts (published);
            CREATE INDEX IF NOT EXISTS idx_posts_category_published ON posts (category, published);
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(Error::StorageUnavailable)?;
        debug!(target: TARGET_DB, "Tables ensured to exist");

        Ok(())
    }
}
