//! Database schema creation.
//!
//! One metadata table per upload collection. Both share the same shape:
//! the content-derived file id as primary key, the owning session, and
//! an ISO-8601 upload timestamp. Statements are idempotent, so `init`
//! and `serve` can both run them.

use anyhow::Result;
use docchat_core::models::Collection;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Open the configured database and create every table and index.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for collection in [Collection::Documents, Collection::Cms] {
        let table = collection.table();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                size INTEGER NOT NULL,
                type TEXT NOT NULL,
                session_id TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_session_id ON {table}(session_id, uploaded_at)"
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
