//! SQLite-backed [`FileStore`] implementation.
//!
//! Each [`Collection`] maps to its own table (see [`crate::migrate`]).
//! Duplicate inserts are recognised from the primary-key violation rather
//! than a read-then-write check, so two racing uploads of the same bytes
//! cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docchat_core::error::FileStoreError;
use docchat_core::models::{Collection, FileKind, FileRecord};
use docchat_core::store::FileStore;

/// SQLite implementation of the [`FileStore`] trait.
#[derive(Clone)]
pub struct SqliteFileStore {
    pool: SqlitePool,
}

impl SqliteFileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> FileStoreError {
    FileStoreError::Backend(err.to_string())
}

fn row_to_record(row: &SqliteRow) -> Result<FileRecord, FileStoreError> {
    let kind: String = row.try_get("type").map_err(backend)?;
    let size: i64 = row.try_get("size").map_err(backend)?;
    let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at").map_err(backend)?;
    Ok(FileRecord {
        id: row.try_get("id").map_err(backend)?,
        filename: row.try_get("filename").map_err(backend)?,
        size: u64::try_from(size).unwrap_or(0),
        kind: FileKind::parse(&kind)
            .ok_or_else(|| FileStoreError::Backend(format!("unknown file type '{}'", kind)))?,
        session_id: row.try_get("session_id").map_err(backend)?,
        uploaded_at,
    })
}

#[async_trait]
impl FileStore for SqliteFileStore {
    async fn insert(
        &self,
        collection: Collection,
        record: &FileRecord,
    ) -> Result<(), FileStoreError> {
        let sql = format!(
            "INSERT INTO {} (id, filename, size, type, session_id, uploaded_at) VALUES (?, ?, ?, ?, ?, ?)",
            collection.table()
        );
        let result = sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.filename)
            .bind(i64::try_from(record.size).unwrap_or(i64::MAX))
            .bind(record.kind.as_str())
            .bind(&record.session_id)
            .bind(record.uploaded_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(FileStoreError::Duplicate(record.id.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn exists(&self, collection: Collection, id: &str) -> Result<bool, FileStoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", collection.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count > 0)
    }

    async fn find_owned(
        &self,
        collection: Collection,
        id: &str,
        session_id: &str,
    ) -> Result<Option<FileRecord>, FileStoreError> {
        let sql = format!(
            "SELECT id, filename, size, type, session_id, uploaded_at FROM {} WHERE id = ? AND session_id = ?",
            collection.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list(
        &self,
        collection: Collection,
        session_id: &str,
    ) -> Result<Vec<FileRecord>, FileStoreError> {
        let sql = format!(
            "SELECT id, filename, size, type, session_id, uploaded_at FROM {} WHERE session_id = ? ORDER BY uploaded_at ASC, id ASC",
            collection.table()
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), FileStoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.table());
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
