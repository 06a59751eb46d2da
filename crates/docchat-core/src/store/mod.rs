//! Storage abstractions for docchat.
//!
//! Two stores back every file:
//!
//! - a [`FileStore`] holding one metadata record per upload, keyed by the
//!   content-derived file id and scoped by session;
//! - a [`VectorStore`] holding one point per chunk, tagged with the same
//!   file id so it can be searched and deleted by file.
//!
//! The file id is the only link between the two and must stay
//! referentially consistent: every point's file id has a metadata record,
//! except transiently during an upload or delete.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunk::normalize_for_identity;
use crate::error::{FileStoreError, ProviderError};
use crate::models::{Collection, FileRecord, ScoredChunk};

/// Which inputs determine a vector point's identifier.
///
/// Either way, identical chunk text inside one file maps to a single point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointIdScope {
    /// `(file id, normalized text)`: identical text in two files gives
    /// two points.
    #[default]
    File,
    /// Normalized text only: identical text in two files shares one point
    /// and the later upsert overwrites the earlier file's payload.
    Global,
}

/// Deterministic point identifier for a chunk.
///
/// The first 16 bytes of a SHA-256 digest, formatted as a UUID (the id
/// format the vector store accepts).
pub fn point_id(scope: PointIdScope, file_id: &str, text: &str) -> Uuid {
    let mut hasher = Sha256::new();
    if scope == PointIdScope::File {
        hasher.update(file_id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(normalize_for_identity(text).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](VectorStore::ensure_collection) | Idempotent collection + payload index bootstrap |
/// | [`upsert`](VectorStore::upsert) | One point per chunk, payload `{text, fileHash, order}` |
/// | [`search`](VectorStore::search) | Top-k similarity restricted to one file |
/// | [`delete_file`](VectorStore::delete_file) | Remove every point of one file |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure the collection and its file-id index exist. Safe to call
    /// concurrently; a racing creator is not an error.
    async fn ensure_collection(&self) -> Result<(), ProviderError>;

    /// Write one point per `(text, vector)` pair. `order` is the array
    /// position. Fails if the arrays differ in length.
    async fn upsert(
        &self,
        file_id: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), ProviderError>;

    /// Nearest `limit` points whose file id equals `file_id`.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        file_id: &str,
    ) -> Result<Vec<ScoredChunk>, ProviderError>;

    /// Remove every point of `file_id`. Zero matches is not an error.
    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError>;
}

/// Abstract metadata store for uploaded files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Insert a new record. A record with the same id yields
    /// [`FileStoreError::Duplicate`].
    async fn insert(&self, collection: Collection, record: &FileRecord)
        -> Result<(), FileStoreError>;

    async fn exists(&self, collection: Collection, id: &str) -> Result<bool, FileStoreError>;

    /// The record with `id` if and only if it belongs to `session_id`.
    async fn find_owned(
        &self,
        collection: Collection,
        id: &str,
        session_id: &str,
    ) -> Result<Option<FileRecord>, FileStoreError>;

    /// All records of `session_id`, oldest first.
    async fn list(
        &self,
        collection: Collection,
        session_id: &str,
    ) -> Result<Vec<FileRecord>, FileStoreError>;

    /// Delete the record with `id`. Missing records are not an error.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), FileStoreError>;
}

pub(crate) fn check_parallel(
    service: &str,
    texts: &[String],
    vectors: &[Vec<f32>],
) -> Result<(), ProviderError> {
    if texts.len() != vectors.len() {
        return Err(ProviderError::CountMismatch {
            service: service.to_string(),
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_file_scope_separates_files() {
        let a = point_id(PointIdScope::File, "file-a", "Same text");
        let b = point_id(PointIdScope::File, "file-b", "Same text");
        assert_ne!(a, b);
        assert_eq!(a, point_id(PointIdScope::File, "file-a", "  same TEXT "));
    }

    #[test]
    fn test_point_id_global_scope_collides_across_files() {
        let a = point_id(PointIdScope::Global, "file-a", "Same text");
        let b = point_id(PointIdScope::Global, "file-b", "same text");
        assert_eq!(a, b);
    }

    #[test]
    fn test_global_point_id_matches_content_hash_prefix() {
        let hash = crate::chunk::content_hash("Hello");
        let id = point_id(PointIdScope::Global, "ignored", "Hello");
        assert_eq!(id.simple().to_string(), hash[..32]);
    }
}
