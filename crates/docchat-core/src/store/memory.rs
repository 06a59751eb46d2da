//! In-memory [`VectorStore`] and [`FileStore`] implementations.
//!
//! Use `HashMap` behind `std::sync::RwLock` for thread safety. Vector
//! search is brute-force cosine similarity over the points of one file.
//! Used by tests and by embedders of the core that do not need
//! persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{FileStoreError, ProviderError};
use crate::models::{Collection, FileRecord, ScoredChunk};

use super::{check_parallel, point_id, FileStore, PointIdScope, VectorStore};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    text: String,
    file_id: String,
    order: usize,
}

/// In-memory vector store keyed by deterministic point id.
pub struct InMemoryVectorStore {
    scope: PointIdScope,
    ready: RwLock<bool>,
    points: RwLock<HashMap<Uuid, StoredPoint>>,
}

impl InMemoryVectorStore {
    pub fn new(scope: PointIdScope) -> Self {
        Self {
            scope,
            ready: RwLock::new(false),
            points: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored points across all files.
    pub fn len(&self) -> usize {
        read(&self.points).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of points whose payload belongs to `file_id`.
    pub fn count_for(&self, file_id: &str) -> usize {
        read(&self.points)
            .values()
            .filter(|p| p.file_id == file_id)
            .count()
    }

    pub fn is_bootstrapped(&self) -> bool {
        *read(&self.ready)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(PointIdScope::default())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self) -> Result<(), ProviderError> {
        *write(&self.ready) = true;
        Ok(())
    }

    async fn upsert(
        &self,
        file_id: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), ProviderError> {
        check_parallel("memory", texts, vectors)?;
        let mut points = write(&self.points);
        for (order, (text, vector)) in texts.iter().zip(vectors).enumerate() {
            points.insert(
                point_id(self.scope, file_id, text),
                StoredPoint {
                    vector: vector.clone(),
                    text: text.clone(),
                    file_id: file_id.to_string(),
                    order,
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        file_id: &str,
    ) -> Result<Vec<ScoredChunk>, ProviderError> {
        let points = read(&self.points);
        let mut hits: Vec<ScoredChunk> = points
            .values()
            .filter(|p| p.file_id == file_id)
            .map(|p| ScoredChunk {
                text: p.text.clone(),
                file_id: p.file_id.clone(),
                order: p.order,
                score: cosine_similarity(vector, &p.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError> {
        write(&self.points).retain(|_, p| p.file_id != file_id);
        Ok(())
    }
}

/// In-memory metadata store, one map per collection.
#[derive(Default)]
pub struct InMemoryFileStore {
    records: RwLock<HashMap<(Collection, String), FileRecord>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn insert(
        &self,
        collection: Collection,
        record: &FileRecord,
    ) -> Result<(), FileStoreError> {
        let mut records = write(&self.records);
        let key = (collection, record.id.clone());
        if records.contains_key(&key) {
            return Err(FileStoreError::Duplicate(record.id.clone()));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn exists(&self, collection: Collection, id: &str) -> Result<bool, FileStoreError> {
        Ok(read(&self.records).contains_key(&(collection, id.to_string())))
    }

    async fn find_owned(
        &self,
        collection: Collection,
        id: &str,
        session_id: &str,
    ) -> Result<Option<FileRecord>, FileStoreError> {
        Ok(read(&self.records)
            .get(&(collection, id.to_string()))
            .filter(|r| r.session_id == session_id)
            .cloned())
    }

    async fn list(
        &self,
        collection: Collection,
        session_id: &str,
    ) -> Result<Vec<FileRecord>, FileStoreError> {
        let mut out: Vec<FileRecord> = read(&self.records)
            .iter()
            .filter(|((c, _), r)| *c == collection && r.session_id == session_id)
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), FileStoreError> {
        write(&self.records).remove(&(collection, id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use chrono::Utc;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn record(id: &str, session: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            filename: format!("{}.pdf", id),
            size: 10,
            kind: FileKind::Pdf,
            session_id: session.to_string(),
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_search_is_filtered_by_file() {
        let store = InMemoryVectorStore::default();
        store
            .upsert("a", &texts(&["alpha one", "alpha two"]), &[vec![1.0, 0.0], vec![0.9, 0.1]])
            .await
            .unwrap();
        store
            .upsert("b", &texts(&["beta"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, "a").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.file_id == "a"));
        assert_eq!(hits[0].text, "alpha one");
    }

    #[tokio::test]
    async fn test_upsert_rejects_mismatched_arrays() {
        let store = InMemoryVectorStore::default();
        let err = store
            .upsert("a", &texts(&["x", "y"]), &[vec![1.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::CountMismatch { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_text_within_file_deduplicates() {
        let store = InMemoryVectorStore::default();
        store
            .upsert("a", &texts(&["same", "Same ", "other"]), &[vec![1.0], vec![1.0], vec![1.0]])
            .await
            .unwrap();
        assert_eq!(store.count_for("a"), 2);
    }

    #[tokio::test]
    async fn test_global_scope_overwrites_across_files() {
        let store = InMemoryVectorStore::new(PointIdScope::Global);
        store.upsert("a", &texts(&["shared"]), &[vec![1.0]]).await.unwrap();
        store.upsert("b", &texts(&["shared"]), &[vec![1.0]]).await.unwrap();
        assert_eq!(store.count_for("a"), 0);
        assert_eq!(store.count_for("b"), 1);

        let scoped = InMemoryVectorStore::new(PointIdScope::File);
        scoped.upsert("a", &texts(&["shared"]), &[vec![1.0]]).await.unwrap();
        scoped.upsert("b", &texts(&["shared"]), &[vec![1.0]]).await.unwrap();
        assert_eq!(scoped.count_for("a"), 1);
        assert_eq!(scoped.count_for("b"), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_noop() {
        let store = InMemoryVectorStore::default();
        store.delete_file("nothing").await.unwrap();
        store.upsert("a", &texts(&["x"]), &[vec![1.0]]).await.unwrap();
        store.delete_file("a").await.unwrap();
        assert!(store.search(&[1.0], 5, "a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_duplicate_and_ownership() {
        let store = InMemoryFileStore::new();
        store.insert(Collection::Documents, &record("f1", "s1")).await.unwrap();
        let err = store
            .insert(Collection::Documents, &record("f1", "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::Duplicate(_)));

        // Same id in the other collection is independent.
        store.insert(Collection::Cms, &record("f1", "s1")).await.unwrap();

        assert!(store
            .find_owned(Collection::Documents, "f1", "s1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_owned(Collection::Documents, "f1", "s2")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list(Collection::Documents, "s1").await.unwrap().len(), 1);
        assert!(store.list(Collection::Documents, "s2").await.unwrap().is_empty());

        store.delete(Collection::Documents, "f1").await.unwrap();
        store.delete(Collection::Documents, "f1").await.unwrap();
        assert!(!store.exists(Collection::Documents, "f1").await.unwrap());
        assert!(store.exists(Collection::Cms, "f1").await.unwrap());
    }
}
