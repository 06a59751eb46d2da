//! Upload, listing and deletion of session-scoped files.
//!
//! [`UploadGate`] owns the consistency rules between the metadata store and
//! the vector store:
//!
//! - every file of a request is validated (count, kind, size, duplicates)
//!   before any store is touched;
//! - a file is indexed only after its metadata record was inserted, and a
//!   file whose indexing fails is compensated (vectors, then record) before
//!   the error is returned. Files completed earlier in the same request stay;
//! - deletion removes vectors first and the record last, so a failed delete
//!   leaves the file listed and the delete can simply be repeated.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use docchat_core::chunk::{chunk_text, normalize_whitespace, Chunker};
use docchat_core::embedding::{embed_batch, Embedder};
use docchat_core::error::{DocChatError, FileStoreError, ProviderError};
use docchat_core::models::{file_id, Collection, FileKind, FileRecord, UploadedFile};
use docchat_core::store::{FileStore, VectorStore};

use crate::config::UploadConfig;
use crate::extract::extract_text;

/// One file part of an upload request.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub state: &'static str,
    pub uploaded_files: Vec<UploadedFile>,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl From<&UploadConfig> for UploadLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_files: config.max_files,
            max_file_bytes: config.max_file_bytes,
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

/// A validated file ready to be stored.
struct Accepted {
    id: String,
    kind: FileKind,
    file: IncomingFile,
}

#[derive(Clone)]
pub struct UploadGate {
    files: Arc<dyn FileStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    limits: UploadLimits,
}

impl UploadGate {
    pub fn new(
        files: Arc<dyn FileStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        limits: UploadLimits,
    ) -> Self {
        Self {
            files,
            vectors,
            embedder,
            chunker,
            limits,
        }
    }

    /// Store and index every file of one upload request.
    pub async fn upload(
        &self,
        collection: Collection,
        session_id: &str,
        files: Vec<IncomingFile>,
    ) -> Result<UploadOutcome, DocChatError> {
        let accepted = self.validate(collection, session_id, files).await?;

        self.vectors.ensure_collection().await?;

        let mut uploaded = Vec::with_capacity(accepted.len());
        for Accepted { id, kind, file } in accepted {
            let record = FileRecord {
                id,
                filename: file.filename,
                size: file.bytes.len() as u64,
                kind,
                session_id: session_id.to_string(),
                uploaded_at: Utc::now(),
            };

            match self.files.insert(collection, &record).await {
                Ok(()) => {}
                Err(FileStoreError::Duplicate(_)) => {
                    return Err(DocChatError::Conflict(format!(
                        "File already uploaded: {}",
                        record.filename
                    )))
                }
                Err(err) => {
                    tracing::error!(file = %record.filename, error = %err, "failed to store file record");
                    return Err(DocChatError::Storage(format!(
                        "Failed to store file {}, please try again.",
                        record.filename
                    )));
                }
            }

            match self.index(&record, file.bytes).await {
                Ok(chunks) => {
                    tracing::info!(
                        file_id = %record.id,
                        file = %record.filename,
                        collection = ?collection,
                        chunks,
                        "file indexed"
                    );
                    uploaded.push(UploadedFile::from(&record));
                }
                Err(err) => {
                    self.compensate(collection, &record.id).await;
                    return Err(err);
                }
            }
        }

        let message = match collection {
            Collection::Documents => "Files processed and stored in vector database",
            Collection::Cms => "CMS files uploaded successfully",
        };
        Ok(UploadOutcome {
            state: "success",
            uploaded_files: uploaded,
            message: message.to_string(),
        })
    }

    async fn validate(
        &self,
        collection: Collection,
        session_id: &str,
        files: Vec<IncomingFile>,
    ) -> Result<Vec<Accepted>, DocChatError> {
        if files.is_empty() || files.len() > self.limits.max_files {
            return Err(DocChatError::Validation(
                "Invalid number of files uploaded".to_string(),
            ));
        }

        let mut accepted = Vec::with_capacity(files.len());
        for file in files {
            let kind = FileKind::from_mime(&file.content_type)
                .filter(|kind| collection.allows(*kind))
                .ok_or_else(|| unsupported_type(collection, &file.filename))?;
            if file.bytes.len() > self.limits.max_file_bytes {
                return Err(DocChatError::Validation(format!(
                    "File too large: {}",
                    file.filename
                )));
            }
            accepted.push(Accepted {
                id: file_id(&file.bytes, session_id),
                kind,
                file,
            });
        }

        let mut seen = HashSet::new();
        for item in &accepted {
            if !seen.insert(item.id.as_str()) || self.is_stored(&item.id).await? {
                return Err(DocChatError::Conflict(format!(
                    "File already uploaded: {}",
                    item.file.filename
                )));
            }
        }

        Ok(accepted)
    }

    /// Whether `id` is recorded in any collection. Both collections share
    /// one vector namespace keyed by file id, so an id may only live once.
    async fn is_stored(&self, id: &str) -> Result<bool, FileStoreError> {
        for collection in Collection::ALL {
            if self.files.exists(collection, id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Extract, chunk, embed and upsert one file. Returns the chunk count.
    async fn index(&self, record: &FileRecord, bytes: Vec<u8>) -> Result<usize, DocChatError> {
        let unreadable =
            || DocChatError::Validation(format!("Could not read any text from {}", record.filename));

        let kind = record.kind;
        let text = match tokio::task::spawn_blocking(move || extract_text(&bytes, kind)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::warn!(file = %record.filename, error = %err, "text extraction failed");
                return Err(unreadable());
            }
            Err(err) => {
                tracing::error!(file = %record.filename, error = %err, "text extraction panicked");
                return Err(unreadable());
            }
        };
        if normalize_whitespace(&text).is_empty() {
            return Err(unreadable());
        }

        let chunks = chunk_text(&record.id, &text, &self.chunker);
        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();

        let failed = |err: ProviderError| {
            tracing::error!(file = %record.filename, error = %err, "indexing failed");
            DocChatError::Storage(format!(
                "Failed to process {}, please try again.",
                record.filename
            ))
        };
        let vectors = embed_batch(self.embedder.as_ref(), &texts)
            .await
            .map_err(failed)?;
        self.vectors
            .upsert(&record.id, &texts, &vectors)
            .await
            .map_err(failed)?;
        Ok(texts.len())
    }

    /// Undo a partially indexed file. The record is only removed once its
    /// vectors are gone, so a failed cleanup stays visible and deletable.
    async fn compensate(&self, collection: Collection, id: &str) {
        if let Err(err) = self.vectors.delete_file(id).await {
            tracing::error!(file_id = id, error = %err, "compensation: vector delete failed, keeping record");
            return;
        }
        if let Err(err) = self.files.delete(collection, id).await {
            tracing::error!(file_id = id, error = %err, "compensation: record delete failed");
        }
    }

    /// Records owned by `session_id`, oldest first.
    pub async fn list(
        &self,
        collection: Collection,
        session_id: &str,
    ) -> Result<Vec<FileRecord>, DocChatError> {
        Ok(self.files.list(collection, session_id).await?)
    }

    /// Delete a file owned by `session_id`: vectors first, record last.
    pub async fn delete(
        &self,
        collection: Collection,
        session_id: &str,
        id: &str,
    ) -> Result<(), DocChatError> {
        let Some(record) = self.files.find_owned(collection, id, session_id).await? else {
            tracing::warn!(file_id = id, "delete refused: not found or not owned");
            return Err(DocChatError::Unauthorized);
        };

        self.vectors.delete_file(&record.id).await?;
        self.files.delete(collection, &record.id).await?;
        tracing::info!(file_id = %record.id, file = %record.filename, "file deleted");
        Ok(())
    }
}

fn unsupported_type(collection: Collection, filename: &str) -> DocChatError {
    DocChatError::Validation(match collection {
        Collection::Documents => format!(
            "File type not supported: {}. Upload PDF, CSV or DOCX files.",
            filename
        ),
        Collection::Cms => "Only JSON files are supported".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_core::models::ScoredChunk;
    use docchat_core::store::memory::{InMemoryFileStore, InMemoryVectorStore};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    /// Fails to embed any text containing `poison`.
    struct PoisonEmbedder;

    #[async_trait]
    impl Embedder for PoisonEmbedder {
        fn model_name(&self) -> &str {
            "poison"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(ProviderError::http("embeddings", "boom"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Configured for 3 dimensions but the model returns 2.
    struct WrongDimsEmbedder;

    #[async_trait]
    impl Embedder for WrongDimsEmbedder {
        fn model_name(&self) -> &str {
            "wrong-dims"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Wraps the in-memory store; upserts can be made to fail and vector
    /// deletes are counted.
    #[derive(Default)]
    struct FlakyVectors {
        inner: InMemoryVectorStore,
        fail_upsert: AtomicBool,
        fail_delete: AtomicBool,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FlakyVectors {
        async fn ensure_collection(&self) -> Result<(), ProviderError> {
            self.inner.ensure_collection().await
        }
        async fn upsert(
            &self,
            file_id: &str,
            texts: &[String],
            vectors: &[Vec<f32>],
        ) -> Result<(), ProviderError> {
            // Write first, then fail, so compensation has something to clean.
            self.inner.upsert(file_id, texts, vectors).await?;
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(ProviderError::http("qdrant", "timeout"));
            }
            Ok(())
        }
        async fn search(
            &self,
            vector: &[f32],
            limit: usize,
            file_id: &str,
        ) -> Result<Vec<ScoredChunk>, ProviderError> {
            self.inner.search(vector, limit, file_id).await
        }
        async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(ProviderError::http("qdrant", "unreachable"));
            }
            self.inner.delete_file(file_id).await
        }
    }

    struct Harness {
        gate: UploadGate,
        files: Arc<InMemoryFileStore>,
        vectors: Arc<FlakyVectors>,
    }

    fn harness_with(embedder: Arc<dyn Embedder>) -> Harness {
        let files = Arc::new(InMemoryFileStore::new());
        let vectors = Arc::new(FlakyVectors::default());
        let gate = UploadGate::new(
            files.clone(),
            vectors.clone(),
            embedder,
            Chunker::new(4, 2).unwrap(),
            UploadLimits {
                max_files: 3,
                max_file_bytes: 1024,
            },
        );
        Harness {
            gate,
            files,
            vectors,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(HashEmbedder))
    }

    fn csv(name: &str, body: &str) -> IncomingFile {
        IncomingFile {
            filename: name.to_string(),
            content_type: "text/csv".to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    fn json(name: &str, body: &str) -> IncomingFile {
        IncomingFile {
            filename: name.to_string(),
            content_type: "application/json".to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_stores_record_and_vectors() {
        let h = harness();
        let out = h
            .gate
            .upload(
                Collection::Documents,
                "s1",
                vec![csv("a.csv", "name,role\nAda,engineer\nGrace,admiral\n")],
            )
            .await
            .unwrap();
        assert_eq!(out.state, "success");
        assert_eq!(out.uploaded_files.len(), 1);
        let id = &out.uploaded_files[0].id;
        assert_eq!(id, &file_id(b"name,role\nAda,engineer\nGrace,admiral\n", "s1"));
        assert!(h.vectors.inner.count_for(id) > 0);
        assert!(h.vectors.inner.is_bootstrapped());
        assert_eq!(h.gate.list(Collection::Documents, "s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_bytes_same_session_conflicts() {
        let h = harness();
        h.gate
            .upload(Collection::Documents, "s1", vec![csv("a.csv", "h\nv\n")])
            .await
            .unwrap();
        let err = h
            .gate
            .upload(Collection::Documents, "s1", vec![csv("renamed.csv", "h\nv\n")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Conflict(m) if m == "File already uploaded: renamed.csv"));
        assert_eq!(h.gate.list(Collection::Documents, "s1").await.unwrap().len(), 1);

        // Another session gets its own id.
        let out = h
            .gate
            .upload(Collection::Documents, "s2", vec![csv("a.csv", "h\nv\n")])
            .await
            .unwrap();
        assert_ne!(out.uploaded_files[0].id, file_id(b"h\nv\n", "s1"));
    }

    #[tokio::test]
    async fn test_same_bytes_in_other_collection_conflicts() {
        let h = harness();
        let body = "title,body\nhello,world of turbines\n";
        let out = h
            .gate
            .upload(Collection::Documents, "s1", vec![csv("a.csv", body)])
            .await
            .unwrap();
        let id = out.uploaded_files[0].id.clone();
        let points = h.vectors.inner.count_for(&id);
        assert!(points > 0);

        let err = h
            .gate
            .upload(Collection::Cms, "s1", vec![json("a.json", body)])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Conflict(m) if m == "File already uploaded: a.json"));
        assert!(h.gate.list(Collection::Cms, "s1").await.unwrap().is_empty());

        // Nothing in the cms collection can reach the documents file.
        let err = h.gate.delete(Collection::Cms, "s1", &id).await.unwrap_err();
        assert!(matches!(err, DocChatError::Unauthorized));
        assert_eq!(h.vectors.inner.count_for(&id), points);
        assert_eq!(h.gate.list(Collection::Documents, "s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_within_batch_rejected_before_work() {
        let h = harness();
        let err = h
            .gate
            .upload(
                Collection::Documents,
                "s1",
                vec![csv("a.csv", "h\nv\n"), csv("b.csv", "h\nv\n")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Conflict(_)));
        assert!(h.vectors.inner.is_empty());
        assert!(!h.vectors.inner.is_bootstrapped());
    }

    #[tokio::test]
    async fn test_count_and_type_validation() {
        let h = harness();
        let err = h
            .gate
            .upload(Collection::Documents, "s1", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Validation(m) if m == "Invalid number of files uploaded"));

        let four = (0..4).map(|i| csv(&format!("{}.csv", i), &format!("h\n{}\n", i))).collect();
        let err = h
            .gate
            .upload(Collection::Documents, "s1", four)
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Validation(_)));

        // A valid CSV next to a JSON file: nothing is stored.
        let err = h
            .gate
            .upload(
                Collection::Documents,
                "s1",
                vec![csv("ok.csv", "h\nv\n"), json("data.json", "{}")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Validation(m) if m.contains("data.json")));
        assert!(h.gate.list(Collection::Documents, "s1").await.unwrap().is_empty());

        let err = h
            .gate
            .upload(Collection::Cms, "s1", vec![csv("ok.csv", "h\nv\n")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Validation(m) if m == "Only JSON files are supported"));
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let h = harness();
        let big = "x".repeat(2048);
        let err = h
            .gate
            .upload(Collection::Cms, "s1", vec![json("big.json", &big)])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Validation(m) if m.contains("too large")));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_compensated() {
        let h = harness();
        let err = h
            .gate
            .upload(Collection::Cms, "s1", vec![json("blank.json", "   \n  ")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Validation(m) if m == "Could not read any text from blank.json"));
        assert!(h.gate.list(Collection::Cms, "s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_batch_keeps_earlier_files() {
        let h = harness_with(Arc::new(PoisonEmbedder));
        let err = h
            .gate
            .upload(
                Collection::Cms,
                "s1",
                vec![
                    json("good.json", r#"{"a": "fine"}"#),
                    json("bad.json", r#"{"a": "poison"}"#),
                    json("never.json", r#"{"a": "unreached"}"#),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Storage(m) if m.contains("bad.json")));

        let listed = h.gate.list(Collection::Cms, "s1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, "good.json");
        assert_eq!(h.vectors.inner.count_for(&listed[0].id), 1);
        let bad_id = file_id(br#"{"a": "poison"}"#, "s1");
        assert_eq!(h.vectors.inner.count_for(&bad_id), 0);
    }

    #[tokio::test]
    async fn test_failed_upsert_removes_vectors_and_record() {
        let h = harness();
        h.vectors.fail_upsert.store(true, Ordering::SeqCst);
        let body = r#"{"title": "one two three four five six"}"#;
        let err = h
            .gate
            .upload(Collection::Cms, "s1", vec![json("x.json", body)])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Storage(_)));
        assert!(h.vectors.inner.is_empty());
        assert!(!h
            .files
            .exists(Collection::Cms, &file_id(body.as_bytes(), "s1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_wrong_vector_size_never_reaches_store() {
        let h = harness_with(Arc::new(WrongDimsEmbedder));
        let err = h
            .gate
            .upload(Collection::Cms, "s1", vec![json("x.json", r#"{"a": "b"}"#)])
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Storage(m) if m == "Failed to process x.json, please try again."));
        assert!(h.vectors.inner.is_empty());
        assert!(h.gate.list(Collection::Cms, "s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_ownership() {
        let h = harness();
        let out = h
            .gate
            .upload(Collection::Documents, "owner", vec![csv("a.csv", "h\nv\n")])
            .await
            .unwrap();
        let id = out.uploaded_files[0].id.clone();

        let err = h
            .gate
            .delete(Collection::Documents, "intruder", &id)
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Unauthorized));
        assert_eq!(h.vectors.deletes.load(Ordering::SeqCst), 0);
        assert!(h.vectors.inner.count_for(&id) > 0);

        let err = h
            .gate
            .delete(Collection::Documents, "owner", "no-such-id")
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Unauthorized));

        h.gate
            .delete(Collection::Documents, "owner", &id)
            .await
            .unwrap();
        assert_eq!(h.vectors.inner.count_for(&id), 0);
        assert!(h.gate.list(Collection::Documents, "owner").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_vector_delete_keeps_record_for_retry() {
        let h = harness();
        let out = h
            .gate
            .upload(Collection::Documents, "s1", vec![csv("a.csv", "h\nv\n")])
            .await
            .unwrap();
        let id = out.uploaded_files[0].id.clone();

        h.vectors.fail_delete.store(true, Ordering::SeqCst);
        let err = h
            .gate
            .delete(Collection::Documents, "s1", &id)
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::Provider(_)));
        assert_eq!(h.gate.list(Collection::Documents, "s1").await.unwrap().len(), 1);

        h.vectors.fail_delete.store(false, Ordering::SeqCst);
        h.gate
            .delete(Collection::Documents, "s1", &id)
            .await
            .unwrap();
        assert!(h.gate.list(Collection::Documents, "s1").await.unwrap().is_empty());
        assert_eq!(h.vectors.inner.count_for(&id), 0);
    }
}
