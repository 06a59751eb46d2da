//! Service construction from configuration.
//!
//! Every external client is built exactly once here and shared through
//! `Arc`; handlers and CLI commands receive them by injection.

use std::sync::Arc;

use anyhow::{Context, Result};

use docchat_core::chunk::Chunker;
use docchat_core::compose::Composer;
use docchat_core::store::{PointIdScope, VectorStore};

use crate::chat::create_chat_model;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::qdrant::QdrantStore;
use crate::server::AppState;
use crate::session::SessionCookies;
use crate::sqlite_store::SqliteFileStore;
use crate::upload::{UploadGate, UploadLimits};

/// Build the Qdrant adapter and warn when the legacy global point-id
/// scope is selected.
pub fn build_vector_store(config: &Config) -> Result<Arc<QdrantStore>> {
    if config.vector.point_id_scope == PointIdScope::Global {
        tracing::warn!(
            "vector.point_id_scope = \"global\": identical chunk text in different files shares one point and the later upload overwrites the earlier payload"
        );
    }
    Ok(Arc::new(QdrantStore::new(&config.vector, config.embedding.dims)?))
}

/// Build the answer composer (no database needed).
pub fn build_composer(config: &Config, vectors: Arc<dyn VectorStore>) -> Result<Composer> {
    let embedder = create_embedder(&config.embedding)?;
    let chat = create_chat_model(&config.chat)?;
    Ok(Composer::new(embedder, vectors, chat).with_retrieval_limit(config.retrieval.limit))
}

/// Open the database, run migrations and wire every service the HTTP
/// server needs.
pub async fn build_state(config: &Config) -> Result<(AppState, Arc<QdrantStore>)> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool)
        .await
        .context("Failed to run database migrations")?;
    let files = Arc::new(SqliteFileStore::new(pool));

    let vectors = build_vector_store(config)?;
    let embedder = create_embedder(&config.embedding)?;
    let chat = create_chat_model(&config.chat)?;
    let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.overlap)
        .context("Invalid chunking configuration")?;

    let composer = Composer::new(embedder.clone(), vectors.clone(), chat)
        .with_retrieval_limit(config.retrieval.limit);
    let gate = UploadGate::new(
        files,
        vectors.clone(),
        embedder,
        chunker,
        UploadLimits::from(&config.upload),
    );

    let state = AppState {
        gate,
        composer,
        cookies: SessionCookies::new(&config.session),
    };
    Ok((state, vectors))
}
