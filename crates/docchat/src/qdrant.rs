//! Qdrant-backed [`VectorStore`] over the Qdrant REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | existence check | `GET /collections/{name}` |
//! | create | `PUT /collections/{name}` with `{vectors: {size, distance: "Cosine"}}` |
//! | payload index | `PUT /collections/{name}/index` on `fileHash` (`keyword`) |
//! | upsert | `PUT /collections/{name}/points?wait=true` |
//! | search | `POST /collections/{name}/points/search` filtered on `fileHash` |
//! | delete | `POST /collections/{name}/points/delete?wait=true` filtered on `fileHash` |
//!
//! Request bodies are built by pure functions so their shape can be
//! tested without a running server.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use docchat_core::error::ProviderError;
use docchat_core::models::ScoredChunk;
use docchat_core::store::{point_id, PointIdScope, VectorStore};

use crate::config::{secret_from_env, VectorConfig};

const SERVICE: &str = "qdrant";

/// Payload key holding the file identifier.
pub const FILE_ID_KEY: &str = "fileHash";

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dims: usize,
    scope: PointIdScope,
    api_key: Option<String>,
}

impl QdrantStore {
    /// `dims` is the embedding dimensionality used when the collection
    /// has to be created.
    pub fn new(config: &VectorConfig, dims: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dims,
            scope: config.point_id_scope,
            api_key: secret_from_env(&config.api_key_env),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn url(&self, path: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, path)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::http(SERVICE, e))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| ProviderError::decode(SERVICE, e));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            service: SERVICE.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Connectivity check: `GET /collections`.
    pub async fn health(&self) -> Result<(), ProviderError> {
        let url = format!("{}/collections", self.base_url);
        self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, ProviderError> {
        let response = self
            .request(reqwest::Method::GET, self.url(""))
            .send()
            .await
            .map_err(|e| ProviderError::http(SERVICE, e))?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(ProviderError::Status {
                service: SERVICE.to_string(),
                status: s.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// A create answered with "already exists" means a concurrent creator won.
fn tolerate_existing(result: Result<Value, ProviderError>) -> Result<(), ProviderError> {
    match result {
        Ok(_) => Ok(()),
        Err(ProviderError::Status { status: 409, .. }) => Ok(()),
        Err(ProviderError::Status {
            status: 400, body, ..
        }) if body.contains("already exists") => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn create_collection_body(dims: usize) -> Value {
    json!({ "vectors": { "size": dims, "distance": "Cosine" } })
}

pub fn payload_index_body() -> Value {
    json!({ "field_name": FILE_ID_KEY, "field_schema": "keyword" })
}

fn file_filter(file_id: &str) -> Value {
    json!({ "must": [ { "key": FILE_ID_KEY, "match": { "value": file_id } } ] })
}

pub fn upsert_body(
    scope: PointIdScope,
    file_id: &str,
    texts: &[String],
    vectors: &[Vec<f32>],
) -> Value {
    let points: Vec<Value> = texts
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(order, (text, vector))| {
            json!({
                "id": point_id(scope, file_id, text).to_string(),
                "vector": vector,
                "payload": { "text": text, FILE_ID_KEY: file_id, "order": order },
            })
        })
        .collect();
    json!({ "points": points })
}

pub fn search_body(vector: &[f32], limit: usize, file_id: &str) -> Value {
    json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
        "filter": file_filter(file_id),
    })
}

pub fn delete_body(file_id: &str) -> Value {
    json!({ "filter": file_filter(file_id) })
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    #[serde(default)]
    payload: Option<HitPayload>,
}

#[derive(Deserialize)]
struct HitPayload {
    #[serde(default)]
    text: String,
    #[serde(rename = "fileHash", default)]
    file_hash: String,
    #[serde(default)]
    order: usize,
}

fn parse_search_response(json: Value) -> Result<Vec<ScoredChunk>, ProviderError> {
    let parsed: SearchResponse =
        serde_json::from_value(json).map_err(|e| ProviderError::decode(SERVICE, e))?;
    Ok(parsed
        .result
        .into_iter()
        .filter_map(|hit| {
            hit.payload.map(|p| ScoredChunk {
                text: p.text,
                file_id: p.file_hash,
                order: p.order,
                score: hit.score,
            })
        })
        .collect())
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self) -> Result<(), ProviderError> {
        if !self.collection_exists().await? {
            tracing::info!(collection = %self.collection, dims = self.dims, "creating vector collection");
            let create = self
                .request(reqwest::Method::PUT, self.url(""))
                .json(&create_collection_body(self.dims));
            tolerate_existing(self.send(create).await)?;
        }

        let index = self
            .request(reqwest::Method::PUT, self.url("/index"))
            .json(&payload_index_body());
        tolerate_existing(self.send(index).await)
    }

    async fn upsert(
        &self,
        file_id: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), ProviderError> {
        if texts.len() != vectors.len() {
            return Err(ProviderError::CountMismatch {
                service: SERVICE.to_string(),
                expected: texts.len(),
                got: vectors.len(),
            });
        }
        if texts.is_empty() {
            return Ok(());
        }
        let body = upsert_body(self.scope, file_id, texts, vectors);
        self.send(
            self.request(reqwest::Method::PUT, self.url("/points?wait=true"))
                .json(&body),
        )
        .await?;
        tracing::debug!(file_id, points = texts.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        file_id: &str,
    ) -> Result<Vec<ScoredChunk>, ProviderError> {
        let json = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/search"))
                    .json(&search_body(vector, limit, file_id)),
            )
            .await?;
        parse_search_response(json)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError> {
        self.send(
            self.request(reqwest::Method::POST, self.url("/points/delete?wait=true"))
                .json(&delete_body(file_id)),
        )
        .await?;
        Ok(())
    }
}
