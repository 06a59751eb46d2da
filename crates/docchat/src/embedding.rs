//! Embedding provider implementations.
//!
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAiCompatibleEmbedder`]**: calls any OpenAI-compatible
//!   `POST {base_url}/embeddings` endpoint (Cohere's compatibility API by
//!   default) with batching, retry, and backoff.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the
//! configuration.
//!
//! # Retry Strategy
//!
//! Shared with the chat providers through [`send_with_retry`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use docchat_core::embedding::Embedder;
use docchat_core::error::ProviderError;

use crate::config::{secret_from_env, EmbeddingConfig};

/// Instantiate the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiCompatibleEmbedder::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// An embedding provider that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Disabled("embedding".to_string()))
    }
}

// ============ OpenAI-compatible Provider ============

const SERVICE: &str = "embeddings";

/// Embedding provider for OpenAI-compatible HTTP APIs.
///
/// The API key is read from the environment variable named by
/// `embedding.api_key_env` on every call, so a missing key only fails the
/// requests that need it.
pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
    api_key_env: String,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if secret_from_env(&config.api_key_env).is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "embedding API key is not set; embedding requests will fail"
            );
        }

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
            api_key_env: config.api_key_env.clone(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn embed_one_batch(
        &self,
        api_key: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body);
        let json = send_with_retry(SERVICE, request, self.max_retries).await?;
        parse_embeddings_response(&json, texts.len())
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let api_key = secret_from_env(&self.api_key_env).ok_or_else(|| ProviderError::Config {
            service: SERVICE.to_string(),
            message: format!("{} is not set", self.api_key_env),
        })?;

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.embed_one_batch(&api_key, batch).await?;
            tracing::debug!(batch = batch.len(), model = %self.model, "embedded batch");
            out.extend(vectors);
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Parse an OpenAI-style embeddings response and return the vectors in
/// input order (by each item's `index`, falling back to array position).
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let parsed: EmbeddingsResponse =
        serde_json::from_value(json.clone()).map_err(|e| ProviderError::decode(SERVICE, e))?;

    if parsed.data.len() != expected {
        return Err(ProviderError::CountMismatch {
            service: SERVICE.to_string(),
            expected,
            got: parsed.data.len(),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in parsed.data.into_iter().enumerate() {
        let index = item.index.unwrap_or(position);
        match slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(item.embedding),
            _ => {
                return Err(ProviderError::decode(
                    SERVICE,
                    format!("invalid or repeated index {}", index),
                ))
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| ProviderError::decode(SERVICE, "missing embedding")))
        .collect()
}

/// Send a JSON request with exponential-backoff retry and return the
/// decoded JSON body of the first successful response.
pub(crate) async fn send_with_retry(
    service: &str,
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<serde_json::Value, ProviderError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let Some(request) = request.try_clone() else {
            return Err(ProviderError::http(service, "request body is not retryable"));
        };

        let err = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| ProviderError::decode(service, e));
                }
                let body = response.text().await.unwrap_or_default();
                ProviderError::Status {
                    service: service.to_string(),
                    status: status.as_u16(),
                    body,
                }
            }
            Err(e) => ProviderError::http(service, e),
        };

        if !err.is_transient() {
            return Err(err);
        }
        tracing::warn!(service, attempt, error = %err, "transient provider error");
        last_err = Some(err);
    }

    Err(last_err.unwrap_or_else(|| ProviderError::http(service, "failed after retries")))
}
