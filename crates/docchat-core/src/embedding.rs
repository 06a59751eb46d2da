//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! the batching helpers used by the upload and answer pipelines, and
//! cosine similarity for the in-memory vector store.
//!
//! Concrete providers (OpenAI-compatible HTTP, disabled) live in the
//! `docchat` app crate.

use async_trait::async_trait;

use crate::error::ProviderError;

/// Trait for embedding providers.
///
/// `embed` must return exactly one vector per input, in input order.
/// Use [`embed_batch`] rather than calling it directly so that count
/// mismatches are caught in one place.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"embed-v4.0"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts in a single provider request.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embed `texts` through one provider call, checking the result count
/// and, when `dims()` is non-zero, every vector's length.
///
/// An empty input returns an empty output without calling the provider.
pub async fn embed_batch(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(ProviderError::CountMismatch {
            service: embedder.model_name().to_string(),
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    let dims = embedder.dims();
    if dims > 0 {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(ProviderError::DimensionMismatch {
                service: embedder.model_name().to_string(),
                expected: dims,
                got: bad.len(),
            });
        }
    }
    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, ProviderError> {
    let mut vectors = embed_batch(embedder, &[text.to_string()]).await?;
    vectors.pop().ok_or_else(|| ProviderError::CountMismatch {
        service: embedder.model_name().to_string(),
        expected: 1,
        got: 0,
    })
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            // Drops the last input on purpose.
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct PanickingEmbedder;

    #[async_trait]
    impl Embedder for PanickingEmbedder {
        fn model_name(&self) -> &str {
            "panics"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            panic!("must not be called for empty input");
        }
    }

    #[tokio::test]
    async fn test_count_mismatch_is_an_error() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_batch(&ShortEmbedder, &texts).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::CountMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    /// Claims 3 dimensions but returns 2.
    struct MisconfiguredEmbedder;

    #[async_trait]
    impl Embedder for MisconfiguredEmbedder {
        fn model_name(&self) -> &str {
            "misconfigured"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_wrong_dimensionality_is_an_error() {
        let err = embed_batch(&MisconfiguredEmbedder, &["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::DimensionMismatch {
                expected: 3,
                got: 2,
                ..
            }
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_provider() {
        let out = embed_batch(&PanickingEmbedder, &[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
