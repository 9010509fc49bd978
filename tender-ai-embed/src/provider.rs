//! Embedding provider implementations.
//!
//! The embedding model itself lives behind an HTTP service; this module
//! provides the client side: a provider trait the rest of the system
//! programs against, and [`RemoteEmbedProvider`], which batches texts,
//! bounds in-flight requests with a semaphore, retries transient failures
//! with exponential backoff, and normalizes the returned vectors to f16.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use half::f16;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result; the dimension is inferred from the
    /// first vector (0 when empty).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// HTTP client for a remote embedding service.
///
/// From the caller's view [`embed_texts`](EmbeddingProvider::embed_texts) is
/// one synchronous call; internally the input is split into batches of at
/// most `batch_size` texts, batches run concurrently up to
/// `max_concurrency`, and each batch retries up to `max_retries` times with
/// exponential backoff before failing.
#[derive(Clone)]
pub struct RemoteEmbedProvider {
    config: EmbedConfig,
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for RemoteEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedProvider")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl RemoteEmbedProvider {
    /// Create a provider for the given configuration.
    ///
    /// Validates the configuration up front: a missing endpoint or zero
    /// dimension is [`EmbedError::Configuration`] and is never retried.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrency));
        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f16>>> {
        let mut attempt = 0u32;
        loop {
            match self.request_embeddings(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.initial_backoff_ms, attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "embedding request failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f16>>> {
        let body = EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::service(status.as_u16(), message));
        }

        let payload: EmbeddingsResponse = response.json().await?;
        if payload.data.len() != texts.len() {
            return Err(EmbedError::malformed(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                payload.data.len()
            )));
        }

        let mut vectors = Vec::with_capacity(payload.data.len());
        for row in payload.data {
            if row.embedding.len() != self.config.dimension {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: row.embedding.len(),
                });
            }
            vectors.push(normalize_to_f16(row.embedding));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::malformed("no embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let batches: Vec<&[String]> = texts.chunks(self.config.batch_size).collect();
        tracing::debug!(
            texts = texts.len(),
            batches = batches.len(),
            "generating embeddings"
        );

        let futures = batches.into_iter().map(|batch| async move {
            let _permit = self
                .limiter
                .acquire()
                .await
                .expect("embedding semaphore is never closed");
            self.embed_batch(batch).await
        });

        let results = futures::future::try_join_all(futures).await?;
        let all_embeddings: Vec<Vec<f16>> = results.into_iter().flatten().collect();

        tracing::debug!(embeddings = all_embeddings.len(), "embeddings generated");
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "remote-http"
    }
}

/// Exponential backoff: `initial_ms * 2^attempt`, capped at 10 seconds.
fn backoff_delay(initial_ms: u64, attempt: u32) -> Duration {
    let ms = initial_ms.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(ms.min(10_000))
}

/// Convert an f32 vector to unit-norm f16, matching how stored chunk
/// embeddings are kept so cosine similarity reduces to a dot product.
fn normalize_to_f16(embedding: Vec<f32>) -> Vec<f16> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding
            .into_iter()
            .map(|x| f16::from_f32(x / norm))
            .collect()
    } else {
        embedding.into_iter().map(f16::from_f32).collect()
    }
}
