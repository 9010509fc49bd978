//! Configuration for the remote embedding client

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Environment variable consulted for the embedding service API key.
pub const API_KEY_ENV: &str = "TENDER_AI_EMBED_API_KEY";

/// Configuration for a remote embedding service.
///
/// The vector dimension is part of the configuration and treated as a fixed
/// constant: the provider rejects responses whose vectors disagree with it.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Base URL of the embeddings endpoint.
    pub endpoint: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Fixed embedding vector dimension.
    pub dimension: usize,
    /// API key. Usually populated from [`API_KEY_ENV`] rather than a config
    /// file, so it never lands on disk.
    #[builder(default)]
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Maximum texts per request. Batches larger than this are split.
    #[builder(default = "100")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum in-flight batch requests.
    #[builder(default = "4")]
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retry attempts after the first failure.
    #[builder(default = "3")]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each subsequent one.
    #[builder(default = "250")]
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Per-request timeout in seconds.
    #[builder(default = "30")]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    100
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    250
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder.
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Convenience constructor for the common endpoint/model/dimension case.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        EmbedConfigBuilder::default()
            .endpoint(endpoint)
            .model(model)
            .dimension(dimension)
            .build()
            .expect("EmbedConfig builder with all required fields set")
    }

    /// Pull the API key from [`API_KEY_ENV`] if it is not already set.
    pub fn with_api_key_from_env(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var(API_KEY_ENV).ok();
        }
        self
    }

    /// Validate the configuration. Failures here are
    /// [`EmbedError::Configuration`]: fatal, surfaced immediately, no retry.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(EmbedError::configuration("embedding endpoint is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(EmbedError::configuration("embedding model is empty"));
        }
        if self.dimension == 0 {
            return Err(EmbedError::configuration("embedding dimension must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::configuration("batch size must be > 0"));
        }
        if self.max_concurrency == 0 {
            return Err(EmbedError::configuration("max concurrency must be > 0"));
        }
        Ok(())
    }
}
