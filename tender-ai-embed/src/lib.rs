//! # tender-ai-embed
//!
//! Client library for a remote text-embedding service, used to vectorize
//! procurement document chunks and user questions. The embedding model
//! itself is external; this crate owns batching, concurrency limiting,
//! retries, and vector normalization.
//!
//! ## Features
//!
//! - **Async-First Design**: Full async/await support with tokio integration
//! - **Batching**: Up to `batch_size` texts per request (default 100) to
//!   amortize external latency
//! - **Bounded Concurrency**: A semaphore caps in-flight requests to respect
//!   service rate limits
//! - **Retries**: Transient failures retry up to 3 times with exponential
//!   backoff; configuration errors fail fast
//! - **Half-Precision**: Vectors are unit-normalized f16, so similarity is a
//!   plain dot product downstream
//!
//! ## Quick Start
//!
//! ```no_run
//! use tender_ai_embed::{EmbedConfig, EmbeddingProvider, RemoteEmbedProvider};
//!
//! # async fn example() -> tender_ai_embed::Result<()> {
//! let config = EmbedConfig::new("https://embed.example/v1/embeddings", "bge-m3", 1024)
//!     .with_api_key_from_env();
//! let provider = RemoteEmbedProvider::new(config)?;
//!
//! let texts = vec!["surgical drapes, sterile, single use".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`]
//! type. Configuration problems (missing endpoint, zero dimension) surface
//! immediately and are never retried; transport errors and 429/5xx statuses
//! are retried before surfacing.

pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use config::{API_KEY_ENV, EmbedConfig, EmbedConfigBuilder};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, RemoteEmbedProvider};
