//! # tender-ai-answer
//!
//! The top of the tender-ai pipeline: question in, grounded answer out.
//! This crate combines the other workspace members into one engine:
//!
//! - [`classify`]: bilingual rule-table intent classification
//!   (item-level vs. tender-level)
//! - [`assemble`]: dedup, deterministic ranking, token budgeting, and
//!   confidence scoring of merged retrieval results
//! - [`generate`]: prompt building and the generation-service client
//! - [`orchestrator`]: the explicit state machine tying retrieval,
//!   fallback, and generation together
//! - [`config`]: one TOML file plus env-var secrets for everything tunable
//!
//! ## Quick Start
//!
//! ```no_run
//! use tender_ai_answer::{EngineConfig, build_orchestrator};
//! use tender_ai_retriever::retrieval::types::SearchFilters;
//!
//! # async fn example() -> tender_ai_answer::Result<()> {
//! let config = EngineConfig::load(std::path::Path::new("tender-ai.toml"))?
//!     .with_api_keys_from_env();
//! let orchestrator = build_orchestrator(&config).await?;
//!
//! let answer = orchestrator
//!     .answer("What are past prices for surgical drapes?", &[], &SearchFilters::default())
//!     .await?;
//! println!("[{}] {}", answer.confidence.label(), answer.text);
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod classify;
pub mod config;
pub mod error;
pub mod generate;
pub mod orchestrator;

pub use assemble::{AnswerContext, Confidence, ContextAssembler};
pub use classify::{QueryClassifier, QueryIntent, extract_keywords};
pub use config::{ChunkingConfig, EngineConfig, RetrievalConfig};
pub use error::{AnswerError, Result};
pub use generate::{
    ChatRole, ChatTurn, GenerationConfig, GenerationProvider, PromptBuilder,
    RemoteGenerationProvider,
};
pub use orchestrator::{AnswerOrchestrator, GroundedAnswer, NO_DATA_ANSWER, RetrievalStatus};

use std::sync::Arc;
use tender_ai_embed::{EmbeddingProvider, RemoteEmbedProvider};
use tender_ai_retriever::retrieval::structured::StructuredSearcher;
use tender_ai_retriever::retrieval::vector_index::VectorIndex;
use tender_ai_retriever::storage::tender_store::TenderStore;

/// Open the configured store and wire a complete orchestrator with the
/// remote embedding and generation providers.
pub async fn build_orchestrator(config: &EngineConfig) -> Result<AnswerOrchestrator> {
    config.validate()?;
    let store = TenderStore::open(&config.store_path).await?;
    build_orchestrator_with_store(config, store)
}

/// Wire an orchestrator over an already-open store (used by the CLI, which
/// shares the store across subcommands, and by tests).
pub fn build_orchestrator_with_store(
    config: &EngineConfig,
    store: TenderStore,
) -> Result<AnswerOrchestrator> {
    let vector_index = VectorIndex::new(store.clone());
    let structured = StructuredSearcher::new(store, config.retrieval.structured());
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(RemoteEmbedProvider::new(config.embedding.clone())?);
    let generator: Arc<dyn GenerationProvider> =
        Arc::new(RemoteGenerationProvider::new(config.generation.clone())?);
    Ok(AnswerOrchestrator::new(
        vector_index,
        structured,
        embedder,
        generator,
        config.retrieval.clone(),
        config.generation.clone(),
    ))
}
