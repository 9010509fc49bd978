//! Engine configuration: one TOML file plus environment variables for
//! secrets.
//!
//! Everything tunable in the pipeline lives here with a default, so a
//! minimal config only names the store path and the two service endpoints.
//! API keys are read from `TENDER_AI_EMBED_API_KEY` /
//! `TENDER_AI_LLM_API_KEY` rather than the file, so they never land on
//! disk.

use crate::error::{AnswerError, Result};
use crate::generate::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tender_ai_embed::EmbedConfig;
use tender_ai_retriever::retrieval::structured::StructuredSearchConfig;

/// Top-level configuration for the answer engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the SQLite store produced by ingestion/extraction.
    pub store_path: PathBuf,
    pub embedding: EmbedConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

/// Retrieval-phase tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Vector results requested per question.
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    /// Similarity a vector hit must reach to count toward sufficiency.
    #[serde(default = "default_sufficiency_threshold")]
    pub sufficiency_threshold: f32,
    /// Vector hits at or above the threshold needed to skip the fallback
    /// (for tender-level questions; item-level always runs it).
    #[serde(default = "default_sufficiency_count")]
    pub sufficiency_count: usize,
    /// Token budget of the assembled answer context.
    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,
    /// Bound on the whole retrieval phase; on expiry the orchestrator
    /// proceeds with whatever arrived.
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
    /// Rows per structured keyword sub-query.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    /// Years of history in aggregates and tender search.
    #[serde(default = "default_lookback_years")]
    pub lookback_years: i32,
    /// Suppliers returned by ranking sub-queries.
    #[serde(default = "default_supplier_top_n")]
    pub supplier_top_n: usize,
    /// Per-source budget inside the structured fan-out.
    #[serde(default = "default_per_source_budget_ms")]
    pub per_source_budget_ms: u64,
}

fn default_vector_top_k() -> usize {
    10
}
fn default_sufficiency_threshold() -> f32 {
    0.6
}
fn default_sufficiency_count() -> usize {
    2
}
fn default_context_max_tokens() -> usize {
    2000
}
fn default_retrieval_timeout_ms() -> u64 {
    5000
}
fn default_row_limit() -> usize {
    100
}
fn default_lookback_years() -> i32 {
    3
}
fn default_supplier_top_n() -> usize {
    5
}
fn default_per_source_budget_ms() -> u64 {
    1500
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: default_vector_top_k(),
            sufficiency_threshold: default_sufficiency_threshold(),
            sufficiency_count: default_sufficiency_count(),
            context_max_tokens: default_context_max_tokens(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            row_limit: default_row_limit(),
            lookback_years: default_lookback_years(),
            supplier_top_n: default_supplier_top_n(),
            per_source_budget_ms: default_per_source_budget_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    /// The slice of this config the structured searcher consumes.
    pub fn structured(&self) -> StructuredSearchConfig {
        StructuredSearchConfig {
            row_limit: self.row_limit,
            lookback_years: self.lookback_years,
            supplier_top_n: self.supplier_top_n,
            per_source_budget: Duration::from_millis(self.per_source_budget_ms),
        }
    }
}

/// Chunker settings used by the ingest path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_chunk_overlap_tokens")]
    pub overlap_tokens: usize,
}

fn default_chunk_max_tokens() -> usize {
    500
}
fn default_chunk_overlap_tokens() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chunk_max_tokens(),
            overlap_tokens: default_chunk_overlap_tokens(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AnswerError::configuration(format!("cannot read config {}: {err}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|err| {
            AnswerError::configuration(format!("cannot parse config {}: {err}", path.display()))
        })?;
        Ok(config)
    }

    /// Populate both service API keys from the environment where unset.
    pub fn with_api_keys_from_env(mut self) -> Self {
        self.embedding = self.embedding.with_api_key_from_env();
        self.generation = self.generation.with_api_key_from_env();
        self
    }

    /// Validate everything that must be present before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.store_path.as_os_str().is_empty() {
            return Err(AnswerError::configuration("store_path is empty"));
        }
        self.embedding
            .validate()
            .map_err(|err| AnswerError::configuration(err.to_string()))?;
        self.generation.validate()?;
        if self.retrieval.vector_top_k == 0 {
            return Err(AnswerError::configuration("vector_top_k must be > 0"));
        }
        if self.retrieval.context_max_tokens == 0 {
            return Err(AnswerError::configuration("context_max_tokens must be > 0"));
        }
        Ok(())
    }
}
