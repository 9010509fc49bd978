//! End-to-end tests of the answer pipeline over in-memory and temp-file
//! stores with deterministic stub providers.
//!
//! These cover the behavior the product depends on:
//! - the historical-prices scenario over seeded award rows
//! - the explicit insufficient-data answer (never a fabricated one)
//! - structured-only degradation when the embedding service is down
//! - generation retried exactly once, then surfaced as an error
//! - vector sufficiency short-circuiting the fallback for tender-level
//!   questions

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use half::f16;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tender_ai_answer::{
    AnswerError, AnswerOrchestrator, Confidence, GenerationConfig, GenerationProvider,
    NO_DATA_ANSWER, QueryIntent, RetrievalConfig, RetrievalStatus,
};
use tender_ai_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use tender_ai_retriever::retrieval::structured::{StructuredSearchConfig, StructuredSearcher};
use tender_ai_retriever::retrieval::types::SearchFilters;
use tender_ai_retriever::retrieval::vector_index::VectorIndex;
use tender_ai_retriever::storage::tender_store::TenderStore;
use tender_ai_retriever::storage::{AwardItem, ChunkRecord};

/// Deterministic two-dimensional embedder: text naming hospitals points one
/// way, furniture the other, everything else in between.
struct KeywordEmbedder;

fn stub_embedding(text: &str) -> Vec<f16> {
    let lower = text.to_lowercase();
    let raw: [f32; 2] = if lower.contains("hospital") {
        [1.0, 0.0]
    } else if lower.contains("furniture") {
        [0.0, 1.0]
    } else {
        [0.7, 0.7]
    };
    let norm = (raw[0] * raw[0] + raw[1] * raw[1]).sqrt();
    raw.iter().map(|x| f16::from_f32(x / norm)).collect()
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_text(&self, text: &str) -> tender_ai_embed::Result<Vec<f16>> {
        Ok(stub_embedding(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> tender_ai_embed::Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|text| stub_embedding(text)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        2
    }

    fn provider_name(&self) -> &str {
        "stub-keyword"
    }
}

/// Embedder that is permanently down (service errors, not config errors).
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_text(&self, _text: &str) -> tender_ai_embed::Result<Vec<f16>> {
        Err(EmbedError::service(503, "embedding backend unavailable"))
    }

    async fn embed_texts(&self, _texts: &[String]) -> tender_ai_embed::Result<EmbeddingResult> {
        Err(EmbedError::service(503, "embedding backend unavailable"))
    }

    fn embedding_dimension(&self) -> usize {
        2
    }

    fn provider_name(&self) -> &str {
        "stub-failing"
    }
}

/// Generator that records how often it is called and can be set to fail.
struct RecordingGenerator {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingGenerator {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for RecordingGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: usize,
    ) -> tender_ai_answer::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AnswerError::generation(1, "stub generation outage"));
        }
        Ok(format!(
            "Grounded answer over {} context characters.",
            prompt.len()
        ))
    }

    fn provider_name(&self) -> &str {
        "stub-recording"
    }
}

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        // Wide lookback so seeded historical years stay in the window.
        lookback_years: 10,
        ..Default::default()
    }
}

fn generation_config() -> GenerationConfig {
    let mut config = GenerationConfig::new("https://llm.example/v1/chat/completions", "stub");
    config.retry_backoff_ms = 10;
    config
}

fn orchestrator(
    store: TenderStore,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
) -> AnswerOrchestrator {
    let retrieval = retrieval_config();
    let structured_config = StructuredSearchConfig {
        lookback_years: retrieval.lookback_years,
        ..Default::default()
    };
    AnswerOrchestrator::new(
        VectorIndex::new(store.clone()),
        StructuredSearcher::new(store, structured_config),
        embedder,
        generator,
        retrieval,
        generation_config(),
    )
}

fn drape_award(year: i32, price: f64) -> AwardItem {
    AwardItem {
        id: None,
        tender_id: Some("T-1".to_string()),
        item_name: "surgical drapes".to_string(),
        supplier: Some("MedSupply".to_string()),
        unit_price: Some(price),
        quantity: Some(100.0),
        currency: Some("KZT".to_string()),
        unit: Some("piece".to_string()),
        awarded_at: Utc
            .with_ymd_and_hms(year, 3, 10, 9, 0, 0)
            .single()
            .expect("valid seed date"),
    }
}

fn hospital_chunk(index: usize, text: &str) -> ChunkRecord {
    ChunkRecord {
        id: None,
        source_doc_id: "hospital-tender-docs".to_string(),
        source_tender_id: Some("T-7".to_string()),
        chunk_index: index,
        content: text.to_string(),
        token_count: text.split_whitespace().count(),
        page: Some(index as u32 + 1),
        section: None,
        embedding: Some(stub_embedding("hospital")),
        indexed_at: None,
    }
}

#[tokio::test]
async fn past_prices_scenario_yields_both_year_aggregates() -> anyhow::Result<()> {
    // File-backed store: the structured fan-out runs its sub-queries
    // against a real pooled database, like production.
    let dir = tempfile::tempdir()?;
    let store = TenderStore::open(&dir.path().join("tender-ai.db")).await?;
    store.insert_award_item(&drape_award(2024, 150.0)).await?;
    store.insert_award_item(&drape_award(2023, 165.0)).await?;

    let generator = RecordingGenerator::healthy();
    let engine = orchestrator(store, Arc::new(KeywordEmbedder), generator.clone());

    let answer = engine
        .answer(
            "What are past prices for surgical drapes?",
            &[],
            &SearchFilters::default(),
        )
        .await?;

    assert_eq!(answer.intent, QueryIntent::ItemLevel);
    assert!(answer.confidence >= Confidence::Medium);
    assert!(!answer.is_no_data());
    assert_eq!(generator.call_count(), 1);

    // Both seeded years must appear as cited aggregates.
    let joined = answer.sources.join("\n");
    assert!(joined.contains("aggregate surgical drapes 2024"), "{joined}");
    assert!(joined.contains("aggregate surgical drapes 2023"), "{joined}");
    Ok(())
}

#[tokio::test]
async fn no_matching_data_yields_explicit_no_data_answer() -> anyhow::Result<()> {
    let store = TenderStore::open_memory().await?;
    let generator = RecordingGenerator::healthy();
    let engine = orchestrator(store, Arc::new(KeywordEmbedder), generator.clone());

    let answer = engine
        .answer(
            "price for unobtainium widgets",
            &[],
            &SearchFilters::default(),
        )
        .await?;

    assert_eq!(answer.confidence, Confidence::None);
    assert!(answer.is_no_data());
    assert_eq!(answer.text, NO_DATA_ANSWER);
    assert!(!answer.text.is_empty(), "no-data is a marker, not an empty string");
    assert!(answer.sources.is_empty());
    // The generator must never be asked to answer from nothing.
    assert_eq!(generator.call_count(), 0);
    Ok(())
}

#[tokio::test]
#[tracing_test::traced_test]
async fn embedding_outage_degrades_to_structured_only() -> anyhow::Result<()> {
    let store = TenderStore::open_memory().await?;
    store.insert_award_item(&drape_award(2024, 150.0)).await?;

    let generator = RecordingGenerator::healthy();
    let engine = orchestrator(store, Arc::new(FailingEmbedder), generator.clone());

    let answer = engine
        .answer(
            "What is the price for surgical drapes?",
            &[],
            &SearchFilters::default(),
        )
        .await?;

    assert!(!answer.is_no_data());
    assert!(answer.sources.iter().any(|source| source.contains("award_items")));
    assert_eq!(generator.call_count(), 1);
    assert!(logs_contain("structured-only mode"));
    Ok(())
}

#[tokio::test]
async fn generation_failure_is_retried_once_then_surfaced() -> anyhow::Result<()> {
    let store = TenderStore::open_memory().await?;
    store.insert_award_item(&drape_award(2024, 150.0)).await?;

    let generator = RecordingGenerator::broken();
    let engine = orchestrator(store, Arc::new(KeywordEmbedder), generator.clone());

    let result = engine
        .answer(
            "What is the price for surgical drapes?",
            &[],
            &SearchFilters::default(),
        )
        .await;

    match result {
        Err(AnswerError::Generation { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected a generation error, got {other:?}"),
    }
    assert_eq!(generator.call_count(), 2, "exactly one retry");
    Ok(())
}

#[tokio::test]
async fn sufficient_vector_coverage_skips_fallback_for_tender_level() -> anyhow::Result<()> {
    let store = TenderStore::open_memory().await?;
    store
        .upsert_chunk(&hospital_chunk(
            0,
            "The regional hospital tender covers three delivery lots.",
        ))
        .await?;
    store
        .upsert_chunk(&hospital_chunk(
            1,
            "Bids for the hospital tender close on May 1st.",
        ))
        .await?;

    let generator = RecordingGenerator::healthy();
    let engine = orchestrator(store, Arc::new(KeywordEmbedder), generator.clone());

    let answer = engine
        .answer(
            "Summarize the regional hospital tender documentation",
            &[],
            &SearchFilters::default(),
        )
        .await?;

    assert_eq!(answer.intent, QueryIntent::TenderLevel);
    assert_eq!(answer.retrieval_status, RetrievalStatus::Sufficient);
    assert!(answer.confidence >= Confidence::Medium);
    assert!(
        answer.sources.iter().all(|source| source.starts_with("document")),
        "only vector citations expected: {:?}",
        answer.sources
    );
    Ok(())
}
