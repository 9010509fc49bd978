//! Top-level answer orchestration.
//!
//! One question flows through a plain, inspectable state machine:
//!
//! ```text
//! CLASSIFY ─► VECTOR_SEARCH ─► sufficient? ──► ASSEMBLE ─► GENERATE ─► DONE
//!                  │               │ no                        │
//!                  │               └► STRUCTURED_FALLBACK ─────┘
//!                  └ (item-level questions always run the fallback)
//! ```
//!
//! Transitions are driven by explicit [`RetrievalStatus`] values rather
//! than exceptions: a timed-out vector search degrades to the fallback
//! path with whatever partial results arrived, an embedding outage flips
//! the question to structured-only mode, and an empty context becomes an
//! explicit insufficient-data answer that never reaches the generator.
//! Only two things surface as errors: broken configuration, and a
//! generation failure that survived its retry.

use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

use crate::assemble::{Confidence, ContextAssembler};
use crate::classify::{QueryClassifier, QueryIntent, extract_keywords};
use crate::config::RetrievalConfig;
use crate::error::{AnswerError, Result};
use crate::generate::{ChatTurn, GenerationConfig, GenerationProvider, PromptBuilder};
use tender_ai_embed::{EmbedError, EmbeddingProvider};
use tender_ai_retriever::retrieval::structured::StructuredSearcher;
use tender_ai_retriever::retrieval::types::{SearchFilters, SearchResult};
use tender_ai_retriever::retrieval::vector_index::VectorIndex;

/// Explicit no-data marker. Callers can rely on `confidence == None` rather
/// than parsing this text, but the text itself is never empty.
pub const NO_DATA_ANSWER: &str =
    "Insufficient data: no matching procurement records were found for this question.";

/// Outcome of the vector-search phase, driving the fallback transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetrievalStatus {
    /// Enough strong vector hits to answer without the fallback.
    Sufficient,
    /// Vector coverage too sparse; structured fallback engaged.
    Insufficient,
    /// The vector phase ran out of time; partial results only.
    TimedOut,
}

/// A grounded answer with its citations and quality signal.
#[derive(Debug, Clone, Serialize)]
pub struct GroundedAnswer {
    pub text: String,
    /// Citation labels of every context entry, in prompt order.
    pub sources: Vec<String>,
    pub confidence: Confidence,
    pub intent: QueryIntent,
    pub retrieval_status: RetrievalStatus,
    pub correlation_id: String,
}

impl GroundedAnswer {
    /// True when this is the explicit insufficient-data answer.
    pub fn is_no_data(&self) -> bool {
        self.confidence == Confidence::None
    }
}

/// Coordinates classification, retrieval, assembly, and generation. All
/// collaborators are injected; the orchestrator owns no ambient state.
pub struct AnswerOrchestrator {
    classifier: QueryClassifier,
    vector_index: VectorIndex,
    structured: StructuredSearcher,
    assembler: ContextAssembler,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    prompts: PromptBuilder,
    retrieval: RetrievalConfig,
    generation: GenerationConfig,
}

impl AnswerOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vector_index: VectorIndex,
        structured: StructuredSearcher,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        retrieval: RetrievalConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(),
            assembler: ContextAssembler::new(retrieval.context_max_tokens),
            prompts: PromptBuilder::default(),
            vector_index,
            structured,
            embedder,
            generator,
            retrieval,
            generation,
        }
    }

    /// Answer one question. `history` is prior conversation included in the
    /// prompt; `filters` narrow vector search to a tender or date range.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
        filters: &SearchFilters,
    ) -> Result<GroundedAnswer> {
        let correlation_id = correlation_id(question);
        let span = tracing::info_span!("answer", correlation_id = %correlation_id);
        self.answer_inner(question, history, filters, correlation_id)
            .instrument(span)
            .await
    }

    async fn answer_inner(
        &self,
        question: &str,
        history: &[ChatTurn],
        filters: &SearchFilters,
        correlation_id: String,
    ) -> Result<GroundedAnswer> {
        // CLASSIFY
        let intent = self.classifier.classify(question);
        let keywords = extract_keywords(question);
        tracing::info!(?intent, keywords = keywords.len(), "classified question");
        tracing::debug!(
            categories = ?self.classifier.matched_categories(question),
            "matched classification rules"
        );

        // VECTOR_SEARCH (time-bounded; embedding outage → structured-only).
        // Item-level questions always take the structured path as well, so
        // for them both retrieval phases run concurrently; tender-level
        // questions decide on the fallback from the vector outcome first.
        let (vector_outcome, item_level_structured) = if intent == QueryIntent::ItemLevel {
            let (vector, structured) = tokio::join!(
                self.vector_phase(question, filters),
                self.structured_phase(intent, &keywords)
            );
            (vector?, Some(structured))
        } else {
            (self.vector_phase(question, filters).await?, None)
        };

        let (vector_results, vector_timed_out) = vector_outcome;
        let status = if vector_timed_out {
            RetrievalStatus::TimedOut
        } else if is_sufficient(
            &vector_results,
            self.retrieval.sufficiency_threshold,
            self.retrieval.sufficiency_count,
        ) {
            RetrievalStatus::Sufficient
        } else {
            RetrievalStatus::Insufficient
        };
        tracing::info!(results = vector_results.len(), ?status, "vector phase complete");

        // STRUCTURED_FALLBACK. Already in flight for item-level questions
        // (the tables are historically denser than vector coverage for item
        // facts); engaged for tender-level ones only when vector coverage
        // fell short.
        let structured_outcome = match item_level_structured {
            Some(outcome) => Some(outcome),
            None if status != RetrievalStatus::Sufficient => {
                Some(self.structured_phase(intent, &keywords).await)
            }
            None => None,
        };
        let structured_results = match structured_outcome {
            Some(Ok(results)) => results,
            Some(Err(err)) => {
                // Partial-result path: a broken structured search must not
                // take down an answer the vector side can carry.
                tracing::warn!("structured search failed, continuing without it: {err:#}");
                Vec::new()
            }
            None => Vec::new(),
        };

        // ASSEMBLE. Structured results outrank vector results for
        // item-level answers (observed product precedence).
        let mut merged = structured_results;
        merged.extend(vector_results);
        let context = self
            .assembler
            .assemble_with_priority(merged, intent == QueryIntent::ItemLevel);
        tracing::info!(
            included = context.results.len(),
            total_tokens = context.total_tokens,
            confidence = context.confidence.label(),
            "context assembled"
        );

        if context.is_empty() {
            tracing::info!("no usable results; returning explicit insufficient-data answer");
            return Ok(GroundedAnswer {
                text: NO_DATA_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: Confidence::None,
                intent,
                retrieval_status: status,
                correlation_id,
            });
        }

        // EXTERNAL_GENERATE (one retry with backoff, then explicit error)
        let prompt = self.prompts.build(&context, history, question);
        let text = self.generate_with_retry(&prompt).await?;

        Ok(GroundedAnswer {
            sources: context.results.iter().map(SearchResult::source).collect(),
            confidence: context.confidence,
            text,
            intent,
            retrieval_status: status,
            correlation_id,
        })
    }

    /// Embed the question and run the bounded vector search. Returns the
    /// hits plus whether the phase timed out. An embedding-service outage
    /// (already retried inside the provider) degrades to structured-only
    /// mode; an embedding configuration error is fatal.
    async fn vector_phase(
        &self,
        question: &str,
        filters: &SearchFilters,
    ) -> Result<(Vec<SearchResult>, bool)> {
        let query = match self.embedder.embed_text(question).await {
            Ok(vector) => vector,
            Err(err @ EmbedError::Configuration { .. }) => return Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    "embedding failed after retries, falling back to structured-only mode: {err}"
                );
                return Ok((Vec::new(), false));
            }
        };

        let search = self
            .vector_index
            .search(&query, self.retrieval.vector_top_k, filters);
        match tokio::time::timeout(self.retrieval.timeout(), search).await {
            Ok(Ok(results)) => Ok((results, false)),
            Ok(Err(err)) => {
                tracing::warn!("vector search failed, continuing with fallback: {err:#}");
                Ok((Vec::new(), false))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.retrieval.retrieval_timeout_ms,
                    "vector search timed out; proceeding with partial results"
                );
                Ok((Vec::new(), true))
            }
        }
    }

    async fn structured_phase(
        &self,
        intent: QueryIntent,
        keywords: &[String],
    ) -> anyhow::Result<Vec<SearchResult>> {
        let findings = match intent {
            QueryIntent::ItemLevel => self.structured.search_item_level(keywords).await?,
            QueryIntent::TenderLevel => self.structured.search_tender_level(keywords).await?,
        };
        if !findings.dropped_sources.is_empty() {
            tracing::warn!(
                dropped = ?findings.dropped_sources,
                "structured sources dropped for exceeding their budget"
            );
        }
        Ok(findings
            .results
            .into_iter()
            .map(SearchResult::Structured)
            .collect())
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String> {
        let temperature = self.generation.temperature;
        let max_tokens = self.generation.max_tokens;
        match self.generator.generate(prompt, temperature, max_tokens).await {
            Ok(text) => Ok(text),
            Err(first_err) => {
                tracing::warn!("generation failed, retrying once after backoff: {first_err}");
                tokio::time::sleep(self.generation.retry_backoff()).await;
                self.generator
                    .generate(prompt, temperature, max_tokens)
                    .await
                    .map_err(|second_err| {
                        tracing::error!("generation failed on retry: {second_err}");
                        AnswerError::generation(2, second_err.to_string())
                    })
            }
        }
    }
}

/// Sufficiency rule: at least `count` results at or above `threshold`.
fn is_sufficient(results: &[SearchResult], threshold: f32, count: usize) -> bool {
    results
        .iter()
        .filter(|result| result.score() >= threshold)
        .count()
        >= count
}

/// Short request identifier carried through every log line of one answer.
/// Salted with a process-wide sequence number so ids stay distinct even on
/// coarse clocks.
fn correlation_id(question: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = blake3::Hasher::new();
    hasher.update(question.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.finalize().to_hex()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tender_ai_retriever::retrieval::types::VectorResult;

    fn hit(score: f32) -> SearchResult {
        SearchResult::Vector(VectorResult {
            chunk_id: 0,
            source_doc_id: "doc".to_string(),
            source_tender_id: None,
            chunk_index: 0,
            text: format!("text at {score}"),
            score,
            indexed_at: Utc::now(),
        })
    }

    #[test]
    fn sufficiency_needs_two_strong_hits() {
        assert!(is_sufficient(&[hit(0.8), hit(0.65)], 0.6, 2));
        assert!(!is_sufficient(&[hit(0.8), hit(0.5)], 0.6, 2));
        assert!(!is_sufficient(&[hit(0.95)], 0.6, 2));
        assert!(!is_sufficient(&[], 0.6, 2));
    }

    #[test]
    fn correlation_ids_are_short_and_distinct_per_call() {
        let a = correlation_id("same question");
        let b = correlation_id("same question");
        assert_eq!(a.len(), 12);
        assert_ne!(a, b, "sequence salt keeps ids distinct");
    }
}
