//! Context assembly: dedup, rank, budget, and score confidence.
//!
//! Retrieval hands back a heterogeneous pile of vector and structured hits;
//! this module turns it into the bounded, deterministic context the
//! generator is allowed to see. The output ordering is a pure function of
//! the input set (stable sort with total tie-breaking), so identical
//! retrievals always produce identical prompts.
//!
//! An empty [`AnswerContext`] is a meaningful value: it is the explicit
//! "insufficient data" signal, and downstream code must surface it rather
//! than paper over it.

use serde::Serialize;
use std::collections::HashMap;
use tender_ai_context::token_count;
use tender_ai_retriever::retrieval::types::SearchResult;
use tender_ai_retriever::storage::ContentHash;

/// Categorical summary of retrieval quality, derived from the average
/// similarity of the included results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Confidence {
    /// No results at all: the explicit insufficient-data signal.
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Bucket an average similarity. Monotonic: a higher average never maps
    /// to a lower bucket.
    pub fn from_average(average_similarity: f32, included: usize) -> Self {
        if included == 0 {
            Self::None
        } else if average_similarity >= 0.8 {
            Self::High
        } else if average_similarity >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Ordered, deduplicated, token-bounded retrieval context.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerContext {
    pub results: Vec<SearchResult>,
    pub total_tokens: usize,
    pub confidence: Confidence,
}

impl AnswerContext {
    /// True when retrieval found nothing usable: the insufficient-data
    /// case, which short-circuits generation.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn average_similarity(&self) -> f32 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.results.iter().map(SearchResult::score).sum::<f32>() / self.results.len() as f32
    }
}

/// Builds an [`AnswerContext`] under a token budget.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_tokens: usize,
}

impl ContextAssembler {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Assemble with similarity-only ranking.
    pub fn assemble(&self, results: Vec<SearchResult>) -> AnswerContext {
        self.assemble_with_priority(results, false)
    }

    /// Assemble, optionally ranking structured hits ahead of vector hits
    /// (the item-level precedence rule). The tier only reorders; scores are
    /// left honest so confidence still reflects retrieval quality.
    pub fn assemble_with_priority(
        &self,
        results: Vec<SearchResult>,
        structured_first: bool,
    ) -> AnswerContext {
        // Dedup by content hash, keeping the higher-scoring duplicate
        // (more recent wins a score tie).
        let mut by_hash: HashMap<ContentHash, SearchResult> = HashMap::new();
        for result in results {
            let hash = result.content_hash();
            let replace = match by_hash.get(&hash) {
                Some(existing) => {
                    existing.score() < result.score()
                        || (existing.score() == result.score()
                            && existing.recency() < result.recency())
                }
                None => true,
            };
            if replace {
                by_hash.insert(hash, result);
            }
        }

        let mut deduped: Vec<SearchResult> = by_hash.into_values().collect();
        deduped.sort_by(|a, b| {
            let tier_a = if structured_first && a.is_structured() { 0 } else { 1 };
            let tier_b = if structured_first && b.is_structured() { 0 } else { 1 };
            tier_a
                .cmp(&tier_b)
                .then_with(|| {
                    b.score()
                        .partial_cmp(&a.score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.recency().cmp(&a.recency()))
                .then_with(|| a.text().cmp(b.text()))
        });

        // Greedy accumulation: results that would blow the budget are
        // skipped, later smaller results may still fit.
        let mut included = Vec::new();
        let mut total_tokens = 0usize;
        for result in deduped {
            let tokens = token_count(result.text());
            if total_tokens + tokens > self.max_tokens {
                continue;
            }
            total_tokens += tokens;
            included.push(result);
        }

        let average = if included.is_empty() {
            0.0
        } else {
            included.iter().map(SearchResult::score).sum::<f32>() / included.len() as f32
        };
        let confidence = Confidence::from_average(average, included.len());

        AnswerContext {
            results: included,
            total_tokens,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tender_ai_retriever::retrieval::types::{
        StructuredResult, StructuredSource, VectorResult,
    };

    fn vector(text: &str, score: f32, day: u32) -> SearchResult {
        SearchResult::Vector(VectorResult {
            chunk_id: day as i64,
            source_doc_id: format!("doc-{day}"),
            source_tender_id: None,
            chunk_index: 0,
            text: text.to_string(),
            score,
            indexed_at: Utc
                .with_ymd_and_hms(2024, 5, day, 0, 0, 0)
                .single()
                .expect("valid date"),
        })
    }

    fn structured(text: &str, score: f32) -> SearchResult {
        SearchResult::Structured(StructuredResult {
            source: StructuredSource::AwardItems,
            row_id: None,
            text: text.to_string(),
            score,
            effective_at: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid date"),
            citation: "award_items".to_string(),
        })
    }

    #[test]
    fn dedup_keeps_the_higher_scoring_duplicate() {
        let assembler = ContextAssembler::new(1000);
        let context = assembler.assemble(vec![
            vector("surgical drapes, sterile", 0.5, 1),
            vector("Surgical  Drapes, STERILE", 0.9, 2),
        ]);
        assert_eq!(context.results.len(), 1);
        assert_eq!(context.results[0].score(), 0.9);
    }

    #[test]
    fn results_sort_by_similarity_descending() {
        let assembler = ContextAssembler::new(1000);
        let context = assembler.assemble(vec![
            vector("low match", 0.3, 1),
            vector("high match", 0.9, 2),
            vector("mid match", 0.6, 3),
        ]);
        let scores: Vec<f32> = context.results.iter().map(SearchResult::score).collect();
        assert_eq!(scores, vec![0.9, 0.6, 0.3]);
    }

    #[test]
    fn equal_scores_break_ties_by_recency() {
        let assembler = ContextAssembler::new(1000);
        let context = assembler.assemble(vec![
            vector("older chunk", 0.7, 1),
            vector("newer chunk", 0.7, 20),
        ]);
        assert_eq!(context.results[0].text(), "newer chunk");
    }

    #[test]
    fn assembly_is_idempotent_and_order_insensitive() {
        let assembler = ContextAssembler::new(1000);
        let hits = vec![
            vector("alpha result", 0.8, 1),
            vector("beta result", 0.6, 2),
            structured("gamma fact", 0.7),
        ];
        let mut shuffled = hits.clone();
        shuffled.reverse();

        let first = assembler.assemble(hits);
        let second = assembler.assemble(shuffled);
        let texts = |context: &AnswerContext| {
            context
                .results
                .iter()
                .map(|result| result.text().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(texts(&first), texts(&second));
        assert_eq!(first.total_tokens, second.total_tokens);
    }

    #[test]
    fn token_budget_is_respected() {
        let assembler = ContextAssembler::new(10);
        let long = "word ".repeat(30);
        let context = assembler.assemble(vec![
            vector(&long, 0.9, 1),
            vector("short high-value fact", 0.8, 2),
        ]);
        // The oversized top hit is skipped; the short one still fits.
        assert_eq!(context.results.len(), 1);
        assert!(context.total_tokens <= 10);
        assert_eq!(context.results[0].score(), 0.8);
    }

    #[test]
    fn confidence_buckets_follow_average_similarity() {
        let assembler = ContextAssembler::new(1000);
        let high = assembler.assemble(vec![vector("a", 0.9, 1), vector("b", 0.85, 2)]);
        assert_eq!(high.confidence, Confidence::High);

        let medium = assembler.assemble(vec![vector("c", 0.65, 1), vector("d", 0.6, 2)]);
        assert_eq!(medium.confidence, Confidence::Medium);

        let low = assembler.assemble(vec![vector("e", 0.2, 1)]);
        assert_eq!(low.confidence, Confidence::Low);

        let none = assembler.assemble(vec![]);
        assert_eq!(none.confidence, Confidence::None);
        assert!(none.is_empty());
    }

    #[test]
    fn confidence_is_monotonic_in_average_similarity() {
        for (lower, higher) in [(0.1f32, 0.5f32), (0.5, 0.7), (0.7, 0.95), (0.59, 0.61)] {
            let a = Confidence::from_average(lower, 2);
            let b = Confidence::from_average(higher, 2);
            assert!(b >= a, "avg {higher} must not bucket below avg {lower}");
        }
    }

    #[test]
    fn structured_priority_reorders_without_rescoring() {
        let assembler = ContextAssembler::new(1000);
        let hits = vec![
            vector("very similar chunk", 0.95, 1),
            structured("awarded price fact", 0.7),
        ];
        let plain = assembler.assemble_with_priority(hits.clone(), false);
        assert!(!plain.results[0].is_structured());

        let prioritized = assembler.assemble_with_priority(hits, true);
        assert!(prioritized.results[0].is_structured());
        assert_eq!(prioritized.results[0].score(), 0.7);
    }
}
