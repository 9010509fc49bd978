//! Result types shared by the vector index and the structured searcher.
//!
//! Retrieval produces heterogeneous hits (document chunks, awarded item
//! rows, plan rows, tender rows). [`SearchResult`] is the tagged union the
//! rest of the pipeline consumes through one accessor surface: score, text,
//! source label, recency.

use crate::storage::{ContentHash, content_hash};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which structured table a hit came from. Attribution is preserved through
/// merging so answers can cite the exact source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructuredSource {
    AwardItems,
    PlanItems,
    Tenders,
}

impl StructuredSource {
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::AwardItems => "award_items",
            Self::PlanItems => "plan_items",
            Self::Tenders => "tenders",
        }
    }
}

/// A hit from the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct VectorResult {
    pub chunk_id: i64,
    pub source_doc_id: String,
    pub source_tender_id: Option<String>,
    pub chunk_index: usize,
    pub text: String,
    /// Cosine similarity clamped to [0, 1].
    pub score: f32,
    pub indexed_at: DateTime<Utc>,
}

/// A hit from one of the structured tables, already rendered to a context
/// line (aggregates and rankings are computed facts, not raw rows).
#[derive(Debug, Clone, Serialize)]
pub struct StructuredResult {
    pub source: StructuredSource,
    pub row_id: Option<i64>,
    /// Human-readable fact, e.g. a per-year price aggregate line.
    pub text: String,
    /// Relevance score assigned by the searcher (keyword hits score lower
    /// than computed aggregates).
    pub score: f32,
    /// When the underlying fact was effective (award date, plan year,
    /// publication date); used for recency tie-breaks.
    pub effective_at: DateTime<Utc>,
    /// Citation label, e.g. "award_items #42 (tender T-123)".
    pub citation: String,
}

/// Tagged union over the two result shapes. See the design note on
/// duck-typed rows: everything downstream goes through these accessors.
#[derive(Debug, Clone, Serialize)]
pub enum SearchResult {
    Vector(VectorResult),
    Structured(StructuredResult),
}

impl SearchResult {
    /// Similarity/relevance score in [0, 1].
    pub fn score(&self) -> f32 {
        match self {
            Self::Vector(hit) => hit.score,
            Self::Structured(hit) => hit.score,
        }
    }

    /// The retrievable text of this hit.
    pub fn text(&self) -> &str {
        match self {
            Self::Vector(hit) => &hit.text,
            Self::Structured(hit) => &hit.text,
        }
    }

    /// Citation label naming where the hit came from.
    pub fn source(&self) -> String {
        match self {
            Self::Vector(hit) => match &hit.source_tender_id {
                Some(tender) => {
                    format!("document {} chunk {} (tender {tender})", hit.source_doc_id, hit.chunk_index)
                }
                None => format!("document {} chunk {}", hit.source_doc_id, hit.chunk_index),
            },
            Self::Structured(hit) => hit.citation.clone(),
        }
    }

    /// Recency used for deterministic tie-breaking.
    pub fn recency(&self) -> DateTime<Utc> {
        match self {
            Self::Vector(hit) => hit.indexed_at,
            Self::Structured(hit) => hit.effective_at,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Dedup key: blake3 over normalized text.
    pub fn content_hash(&self) -> ContentHash {
        content_hash(self.text())
    }
}

/// Filters applied to a vector search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub tender_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Per-item-per-year price aggregate computed over a structured source.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStat {
    pub item_name: String,
    pub year: i32,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub sample_count: i64,
    pub currency: Option<String>,
    pub unit: Option<String>,
    pub source: StructuredSource,
}

impl AggregateStat {
    /// Render the aggregate as a context line for the answer prompt.
    pub fn to_context_line(&self) -> String {
        let currency = self.currency.as_deref().unwrap_or("");
        let unit = self
            .unit
            .as_deref()
            .map(|u| format!(" per {u}"))
            .unwrap_or_default();
        format!(
            "{} — {}: avg price {:.2} {currency}{unit}, min {:.2}, max {:.2} ({} rows, {})",
            self.item_name,
            self.year,
            self.avg_price,
            self.min_price,
            self.max_price,
            self.sample_count,
            self.source.table_name(),
        )
    }
}

/// A supplier ranked by awarded wins for a given item query.
#[derive(Debug, Clone, Serialize)]
pub struct SupplierRank {
    pub supplier: String,
    pub win_count: i64,
    pub avg_price: Option<f64>,
    pub total_value: Option<f64>,
}

impl SupplierRank {
    pub fn to_context_line(&self, rank: usize) -> String {
        let avg = self
            .avg_price
            .map(|p| format!(", avg price {p:.2}"))
            .unwrap_or_default();
        let total = self
            .total_value
            .map(|v| format!(", total value {v:.2}"))
            .unwrap_or_default();
        format!(
            "#{rank} supplier: {} with {} wins{avg}{total}",
            self.supplier, self.win_count
        )
    }
}
