//! Storage layer for tender-ai-retriever
//!
//! This module defines the record types persisted in the tender store and
//! the SQLite-backed store itself. It separates storage concerns from
//! retrieval logic: the vector index and the structured searcher both read
//! through [`TenderStore`](tender_store::TenderStore) and never touch SQL
//! outside it.
//!
//! ## Key Components
//!
//! - **ChunkRecord**: a slice of document text with its embedding
//! - **AwardItem / PlanItem**: the two structured item tables supplied by
//!   upstream extraction (differently shaped; price and specification
//!   fields may be missing)
//! - **TenderRecord**: tender-level title/description rows
//! - **TenderStore**: pooled SQLite access, parameterized queries only

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod tender_store;

/// Database ID for a text chunk.
pub type ChunkId = i64;

/// Blake3 hash of normalized chunk content (32 bytes), used for
/// deduplication across vector and structured results.
pub type ContentHash = [u8; 32];

/// Hash of `text` after whitespace normalization and lowercasing, so that
/// trivially reflowed copies of the same passage dedup to one entry.
pub fn content_hash(text: &str) -> ContentHash {
    let normalized = text
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    *blake3::hash(normalized.as_bytes()).as_bytes()
}

/// A chunk of document text with retrieval metadata.
///
/// Chunks are immutable once written: re-ingesting a document supersedes its
/// old chunks (see [`tender_store::TenderStore::supersede_document`]) rather
/// than mutating them.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Option<ChunkId>,
    /// Upstream identifier of the source document.
    pub source_doc_id: String,
    /// Owning tender, when the document is attached to one.
    pub source_tender_id: Option<String>,
    /// 0-indexed position of the chunk within its document.
    pub chunk_index: usize,
    pub content: String,
    pub token_count: usize,
    /// Page number in the source document, when known.
    pub page: Option<u32>,
    /// Section heading in the source document, when known.
    pub section: Option<String>,
    /// Unit-normalized embedding vector; absent until embedded.
    pub embedding: Option<Vec<half::f16>>,
    /// Set by the store on read; ignored on write.
    pub indexed_at: Option<DateTime<Utc>>,
}

impl ChunkRecord {
    pub fn hash(&self) -> ContentHash {
        content_hash(&self.content)
    }
}

/// A row from the awarded-contracts item table. Produced by upstream
/// extraction from award notices; any field but the item name may be
/// missing.
#[derive(Debug, Clone, Serialize)]
pub struct AwardItem {
    pub id: Option<i64>,
    pub tender_id: Option<String>,
    pub item_name: String,
    pub supplier: Option<String>,
    pub unit_price: Option<f64>,
    pub quantity: Option<f64>,
    pub currency: Option<String>,
    pub unit: Option<String>,
    pub awarded_at: DateTime<Utc>,
}

/// A row from the procurement-plan item table. Structurally distinct from
/// [`AwardItem`]: it carries a free-text specification and an estimated
/// price, and has no supplier (nothing has been awarded yet).
#[derive(Debug, Clone, Serialize)]
pub struct PlanItem {
    pub id: Option<i64>,
    pub tender_id: Option<String>,
    pub item_name: String,
    pub specification: Option<String>,
    pub estimated_price: Option<f64>,
    pub planned_year: i32,
    pub unit: Option<String>,
    pub currency: Option<String>,
}

/// Tender-level metadata row searched for tender-level questions.
#[derive(Debug, Clone, Serialize)]
pub struct TenderRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub buyer: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Counts reported by [`tender_store::TenderStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub superseded_chunks: usize,
    pub tenders: usize,
    pub award_items: usize,
    pub plan_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_ignores_whitespace_and_case() {
        let a = content_hash("Surgical  drapes,\nsterile");
        let b = content_hash("surgical drapes, STERILE");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_distinguishes_content() {
        let a = content_hash("surgical drapes");
        let b = content_hash("surgical gowns");
        assert_ne!(a, b);
    }
}
