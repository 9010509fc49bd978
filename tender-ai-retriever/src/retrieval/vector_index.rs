//! Vector similarity search over stored chunk embeddings.
//!
//! Embeddings are unit-normalized f16 blobs in SQLite; the index loads the
//! filtered candidate set and ranks by cosine similarity in memory. At the
//! target corpus size a brute-force scan stays well inside the latency
//! budget, and it keeps ranking exact rather than approximate.

use anyhow::Result;
use half::f16;

use super::types::{SearchFilters, SearchResult, VectorResult};
use crate::storage::{ChunkId, ChunkRecord, tender_store::TenderStore};

/// Top-k cosine similarity search with tender/date filters.
#[derive(Clone, Debug)]
pub struct VectorIndex {
    store: TenderStore,
}

impl VectorIndex {
    pub fn new(store: TenderStore) -> Self {
        Self { store }
    }

    /// Insert or refresh a chunk together with its embedding. Idempotent;
    /// delegates to the store's keyed upsert.
    pub async fn upsert(&self, chunk: &ChunkRecord) -> Result<ChunkId> {
        self.store.upsert_chunk(chunk).await
    }

    /// Return the top `k` live chunks by cosine similarity, descending.
    /// Ties break on recency (later `indexed_at` first), then chunk id so
    /// the ordering is total and deterministic.
    pub async fn search(
        &self,
        query: &[f16],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self
            .store
            .vector_candidates(
                filters.tender_id.as_deref(),
                filters.date_from,
                filters.date_to,
            )
            .await?;

        tracing::debug!(candidates = candidates.len(), k, "vector search scan");

        let mut scored: Vec<(f32, ChunkRecord)> = candidates
            .into_iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                if embedding.len() != query.len() {
                    tracing::warn!(
                        chunk_id = chunk.id,
                        expected = query.len(),
                        actual = embedding.len(),
                        "skipping chunk with mismatched embedding dimension"
                    );
                    return None;
                }
                let similarity = cosine_similarity(query, embedding).max(0.0);
                Some((similarity, chunk))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.indexed_at.cmp(&a.1.indexed_at))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| {
                SearchResult::Vector(VectorResult {
                    chunk_id: chunk.id.unwrap_or_default(),
                    source_doc_id: chunk.source_doc_id,
                    source_tender_id: chunk.source_tender_id,
                    chunk_index: chunk.chunk_index,
                    text: chunk.content,
                    score,
                    indexed_at: chunk.indexed_at.unwrap_or_default(),
                })
            })
            .collect())
    }
}

/// Cosine similarity between two f16 embedding vectors.
fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f32::from(*x) * f32::from(*y))
        .sum();

    let norm_a: f32 = a.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
