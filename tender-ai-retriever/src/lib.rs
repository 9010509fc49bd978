//! tender-ai-retriever: hybrid retrieval over procurement data
//!
//! This crate owns the persistent store and the two retrieval paths that
//! feed grounded answers:
//!
//! - **[`storage`]**: SQLite-backed [`storage::tender_store::TenderStore`]
//!   holding document chunks (with f16 embeddings) plus the two structured
//!   item tables and tender metadata supplied by upstream extraction
//! - **[`retrieval::vector_index`]**: cosine top-k over live chunk
//!   embeddings, with tender/date filters and recency tie-breaks
//! - **[`retrieval::structured`]**: concurrent bounded keyword/aggregate/
//!   supplier queries across both item tables, with per-source time budgets
//!
//! ## Architecture
//!
//! ```text
//! Question ──► VectorIndex ──────┐
//!          └─► StructuredSearcher ┴─► merged SearchResults ─► assembly
//!                    │
//!            TenderStore (SQLite, WAL, parameterized queries only)
//! ```
//!
//! All retrieval sub-operations run concurrently against the shared
//! read-only pool; the pool's own discipline is the only synchronization.

pub mod retrieval;
pub mod storage;
