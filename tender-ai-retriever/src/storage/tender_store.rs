//! SQLite operations for chunk and structured-item storage.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Chunks: document text slices with optional f16 embeddings
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     source_doc_id TEXT,              -- upstream document id
//!     source_tender_id TEXT,           -- owning tender, if any
//!     chunk_index INTEGER,             -- position within the document
//!     content TEXT,
//!     content_hash BLOB,               -- blake3 of normalized content
//!     token_count INTEGER,
//!     page INTEGER, section TEXT,      -- source location metadata
//!     embedding BLOB,                  -- f16 vector (optional)
//!     superseded INTEGER DEFAULT 0,    -- flagged on re-ingestion
//!     indexed_at TIMESTAMP
//! );
//!
//! -- Structured item tables supplied by upstream extraction:
//! -- award_items (awarded rows, supplier + final unit price) and
//! -- plan_items (plan rows, specification + estimated price, no supplier).
//! ```
//!
//! ## SQLite configuration
//!
//! - **WAL mode**: concurrent readers during the retrieval fan-out
//! - **Large page size** (64KB): embedding blobs dominate row size
//! - **busy timeout**: pool discipline is the only synchronization used
//!
//! All queries are parameterized; nothing in this module interpolates user
//! text into SQL.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{AwardItem, ChunkId, ChunkRecord, PlanItem, StoreStats, TenderRecord};

/// Pooled SQLite store for chunks, tenders, and the two structured item
/// tables. Cloning shares the pool.
#[derive(Clone, Debug)]
pub struct TenderStore {
    pool: SqlitePool,
}

impl TenderStore {
    /// Open (or create) a persistent store at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory store for testing. A single pooled connection is
    /// used so every handle sees the same in-memory database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for read-only queries issued by the searchers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_doc_id TEXT NOT NULL,
                source_tender_id TEXT,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash BLOB NOT NULL,
                token_count INTEGER NOT NULL,
                page INTEGER,
                section TEXT,
                embedding BLOB,
                superseded INTEGER NOT NULL DEFAULT 0,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT unique_chunk UNIQUE(source_doc_id, chunk_index)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenders (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                buyer TEXT,
                published_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS award_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tender_id TEXT,
                item_name TEXT NOT NULL,
                supplier TEXT,
                unit_price REAL,
                quantity REAL,
                currency TEXT,
                unit TEXT,
                awarded_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plan_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tender_id TEXT,
                item_name TEXT NOT NULL,
                specification TEXT,
                estimated_price REAL,
                planned_year INTEGER NOT NULL,
                unit TEXT,
                currency TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_tender ON chunks(source_tender_id)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_live ON chunks(superseded, indexed_at)",
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_award_items_name ON award_items(item_name)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_plan_items_name ON plan_items(item_name)")
            .execute(pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tenders_published ON tenders(published_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert or refresh a chunk. Idempotent: keyed on
    /// (source_doc_id, chunk_index), so re-upserting the same chunk leaves a
    /// single row.
    pub async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<ChunkId> {
        let embedding_bytes = chunk
            .embedding
            .as_ref()
            .map(|e| bytemuck::cast_slice::<half::f16, u8>(e).to_vec());
        let hash = chunk.hash();

        let row = sqlx::query(
            r#"
            INSERT INTO chunks
            (source_doc_id, source_tender_id, chunk_index, content, content_hash,
             token_count, page, section, embedding, superseded, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
            ON CONFLICT(source_doc_id, chunk_index) DO UPDATE SET
                source_tender_id = excluded.source_tender_id,
                content = excluded.content,
                content_hash = excluded.content_hash,
                token_count = excluded.token_count,
                page = excluded.page,
                section = excluded.section,
                embedding = excluded.embedding,
                superseded = 0
            RETURNING id
            "#,
        )
        .bind(&chunk.source_doc_id)
        .bind(chunk.source_tender_id.as_deref())
        .bind(chunk.chunk_index as i64)
        .bind(&chunk.content)
        .bind(&hash[..])
        .bind(chunk.token_count as i64)
        .bind(chunk.page.map(|p| p as i64))
        .bind(chunk.section.as_deref())
        .bind(embedding_bytes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    /// Upsert a batch of chunks in one transaction.
    pub async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<Vec<ChunkId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding_bytes = chunk
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<half::f16, u8>(e).to_vec());
            let hash = chunk.hash();
            let row = sqlx::query(
                r#"
                INSERT INTO chunks
                (source_doc_id, source_tender_id, chunk_index, content, content_hash,
                 token_count, page, section, embedding, superseded, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
                ON CONFLICT(source_doc_id, chunk_index) DO UPDATE SET
                    source_tender_id = excluded.source_tender_id,
                    content = excluded.content,
                    content_hash = excluded.content_hash,
                    token_count = excluded.token_count,
                    page = excluded.page,
                    section = excluded.section,
                    embedding = excluded.embedding,
                    superseded = 0
                RETURNING id
                "#,
            )
            .bind(&chunk.source_doc_id)
            .bind(chunk.source_tender_id.as_deref())
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.content)
            .bind(&hash[..])
            .bind(chunk.token_count as i64)
            .bind(chunk.page.map(|p| p as i64))
            .bind(chunk.section.as_deref())
            .bind(embedding_bytes)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
            ids.push(row.get::<i64, _>("id"));
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Flag every chunk of `source_doc_id` as superseded. Chunks are never
    /// mutated on re-ingestion: old rows stay for audit but drop out of
    /// search. Returns the number of rows flagged.
    pub async fn supersede_document(&self, source_doc_id: &str) -> Result<usize> {
        let result =
            sqlx::query("UPDATE chunks SET superseded = 1 WHERE source_doc_id = ?1")
                .bind(source_doc_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() as usize)
    }

    /// Get a chunk by ID.
    pub async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(
            "SELECT id, source_doc_id, source_tender_id, chunk_index, content,
                    token_count, page, section, embedding, indexed_at
             FROM chunks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_chunk))
    }

    /// Live (non-superseded) chunks that have embeddings, optionally
    /// filtered by tender and indexing date range. Candidate set for the
    /// vector index's similarity scan.
    pub async fn vector_candidates(
        &self,
        tender_id: Option<&str>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChunkRecord>> {
        let mut sql = String::from(
            "SELECT id, source_doc_id, source_tender_id, chunk_index, content,
                    token_count, page, section, embedding, indexed_at
             FROM chunks
             WHERE superseded = 0 AND embedding IS NOT NULL",
        );
        if tender_id.is_some() {
            sql.push_str(" AND source_tender_id = ?");
        }
        if date_from.is_some() {
            sql.push_str(" AND indexed_at >= ?");
        }
        if date_to.is_some() {
            sql.push_str(" AND indexed_at <= ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(tender) = tender_id {
            query = query.bind(tender.to_string());
        }
        if let Some(from) = date_from {
            query = query.bind(from);
        }
        if let Some(to) = date_to {
            query = query.bind(to);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Self::row_to_chunk).collect())
    }

    fn row_to_chunk(row: sqlx::sqlite::SqliteRow) -> ChunkRecord {
        let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
        let embedding = embedding_bytes
            .map(|bytes| bytemuck::cast_slice::<u8, half::f16>(&bytes).to_vec());
        ChunkRecord {
            id: row.get("id"),
            source_doc_id: row.get("source_doc_id"),
            source_tender_id: row.get("source_tender_id"),
            chunk_index: row.get::<i64, _>("chunk_index") as usize,
            content: row.get("content"),
            token_count: row.get::<i64, _>("token_count") as usize,
            page: row.get::<Option<i64>, _>("page").map(|p| p as u32),
            section: row.get("section"),
            embedding,
            indexed_at: row.get("indexed_at"),
        }
    }

    /// Insert or refresh a tender-level row.
    pub async fn upsert_tender(&self, tender: &TenderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenders (id, title, description, buyer, published_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                buyer = excluded.buyer,
                published_at = excluded.published_at
            "#,
        )
        .bind(&tender.id)
        .bind(&tender.title)
        .bind(tender.description.as_deref())
        .bind(tender.buyer.as_deref())
        .bind(tender.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert an awarded-contract item row (upstream extraction surface).
    pub async fn insert_award_item(&self, item: &AwardItem) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO award_items
            (tender_id, item_name, supplier, unit_price, quantity, currency, unit, awarded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING id
            "#,
        )
        .bind(item.tender_id.as_deref())
        .bind(&item.item_name)
        .bind(item.supplier.as_deref())
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(item.currency.as_deref())
        .bind(item.unit.as_deref())
        .bind(item.awarded_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Insert a procurement-plan item row (upstream extraction surface).
    pub async fn insert_plan_item(&self, item: &PlanItem) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO plan_items
            (tender_id, item_name, specification, estimated_price, planned_year, unit, currency)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id
            "#,
        )
        .bind(item.tender_id.as_deref())
        .bind(&item.item_name)
        .bind(item.specification.as_deref())
        .bind(item.estimated_price)
        .bind(item.planned_year as i64)
        .bind(item.unit.as_deref())
        .bind(item.currency.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Get statistics about the store.
    pub async fn stats(&self) -> Result<StoreStats> {
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded_chunks: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL AND superseded = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        let superseded_chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE superseded = 1")
                .fetch_one(&self.pool)
                .await?;
        let tenders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenders")
            .fetch_one(&self.pool)
            .await?;
        let award_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM award_items")
            .fetch_one(&self.pool)
            .await?;
        let plan_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plan_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            chunks: chunks as usize,
            embedded_chunks: embedded_chunks as usize,
            superseded_chunks: superseded_chunks as usize,
            tenders: tenders as usize,
            award_items: award_items as usize,
            plan_items: plan_items as usize,
        })
    }
}
