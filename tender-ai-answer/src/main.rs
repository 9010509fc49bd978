use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tender_ai_answer::{EngineConfig, build_orchestrator_with_store};
use tender_ai_context::text::TextChunker;
use tender_ai_embed::{EmbeddingProvider, RemoteEmbedProvider};
use tender_ai_retriever::retrieval::types::SearchFilters;
use tender_ai_retriever::storage::ChunkRecord;
use tender_ai_retriever::storage::tender_store::TenderStore;
use tracing::info;

/// Grounded question answering over indexed procurement data.
#[derive(Parser, Debug)]
#[command(name = "tender-ai", version, about, long_about = None)]
struct Cli {
    /// Path to the engine TOML configuration.
    #[arg(short, long, default_value = "tender-ai.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question over the indexed store.
    Ask {
        question: String,
        /// Restrict vector search to one tender.
        #[arg(long)]
        tender: Option<String>,
        /// Only consider chunks indexed on or after this date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,
        /// Only consider chunks indexed on or before this date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,
        /// Print the full answer structure as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Chunk, embed, and index a text document.
    Ingest {
        file: PathBuf,
        /// Document identifier; defaults to the file name. Re-ingesting the
        /// same id supersedes the previous chunks.
        #[arg(long)]
        doc_id: Option<String>,
        /// Tender the document belongs to.
        #[arg(long)]
        tender: Option<String>,
    },
    /// Show store statistics.
    Status {
        /// Print statistics as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Parse a YYYY-MM-DD day into a UTC midnight timestamp.
fn parse_day(value: &str) -> Result<DateTime<Utc>> {
    let day = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date {value:?}, expected YYYY-MM-DD"))?;
    Ok(Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.config)?.with_api_keys_from_env();
    config.validate()?;

    let store = TenderStore::open(&config.store_path).await?;

    match cli.command {
        Command::Ask {
            question,
            tender,
            from,
            to,
            json,
        } => {
            let orchestrator = build_orchestrator_with_store(&config, store)?;
            let filters = SearchFilters {
                tender_id: tender,
                date_from: from.as_deref().map(parse_day).transpose()?,
                date_to: to.as_deref().map(parse_day).transpose()?,
            };
            let answer = orchestrator.answer(&question, &[], &filters).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                if !answer.sources.is_empty() {
                    println!("\nSources:");
                    for (index, source) in answer.sources.iter().enumerate() {
                        println!("  [{}] {}", index + 1, source);
                    }
                }
                println!(
                    "\nConfidence: {}  (intent: {:?}, request {})",
                    answer.confidence.label(),
                    answer.intent,
                    answer.correlation_id
                );
            }
        }

        Command::Ingest {
            file,
            doc_id,
            tender,
        } => {
            let doc_id = doc_id.unwrap_or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.to_string_lossy().to_string())
            });
            let text = std::fs::read_to_string(&file)?;

            let chunker =
                TextChunker::new(config.chunking.max_tokens, config.chunking.overlap_tokens);
            let chunks = chunker.chunk(&text);
            info!(chunks = chunks.len(), doc_id = %doc_id, "document chunked");

            let embedder = RemoteEmbedProvider::new(config.embedding.clone())?;
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = embedder.embed_texts(&texts).await?;

            let superseded = store.supersede_document(&doc_id).await?;
            let records: Vec<ChunkRecord> = chunks
                .iter()
                .zip(embeddings.embeddings)
                .map(|(chunk, embedding)| ChunkRecord {
                    id: None,
                    source_doc_id: doc_id.clone(),
                    source_tender_id: tender.clone(),
                    chunk_index: chunk.sequence,
                    content: chunk.text.clone(),
                    token_count: chunk.token_count,
                    page: None,
                    section: None,
                    embedding: Some(embedding),
                    indexed_at: None,
                })
                .collect();
            let ids = store.upsert_chunks(&records).await?;

            println!(
                "Indexed {} chunks from {} ({} superseded)",
                ids.len(),
                file.display(),
                superseded
            );
        }

        Command::Status { json } => {
            let stats = store.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Store: {}", config.store_path.display());
                println!("  chunks:            {}", stats.chunks);
                println!("  embedded (live):   {}", stats.embedded_chunks);
                println!("  superseded:        {}", stats.superseded_chunks);
                println!("  tenders:           {}", stats.tenders);
                println!("  award items:       {}", stats.award_items);
                println!("  plan items:        {}", stats.plan_items);
            }
        }
    }

    Ok(())
}
