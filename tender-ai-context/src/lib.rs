pub mod text;
pub mod tokens;

// Re-export the main chunking surface for external use
pub use text::{TextChunk, TextChunker, reconstruct};
pub use tokens::token_count;
