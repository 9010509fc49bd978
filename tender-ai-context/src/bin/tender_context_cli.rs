use clap::Parser;
use std::fs;
use std::io::{self, Read};
use tender_ai_context::text::TextChunker;

/// A CLI tool to chunk a text document into JSON output using
/// tender-ai-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum tokens per chunk.
    #[arg(short, long, default_value_t = 500)]
    max_tokens: usize,

    /// Tokens of overlap carried between consecutive chunks.
    #[arg(short, long, default_value_t = 50)]
    overlap_tokens: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let text = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let chunker = TextChunker::new(args.max_tokens, args.overlap_tokens);
    let chunks = chunker.chunk(&text);

    let json_output = serde_json::to_string_pretty(&chunks)?;
    println!("{json_output}");

    Ok(())
}
