//! Deterministic token estimation shared by the chunker and the context
//! assembler, so that every component budgets in the same unit.

/// Estimate the number of model tokens in `text`.
///
/// This is a deterministic approximation, not a real tokenizer: each
/// whitespace-separated word counts as one token plus one extra token per
/// five characters beyond the first four. That tracks subword tokenizers
/// closely enough for budgeting, and it never depends on external model
/// files, so chunk token counts are stable across runs and machines.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace()
        .map(|word| {
            let chars = word.chars().count();
            1 + chars.saturating_sub(4) / 5
        })
        .sum()
}
