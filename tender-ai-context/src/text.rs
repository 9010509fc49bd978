//! Sentence-aware text chunking for retrieval.
//!
//! Procurement documents (tender notices, technical specifications, contract
//! annexes) arrive as long runs of prose that have to be cut into pieces
//! small enough to embed, while staying readable enough to cite back to the
//! user. This module provides [`TextChunker`], which:
//!
//! - splits at sentence boundaries, using a rule table that covers Latin,
//!   Cyrillic, CJK and Arabic terminators, so a Russian notice or a quoted
//!   Chinese product name does not derail the split;
//! - merges short sentences into a running chunk until the token budget is
//!   reached (default 500 tokens per chunk);
//! - carries a configurable overlap (default 50 tokens) of trailing
//!   sentences into the next chunk, so a fact straddling a boundary is
//!   retrievable from either side;
//! - hard-splits inside a sentence only when that single sentence alone
//!   exceeds the budget.
//!
//! Chunking is deterministic and lossless: every chunk is an exact byte
//! slice of the input, each chunk records how many bytes it shares with its
//! predecessor, and [`reconstruct`] reproduces the original text from the
//! chunk sequence.
//!
//! ```
//! use tender_ai_context::text::{TextChunker, reconstruct};
//!
//! let chunker = TextChunker::new(40, 8);
//! let text = "Lot 3 covers surgical drapes. Delivery within 30 days. \
//!             The supplier must hold ISO 13485 certification.";
//! let chunks = chunker.chunk(text);
//!
//! assert!(!chunks.is_empty());
//! assert!(chunks.iter().all(|c| c.token_count <= 40));
//! assert_eq!(reconstruct(&chunks), text);
//! ```

use crate::tokens::token_count;
use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Sentence boundary rule: one or more terminators (Latin `.!?`, ellipsis,
/// CJK `。！？`, Arabic `؟`), optional closing quotes/brackets, then trailing
/// whitespace, or a bare newline, which ends headings and table rows.
/// Trailing whitespace is attached to the sentence it terminates so that
/// concatenating sentences reproduces the input byte-for-byte.
pub const SENTENCE_BOUNDARY_PATTERN: &str = r#"(?:[.!?…。！？؟]+["»”'）)\]]*\s*|\n\s*)"#;

/// A single chunk produced by [`TextChunker::chunk`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    /// 0-indexed position of this chunk within the document.
    pub sequence: usize,
    /// The chunk text, an exact slice of the source, overlap prefix included.
    pub text: String,
    /// Estimated tokens in `text` (see [`crate::tokens::token_count`]).
    pub token_count: usize,
    /// Bytes at the start of `text` that repeat the previous chunk's tail.
    /// Always 0 for the first chunk.
    pub overlap_len: usize,
}

/// Splits raw text into bounded, overlapping chunks at sentence boundaries.
pub struct TextChunker {
    max_tokens: usize,
    overlap_tokens: usize,
    boundary: Regex,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

impl TextChunker {
    /// Create a chunker with the given per-chunk token budget and overlap.
    ///
    /// `max_tokens` is clamped to at least 1; `overlap_tokens` is clamped
    /// below `max_tokens` so a chunk always has room for new content.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        let max_tokens = max_tokens.max(1);
        let overlap_tokens = overlap_tokens.min(max_tokens.saturating_sub(1));
        Self {
            max_tokens,
            overlap_tokens,
            boundary: Regex::new(SENTENCE_BOUNDARY_PATTERN)
                .expect("sentence boundary pattern is a valid regex"),
        }
    }

    /// Split `text` into chunks of at most `max_tokens` tokens each.
    ///
    /// Returns an empty vector for empty input. Output order follows the
    /// source text, and the chunk sequence reconstructs it exactly (see
    /// [`reconstruct`]).
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Sentence ranges cover the input contiguously; oversized sentences
        // are pre-split so every unit fits the budget on its own.
        let mut units: Vec<Range<usize>> = Vec::new();
        for sentence in self.split_sentences(text) {
            if token_count(&text[sentence.clone()]) > self.max_tokens {
                units.extend(self.hard_split(text, sentence));
            } else {
                units.push(sentence);
            }
        }

        let unit_tokens: Vec<usize> = units
            .iter()
            .map(|range| token_count(&text[range.clone()]))
            .collect();

        // Greedy accumulation with sentence-level overlap carry-over. The
        // budget check recounts the prospective chunk slice rather than
        // summing per-unit counts: units fused without intervening
        // whitespace can tokenize differently joined than apart, and the
        // invariant is on the chunk text as stored.
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut current: Vec<usize> = Vec::new();

        for idx in 0..units.len() {
            if !current.is_empty() {
                let prospective_start = units[current[0]].start;
                if token_count(&text[prospective_start..units[idx].end]) > self.max_tokens {
                    let closed = std::mem::take(&mut current);
                    let overlap = self.select_overlap(text, &units, &unit_tokens, &closed, idx);
                    self.push_chunk(text, &units, &closed, &mut chunks);
                    current = overlap;
                }
            }
            current.push(idx);
        }
        if !current.is_empty() {
            self.push_chunk(text, &units, &current, &mut chunks);
        }

        chunks
    }

    /// Trailing units of the closed chunk to repeat at the start of the next
    /// one: as many whole units as fit the overlap budget while leaving room
    /// for the incoming unit. Verified against the actual slice so the next
    /// chunk starts within budget even across fused unit boundaries.
    fn select_overlap(
        &self,
        text: &str,
        units: &[Range<usize>],
        unit_tokens: &[usize],
        closed: &[usize],
        incoming: usize,
    ) -> Vec<usize> {
        let mut overlap: Vec<usize> = Vec::new();
        let mut overlap_tokens = 0usize;
        for &unit in closed.iter().rev() {
            let tokens = unit_tokens[unit];
            if overlap_tokens + tokens > self.overlap_tokens {
                break;
            }
            if overlap_tokens + tokens + unit_tokens[incoming] > self.max_tokens {
                break;
            }
            overlap.push(unit);
            overlap_tokens += tokens;
        }
        overlap.reverse();
        while let Some(&first) = overlap.first() {
            if token_count(&text[units[first].start..units[incoming].end]) <= self.max_tokens {
                break;
            }
            overlap.remove(0);
        }
        overlap
    }

    fn push_chunk(
        &self,
        text: &str,
        units: &[Range<usize>],
        members: &[usize],
        chunks: &mut Vec<TextChunk>,
    ) {
        let start = units[members[0]].start;
        let end = units[*members.last().expect("chunk has members")].end;

        // With overlaps removed, earlier chunks tile the text up to the
        // previous chunk's end; anything before that point is overlap.
        let consumed: usize = chunks
            .iter()
            .map(|chunk| chunk.text.len() - chunk.overlap_len)
            .sum();
        let overlap_len = consumed.saturating_sub(start);

        chunks.push(TextChunk {
            sequence: chunks.len(),
            text: text[start..end].to_string(),
            token_count: token_count(&text[start..end]),
            overlap_len,
        });
    }

    /// Contiguous sentence ranges covering all of `text`.
    fn split_sentences(&self, text: &str) -> Vec<Range<usize>> {
        let mut sentences = Vec::new();
        let mut start = 0usize;
        for boundary in self.boundary.find_iter(text) {
            if boundary.end() > start {
                sentences.push(start..boundary.end());
                start = boundary.end();
            }
        }
        if start < text.len() {
            sentences.push(start..text.len());
        }
        sentences
    }

    /// Split a single oversized sentence at token boundaries. Cuts happen
    /// between words where possible, and inside a word only when the word
    /// itself exceeds the budget (e.g. an unbroken serial-number run).
    fn hard_split(&self, text: &str, sentence: Range<usize>) -> Vec<Range<usize>> {
        let slice = &text[sentence.clone()];
        let mut pieces: Vec<Range<usize>> = Vec::new();
        let mut piece_start = 0usize;
        let mut piece_tokens = 0usize;

        for word in word_spans(slice) {
            let word_tokens = token_count(&slice[word.clone()]);
            if word_tokens > self.max_tokens {
                if word.start > piece_start {
                    pieces.push(piece_start..word.start);
                }
                let mut window_start = word.start;
                for cut in char_windows(&slice[word.clone()], self.window_chars()) {
                    pieces.push(window_start..word.start + cut);
                    window_start = word.start + cut;
                }
                piece_start = word.end;
                piece_tokens = 0;
                continue;
            }
            if piece_tokens > 0 && piece_tokens + word_tokens > self.max_tokens {
                pieces.push(piece_start..word.start);
                piece_start = word.start;
                piece_tokens = 0;
            }
            piece_tokens += word_tokens;
        }
        if piece_start < slice.len() {
            pieces.push(piece_start..slice.len());
        }

        pieces
            .into_iter()
            .map(|piece| sentence.start + piece.start..sentence.start + piece.end)
            .collect()
    }

    /// Character budget for windowing an unbroken word so each window stays
    /// within `max_tokens` under the estimator in [`crate::tokens`].
    fn window_chars(&self) -> usize {
        (self.max_tokens.saturating_sub(1)) * 5 + 4
    }
}

/// Byte spans of whitespace-delimited words in `slice`. Leading whitespace
/// attaches to the first word and each whitespace run to the word before it,
/// so the spans tile the slice contiguously.
fn word_spans(slice: &str) -> Vec<Range<usize>> {
    let mut word_starts: Vec<usize> = Vec::new();
    let mut previous_was_whitespace = true;
    for (offset, ch) in slice.char_indices() {
        let is_whitespace = ch.is_whitespace();
        if !is_whitespace && previous_was_whitespace {
            word_starts.push(offset);
        }
        previous_was_whitespace = is_whitespace;
    }

    if word_starts.is_empty() {
        // Whitespace-only (or empty) slice: keep it as one span so the
        // caller still covers every byte.
        if slice.is_empty() {
            return Vec::new();
        }
        return vec![0..slice.len()];
    }

    let mut spans = Vec::with_capacity(word_starts.len());
    let mut start = 0usize;
    for &next_word in word_starts.iter().skip(1) {
        spans.push(start..next_word);
        start = next_word;
    }
    spans.push(start..slice.len());
    spans
}

/// Cut offsets (exclusive, ascending, ending at `word.len()`) splitting
/// `word` into windows of at most `window_chars` characters, aligned to char
/// boundaries.
fn char_windows(word: &str, window_chars: usize) -> Vec<usize> {
    let window_chars = window_chars.max(1);
    let mut cuts = Vec::new();
    let mut count = 0usize;
    for (offset, _) in word.char_indices() {
        if count == window_chars {
            cuts.push(offset);
            count = 0;
        }
        count += 1;
    }
    cuts.push(word.len());
    cuts
}

/// Rebuild the original text from a chunk sequence by dropping each chunk's
/// overlap prefix. Inverse of [`TextChunker::chunk`].
pub fn reconstruct(chunks: &[TextChunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(&chunk.text[chunk.overlap_len..]);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(chunker: &TextChunker, text: &str) {
        let chunks = chunker.chunk(text);
        assert_eq!(reconstruct(&chunks), text, "reconstruction must be exact");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i);
            assert!(chunk.token_count <= chunker.max_tokens);
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = TextChunker::new(40, 8);
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = TextChunker::new(100, 10);
        let text = "One lot of sterile surgical drapes.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].overlap_len, 0);
    }

    #[test]
    fn long_text_reconstructs_exactly() {
        let chunker = TextChunker::new(40, 8);
        let text = (0..60)
            .map(|i| format!("Sentence number {i} describes one delivery lot. "))
            .collect::<String>();
        assert_roundtrip(&chunker, &text);
        assert!(chunker.chunk(&text).len() > 1);
    }

    #[test]
    fn token_budget_is_never_exceeded() {
        let chunker = TextChunker::new(30, 6);
        let text = (0..50)
            .map(|i| format!("Lot {i}: disposable nitrile examination gloves, size M. "))
            .collect::<String>();
        for chunk in chunker.chunk(&text) {
            assert!(
                chunk.token_count <= 30,
                "chunk {} has {} tokens",
                chunk.sequence,
                chunk.token_count
            );
        }
    }

    #[test]
    fn consecutive_chunks_share_an_overlap() {
        let chunker = TextChunker::new(30, 10);
        let text = (0..40)
            .map(|i| format!("Item row {i} lists a unit price in tenge. "))
            .collect::<String>();
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 2);
        // At least one later chunk repeats a tail of its predecessor.
        assert!(chunks.iter().skip(1).any(|c| c.overlap_len > 0));
        for pair in chunks.windows(2) {
            let overlap = pair[1].overlap_len;
            assert!(pair[0].text.ends_with(&pair[1].text[..overlap]));
        }
    }

    #[test]
    fn non_latin_terminators_split_sentences() {
        let chunker = TextChunker::new(12, 0);
        let text = "Поставка хирургических простыней。Срок поставки 30 дней！Кто победил؟ Ответ ниже.";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() > 1, "CJK/Arabic terminators must split");
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn single_giant_sentence_is_hard_split() {
        let chunker = TextChunker::new(20, 4);
        // One "sentence" (no terminators) far beyond the budget.
        let text = (0..200).map(|i| format!("word{i} ")).collect::<String>();
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= 20));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn unbroken_identifier_run_is_windowed() {
        let chunker = TextChunker::new(10, 2);
        let text = "A".repeat(2000);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= 10));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = TextChunker::new(25, 5);
        let text = (0..30)
            .map(|i| format!("Notice {i} was published in March. "))
            .collect::<String>();
        let first = chunker.chunk(&text);
        let second = chunker.chunk(&text);
        assert_eq!(first, second);
    }

    #[test]
    fn newlines_act_as_boundaries() {
        let chunker = TextChunker::new(15, 0);
        let text = "Tender 2024/17\nSubject: laboratory reagents\nDeadline: 2024-05-01\n";
        let chunks = chunker.chunk(text);
        assert_eq!(reconstruct(&chunks), text);
    }
}
