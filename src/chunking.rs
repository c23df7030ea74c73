//! Fixed-budget overlapping chunking for extracted document text.
//!
//! Ingestion splits a document into segments whose token count stays under a
//! configured budget, then slides a fixed overlap across adjacent segments so
//! spans near chunk boundaries remain visible to retrieval. Tokens are
//! whitespace-delimited words; extracted PDF text carries no markup worth a
//! heavier tokenizer.

use semchunk_rs::Chunker;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Chunk text into segments bounded by `chunk_size` tokens with `overlap`
/// tokens carried over from the previous segment.
///
/// Returns an empty vector when the input text is all whitespace. The overlap
/// is clamped below the chunk size and the overlapped result is trimmed from
/// the front so every returned string still respects the budget.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunker = Chunker::new(chunk_size, Box::new(count_tokens));
    let base_chunks = chunker.chunk(text);
    Ok(apply_overlap(base_chunks, chunk_size, overlap))
}

fn count_tokens(segment: &str) -> usize {
    let tokens = segment.split_whitespace().count();
    if tokens == 0 && !segment.is_empty() {
        1
    } else {
        tokens
    }
}

fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let combined = match previous.as_deref() {
            Some(prev) => {
                let tail = trailing_tokens(prev, effective_overlap);
                let joined = if tail.is_empty() {
                    current.clone()
                } else {
                    format!("{tail} {current}")
                };
                trim_to_budget(&joined, chunk_size)
            }
            None => current.clone(),
        };
        overlapped.push(combined);
        previous = Some(current);
    }
    overlapped
}

/// Last `count` whitespace tokens of `text`, joined by single spaces.
fn trailing_tokens(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

/// Drop tokens from the front until the text fits the budget.
fn trim_to_budget(text: &str, budget: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(budget);
    words[start..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_chunk_size() {
        let chunks = chunk_text("one two three four five", 2, 0).expect("chunks");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 4, 0).expect("chunks").is_empty());
        assert!(chunk_text("   \n\t ", 4, 0).expect("chunks").is_empty());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let error = chunk_text("hello", 0, 0).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn overlap_carries_previous_tail_within_budget() {
        let chunks = chunk_text("one two three four five", 3, 1).expect("chunks");
        assert_eq!(chunks, vec!["one two three", "three four five"]);
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= 3);
        }
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunks = chunk_text("a b c d e f", 2, 5).expect("chunks");
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= 2);
        }
    }

    #[test]
    fn single_chunk_is_untouched_by_overlap() {
        let chunks = chunk_text("just a few words", 100, 10).expect("chunks");
        assert_eq!(chunks, vec!["just a few words"]);
    }
}
