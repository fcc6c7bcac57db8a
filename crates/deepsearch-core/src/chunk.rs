//! Overlapping-window text chunker for the vector index.
//!
//! Extracted text is first cleaned (whitespace runs collapsed to a single
//! space, control characters removed), then cut into windows of at most
//! `max_tokens` tokens that overlap by `overlap_tokens`. Offsets are char
//! positions in the cleaned text.
//!
//! # Algorithm
//!
//! 1. Convert token counts to chars using a 4 chars/token ratio.
//! 2. Take a window of `max_chars` starting at the cursor.
//! 3. If the window ends mid-text, pull the end back to the last space in
//!    the second half of the window.
//! 4. Advance the cursor to `end - overlap_chars`, snapped forward to the
//!    next word start, and never backwards.
//! 5. Empty or whitespace-only text yields no chunks.
//!
//! # Example
//!
//! ```rust
//! use deepsearch_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello   world.\n\nSecond paragraph.", 512, 50);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Hello world. Second paragraph.");
//! ```

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// One span of cleaned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

/// Collapse whitespace runs and strip control characters.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Split `text` into overlapping chunks.
///
/// Indices are contiguous from 0. `overlap_tokens` is clamped below
/// `max_tokens` so the cursor always advances.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = cleaned.chars().collect();
    let n = chars.len();
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars - 1);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < n {
        let mut end = (start + max_chars).min(n);
        if end < n {
            let floor = start + max_chars / 2;
            if let Some(space) = (floor.max(start + 1)..end).rev().find(|&i| chars[i] == ' ') {
                end = space;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            let lead = piece.len() - piece.trim_start().len();
            let start_char = start + piece[..lead].chars().count();
            chunks.push(TextChunk {
                index: chunks.len(),
                start_char,
                end_char: start_char + trimmed.chars().count(),
                text: trimmed.to_string(),
            });
        }

        if end >= n {
            break;
        }

        let mut next = end.saturating_sub(overlap_chars);
        while next > 0 && next < end && chars[next - 1] != ' ' {
            next += 1;
        }
        start = if next > start && next < end { next } else { end };
    }

    chunks
}
