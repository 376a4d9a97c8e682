//! Overlapping word-window chunker.
//!
//! Splits document text into fixed-length windows of whitespace-separated
//! words. Consecutive windows share `overlap` words so that evidence
//! spanning a window boundary is still retrievable from one chunk.
//!
//! # Algorithm
//!
//! 1. Split text on whitespace.
//! 2. Emit `words[i .. i + max_words]` joined by single spaces.
//! 3. Advance `i` by `max_words - overlap` and repeat until past the end.
//!
//! # Example
//!
//! ```rust
//! use risk_rag_core::chunk::{chunk_words, ChunkingParams};
//!
//! let params = ChunkingParams { max_words: 3, overlap_words: 1 };
//! let chunks = chunk_words("a b c d e", &params);
//! assert_eq!(chunks, vec!["a b c", "c d e", "e"]);
//! ```

/// Window size and overlap, both in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub max_words: usize,
    pub overlap_words: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_words: 400,
            overlap_words: 50,
        }
    }
}

impl ChunkingParams {
    /// Words advanced between window starts. Never zero.
    fn stride(&self) -> usize {
        self.max_words.saturating_sub(self.overlap_words).max(1)
    }
}

/// Split text into overlapping word windows.
///
/// Empty or whitespace-only text yields no chunks. A stride of zero
/// (overlap ≥ window) is clamped to one word so the loop always ends.
pub fn chunk_words(text: &str, params: &ChunkingParams) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || params.max_words == 0 {
        return Vec::new();
    }

    let stride = params.stride();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + params.max_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += stride;
    }
    chunks
}
