//! Overlapping word-window text chunker.
//!
//! Splits normalized document text into [`Chunk`]s of at most
//! `chunk_size` words, each window starting `chunk_size - overlap` words
//! after the previous one.
//!
//! # Algorithm
//!
//! 1. Collapse every whitespace run to a single space and trim.
//! 2. Split on spaces into words.
//! 3. Emit `words[start..min(start + chunk_size, L)]`, then advance
//!    `start` by `chunk_size - overlap`.
//! 4. Stop after the first window that ends at word `L`, so the last
//!    window is never fully contained in the previous one.
//!
//! For `L` words this yields `ceil(max(L - overlap, 1) / (chunk_size - overlap))`
//! chunks. Empty input yields exactly one chunk with empty text.
//!
//! Each chunk's `id` is the SHA-256 of its normalized text (trimmed and
//! lowercased), so identical text always hashes the same.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::{chunk_text, Chunker};
//!
//! let chunker = Chunker::new(4, 2).unwrap();
//! let chunks = chunk_text("file-1", "a b c d e f", &chunker);
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["a b c d", "c d e f"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::ChunkError;
use crate::models::Chunk;

/// Word-window parameters, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails when the advance step `chunk_size - overlap` would be
    /// non-positive.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Iterate over the word windows of `words`.
    ///
    /// The iterator is `Clone`, so a sequence can be restarted from any
    /// point without re-splitting the text.
    pub fn windows<'a>(&self, words: &'a [&'a str]) -> WordWindows<'a> {
        WordWindows {
            words,
            chunk_size: self.chunk_size,
            step: self.step(),
            start: 0,
            done: false,
        }
    }
}

/// Iterator over overlapping word windows. See [`Chunker::windows`].
#[derive(Debug, Clone)]
pub struct WordWindows<'a> {
    words: &'a [&'a str],
    chunk_size: usize,
    step: usize,
    start: usize,
    done: bool,
}

impl<'a> Iterator for WordWindows<'a> {
    type Item = &'a [&'a str];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let end = (self.start + self.chunk_size).min(self.words.len());
        let window = &self.words[self.start..end];
        if end == self.words.len() {
            self.done = true;
        } else {
            self.start += self.step;
        }
        Some(window)
    }
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalization used for content identity: trimmed and lowercased.
pub fn normalize_for_identity(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Hex SHA-256 of the identity-normalized text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_for_identity(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Split `text` into overlapping word-window chunks for `file_id`.
///
/// Orders are contiguous starting at 0. At least one chunk is always
/// returned; its text is empty when the input has no words.
pub fn chunk_text(file_id: &str, text: &str, chunker: &Chunker) -> Vec<Chunk> {
    let normalized = normalize_whitespace(text);
    let words: Vec<&str> = if normalized.is_empty() {
        Vec::new()
    } else {
        normalized.split(' ').collect()
    };

    chunker
        .windows(&words)
        .enumerate()
        .map(|(order, window)| {
            let text = window.join(" ");
            Chunk {
                id: content_hash(&text),
                file_id: file_id.to_string(),
                order,
                text,
            }
        })
        .collect()
}
