//! Overlapping character-window text splitter.
//!
//! Splits page text into windows of at most `chunk_size` characters, with
//! consecutive windows sharing up to `chunk_overlap` characters. Lengths are
//! counted in `char`s, never bytes, so multi-byte text is never cut inside a
//! code point.
//!
//! # Algorithm
//!
//! 1. Trim the text. Blank text yields no chunks; text that fits in one
//!    window yields exactly one chunk.
//! 2. From the current start, take the hard window end `start + chunk_size`.
//! 3. Pull the end back to the last separator (`"\n\n"`, then `"\n"`, then
//!    `" "`) found in the second half of the window, if any.
//! 4. The next window starts `chunk_overlap` characters before the end,
//!    moved forward to the next word start, and always after the previous
//!    start. Because the next start never passes the previous end, every
//!    character lands in at least one window.
//!
//! Each chunk carries a SHA-256 of its text and the page it came from.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200);
//! let pieces = splitter.split_text("A short page.");
//! assert_eq!(pieces, vec!["A short page.".to_string()]);
//! ```

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Page};

/// Preferred window boundaries, strongest first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_size` is clamped to at least 1 and `chunk_overlap` to below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one text into ordered, overlapping windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if n <= self.chunk_size {
            return vec![text.to_string()];
        }

        // bounds[k] is the byte offset of char k; bounds[n] == text.len().
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut pieces = Vec::new();
        let mut start = 0usize;

        loop {
            let hard_end = (start + self.chunk_size).min(n);
            let end = if hard_end == n {
                n
            } else {
                self.snap_end(text, &bounds, start, hard_end)
            };

            let piece = text[bounds[start]..bounds[end]].trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }

            if end == n {
                break;
            }

            let next = end.saturating_sub(self.chunk_overlap).max(start + 1);
            start = snap_start(&chars, next, end);
        }

        pieces
    }

    /// Split every page and number the chunks contiguously across pages.
    pub fn split_pages(&self, document_id: &str, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_index: i64 = 0;

        for page in pages {
            for piece in self.split_text(&page.text) {
                chunks.push(make_chunk(document_id, chunk_index, page.number, piece));
                chunk_index += 1;
            }
        }

        chunks
    }

    fn snap_end(&self, text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
        let lo = start + self.chunk_size / 2;
        let window = &text[bounds[lo]..bounds[hard_end]];

        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let byte = bounds[lo] + pos + sep.len();
                // Separators are ASCII, so `byte` is always a char boundary.
                if let Ok(idx) = bounds.binary_search(&byte) {
                    return idx;
                }
            }
        }

        hard_end
    }
}

/// Move a window start forward to the beginning of a word, staying at or
/// before `limit`.
fn snap_start(chars: &[char], start: usize, limit: usize) -> usize {
    if start == 0 || chars[start - 1].is_whitespace() {
        return start;
    }
    (start..limit)
        .find(|&k| chars[k].is_whitespace())
        .map(|k| k + 1)
        .filter(|&k| k < limit)
        .unwrap_or(start)
}

fn make_chunk(document_id: &str, index: i64, page: u32, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_id: document_id.to_string(),
        chunk_index: index,
        page,
        text,
        hash,
    }
}
