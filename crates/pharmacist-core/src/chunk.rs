//! Separator-boundary text chunker.
//!
//! Splits document text into [`Chunk`]s that respect a configurable
//! `chunk_size` (in characters, not bytes: the source material is Thai).
//! Splitting occurs on separator boundaries (`\n\n` by default) so that
//! paragraphs stay intact.
//!
//! # Algorithm
//!
//! 1. Cut the text into segments, each ending just after an occurrence of
//!    the separator. Segments are never split internally.
//! 2. Accumulate segments into the current chunk until adding the next
//!    one would exceed `chunk_size`, then emit the chunk.
//! 3. With `overlap > 0` the next chunk starts `overlap` characters before
//!    the previous chunk's end. If that prefix plus the next segment would
//!    not fit, the prefix is shortened until it does.
//! 4. A single segment longer than `chunk_size` is emitted as its own
//!    oversized chunk with no overlap prefix. It is the only case where a
//!    chunk may exceed `chunk_size`.
//!
//! Every chunk is an exact slice of the input, so the text is recovered by
//! concatenating chunks and skipping each chunk's overlap with its
//! predecessor (`previous.end_offset() - next.start_offset` bytes).
//!
//! # Example
//!
//! ```rust
//! use pharmacist_core::chunk::{split_text, ChunkingOptions};
//!
//! let opts = ChunkingOptions::new(1000, 0);
//! let chunks = split_text("doc", "Hello world.\n\nSecond paragraph.", &opts);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].sequence_index, 0);
//! ```

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

/// Paragraph boundary, the default separator.
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// Chunking policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkingOptions {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default)]
    pub chunk_overlap: usize,
    /// Boundary the text is cut on.
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self::new(1000, 0)
    }
}

impl ChunkingOptions {
    /// Options with the default paragraph separator.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separator: default_separator(),
        }
    }

    /// Replace the separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Check that the options describe a usable policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `chunk_size` is zero, the overlap is not
    /// smaller than `chunk_size`, or the separator is empty.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separator.is_empty() {
            return Err(Error::Config("separator must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Split a loaded [`Document`] into ordered chunks.
///
/// # Errors
///
/// Returns [`Error::Config`] if `options` fail [`ChunkingOptions::validate`].
pub fn split(document: &Document, options: &ChunkingOptions) -> Result<Vec<Chunk>> {
    options.validate()?;
    let chunks = split_text(&document.id, &document.text, options);
    debug!(
        document.id = %document.id,
        chunk_count = chunks.len(),
        chunk_size = options.chunk_size,
        overlap = options.chunk_overlap,
        "split document"
    );
    Ok(chunks)
}

/// Split raw text into chunks. `options` are assumed valid.
///
/// Returns an empty `Vec` for empty text. Sequence indices are contiguous
/// from 0.
pub fn split_text(source_id: &str, text: &str, options: &ChunkingOptions) -> Vec<Chunk> {
    let chunk_size = options.chunk_size.max(1);
    let segments = segment_bounds(text, &options.separator);
    let seg_chars: Vec<usize> = segments
        .iter()
        .map(|&(s, e)| text[s..e].chars().count())
        .collect();

    let mut chunks = Vec::new();
    let mut prev_end: Option<usize> = None;
    let mut i = 0;

    while i < segments.len() {
        let (seg_start, seg_end) = segments[i];

        if seg_chars[i] > chunk_size {
            warn!(
                source_id,
                sequence_index = chunks.len(),
                chars = seg_chars[i],
                chunk_size,
                "segment exceeds chunk_size; emitting oversized chunk"
            );
            chunks.push(make_chunk(source_id, chunks.len(), seg_start, &text[seg_start..seg_end]));
            prev_end = Some(seg_end);
            i += 1;
            continue;
        }

        let start = match prev_end {
            Some(end) if options.chunk_overlap > 0 => {
                let room = chunk_size - seg_chars[i];
                back_chars(text, end, options.chunk_overlap.min(room))
            }
            _ => seg_start,
        };

        let mut len = text[start..seg_end].chars().count();
        let mut end = seg_end;
        i += 1;

        while i < segments.len() && len + seg_chars[i] <= chunk_size {
            len += seg_chars[i];
            end = segments[i].1;
            i += 1;
        }

        chunks.push(make_chunk(source_id, chunks.len(), start, &text[start..end]));
        prev_end = Some(end);
    }

    chunks
}

/// Byte ranges of the segments of `text`, each ending just after `separator`.
fn segment_bounds(text: &str, separator: &str) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        let end = pos + separator.len();
        bounds.push((start, end));
        start = end;
    }
    if start < text.len() {
        bounds.push((start, text.len()));
    }
    bounds
}

/// Byte index `n` characters before `end` (clamped at 0).
fn back_chars(text: &str, end: usize, n: usize) -> usize {
    if n == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(end)
}

fn make_chunk(source_id: &str, index: usize, start: usize, text: &str) -> Chunk {
    Chunk {
        source_id: source_id.to_string(),
        sequence_index: index,
        start_offset: start,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(size: usize, overlap: usize) -> ChunkingOptions {
        ChunkingOptions::new(size, overlap)
    }

    fn reassemble(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut prev_end: usize = 0;
        for c in chunks {
            let skip = prev_end.saturating_sub(c.start_offset);
            out.push_str(&c.text[skip..]);
            prev_end = c.end_offset();
        }
        out
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("doc1", "Hello, world!", &opts(700, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text() {
        let chunks = split_text("doc1", "", &opts(700, 0));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_text("doc1", text, &opts(700, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_paragraphs_exceed_limit() {
        // Each paragraph plus separator is 24 chars; two fit in 50.
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = split_text("doc1", text, &opts(50, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].text,
            "This is paragraph one.\n\nThis is paragraph two.\n\n"
        );
        assert_eq!(chunks[1].text, "This is paragraph three.");
        assert_eq!(chunks[1].start_offset, chunks[0].end_offset());
    }

    #[test]
    fn test_sequence_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text("doc1", &text, &opts(40, 0));
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i, "Index mismatch at position {}", i);
            assert_eq!(c.source_id, "doc1");
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_oversized_segment_kept_whole() {
        let long = "x".repeat(30);
        let text = format!("short\n\n{}\n\ntail", long);
        let chunks = split_text("doc1", &text, &opts(10, 0));
        let oversized: Vec<_> = chunks.iter().filter(|c| c.char_len() > 10).collect();
        assert_eq!(oversized.len(), 1);
        assert!(oversized[0].text.starts_with(&long));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_length_measured_in_chars() {
        // Thai characters are 3 bytes each in UTF-8.
        let para = "ยาพาราเซตามอล";
        let n = para.chars().count();
        let text = format!("{para}\n\n{para}");
        let chunks = split_text("doc1", &text, &opts(n + 2, 0));
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert!(c.char_len() <= n + 2);
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_overlap_starts_before_previous_end() {
        let text = "aaaa\n\nbbbb\n\ncccc\n\ndddd";
        let chunks = split_text("doc1", text, &opts(12, 3));
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let shared = pair[0].end_offset() - pair[1].start_offset;
            assert!(shared <= 3);
        }
        assert_eq!(chunks[1].start_offset, chunks[0].end_offset() - 3);
        for c in &chunks {
            assert!(c.char_len() <= 12);
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_overlap_shortened_to_fit() {
        // Second segment is 9 chars; with size 10 only 1 char of overlap fits.
        let text = "aaaaaaa\n\nbbbbbbbbb";
        let chunks = split_text("doc1", text, &opts(10, 5));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "\nbbbbbbbbb");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_custom_separator() {
        let text = "one|two|three";
        let chunks = split_text("doc1", text, &opts(5, 0).with_separator("|"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one|", "two|", "three"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = split_text("doc1", text, &opts(12, 2));
        let c2 = split_text("doc1", text, &opts(12, 2));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        assert!(opts(0, 0).validate().is_err());
        assert!(opts(10, 10).validate().is_err());
        assert!(opts(10, 0).with_separator("").validate().is_err());
        assert!(opts(10, 9).validate().is_ok());
    }
}
