//! Size-only fixed-window chunking.
//!
//! Slides a window of length `size` over the text with step
//! `size - overlap`; the last window is truncated rather than
//! padded; trailing whitespace-only windows are discarded. This is both a
//! standalone strategy (no boundary awareness) and the fallback rule the
//! boundary-aware chunker uses to re-chunk oversized spans.

use crate::core::{Boundary, Fragment};
use crate::error::Result;

use super::traits::{ChunkConfig, Chunker};

/// One byte-range window produced by [`windows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

/// Slides a window of `size` bytes over `text` with step `size - overlap`,
/// respecting UTF-8 character boundaries, truncating the final window, and
/// discarding any window that is entirely whitespace.
#[must_use]
pub fn windows(text: &str, size: usize, overlap: usize) -> Vec<Window> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size - overlap;
    let mut result = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let target_end = (start + size).min(text.len());
        let end = char_boundary_at_or_before(text, target_end);
        let end = if end <= start { text.len().min(start + 1) } else { end };

        if !text[start..end].trim().is_empty() {
            result.push(Window { start, end });
        }

        if end >= text.len() {
            break;
        }

        let next_start = start + step.max(1);
        start = char_boundary_at_or_before(text, next_start).max(start + 1);
    }

    result
}

fn char_boundary_at_or_before(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Size-only chunker: no boundary awareness, fixed-size sliding windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedChunker;

impl FixedChunker {
    /// Creates a new size-only chunker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Chunker for FixedChunker {
    fn chunk(&self, source_id: &str, text: &str, config: &ChunkConfig) -> Result<Vec<Fragment>> {
        config.validate()?;
        let fragments = windows(text, config.size, config.overlap)
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let mut fragment = Fragment::with_boundary(
                    source_id.to_string(),
                    index,
                    text[window.start..window.end].to_string(),
                    Boundary::None,
                );
                fragment.has_overlap = index > 0 && config.overlap > 0;
                fragment
            })
            .collect();
        Ok(fragments)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "Fixed-size sliding window chunking with no boundary awareness"
    }
}
