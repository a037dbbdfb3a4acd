//! Boundary-aware chunker.
//!
//! The default chunking strategy: when boundary spans are available for the
//! source's classification, emits one fragment per span (re-chunking
//! oversized spans by the size rule, merging undersized ones with their
//! sibling), then falls back to size-only windows for any text the spans
//! don't cover.

use crate::boundary::{self, BoundarySpan};
use crate::classify;
use crate::core::{Boundary, Fragment};
use crate::error::Result;

use super::fixed;
use super::traits::{ChunkConfig, Chunker};

/// Boundary-aware chunker: markdown headings or CST definitions when
/// available, size-only windows otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryAwareChunker;

impl BoundaryAwareChunker {
    /// Creates a new boundary-aware chunker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Chunker for BoundaryAwareChunker {
    fn chunk(&self, source_id: &str, text: &str, config: &ChunkConfig) -> Result<Vec<Fragment>> {
        config.validate()?;

        if text.is_empty() {
            return Ok(Vec::new());
        }

        let classification = classify::classify(config.file_path.as_deref().unwrap_or(""));

        let spans = if config.preserve_boundaries {
            boundary::detect_boundaries(text, &classification)
        } else {
            Vec::new()
        };

        if spans.is_empty() {
            return fixed::FixedChunker::new().chunk(source_id, text, config);
        }

        let spans = merge_short_spans(spans, config.size / 4);
        let fragments = emit_fragments(source_id, text, &spans, config);
        Ok(fragments)
    }

    fn name(&self) -> &'static str {
        "boundary-aware"
    }

    fn description(&self) -> &'static str {
        "Chunks at markdown heading or code definition boundaries, falling back to fixed windows"
    }
}

/// Merges spans shorter than `min_len` into their immediately preceding
/// sibling span, when one with the same boundary "shape" exists.
fn merge_short_spans(spans: Vec<BoundarySpan>, min_len: usize) -> Vec<BoundarySpan> {
    if min_len == 0 {
        return spans;
    }
    let mut merged: Vec<BoundarySpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.len() < min_len {
            if let Some(prev) = merged.last_mut() {
                if same_shape(&prev.boundary, &span.boundary) {
                    prev.end_byte = span.end_byte;
                    prev.end_line = span.end_line;
                    continue;
                }
            }
        }
        merged.push(span);
    }
    merged
}

fn same_shape(a: &Boundary, b: &Boundary) -> bool {
    matches!(
        (a, b),
        (Boundary::Heading { .. }, Boundary::Heading { .. })
            | (Boundary::Code { .. }, Boundary::Code { .. })
    )
}

/// Converts spans into dense, ordered fragments, re-chunking any span that
/// exceeds `config.size` and covering gaps between spans with size-only
/// windows.
fn emit_fragments(
    source_id: &str,
    text: &str,
    spans: &[BoundarySpan],
    config: &ChunkConfig,
) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut cursor = 0usize;
    let mut index = 0usize;

    for span in spans {
        if span.start_byte > cursor {
            for window in fixed::windows(&text[cursor..span.start_byte], config.size, config.overlap) {
                push_fragment(
                    &mut fragments,
                    &mut index,
                    source_id,
                    &text[cursor + window.start..cursor + window.end],
                    Boundary::None,
                    None,
                );
            }
        }

        let span_text = &text[span.start_byte..span.end_byte];
        if span_text.len() > config.size {
            for window in fixed::windows(span_text, config.size, config.overlap) {
                push_fragment(
                    &mut fragments,
                    &mut index,
                    source_id,
                    &span_text[window.start..window.end],
                    span.boundary.clone(),
                    Some((span.start_line, span.end_line)),
                );
            }
        } else if !span_text.trim().is_empty() {
            push_fragment(
                &mut fragments,
                &mut index,
                source_id,
                span_text,
                span.boundary.clone(),
                Some((span.start_line, span.end_line)),
            );
        }

        cursor = span.end_byte.max(cursor);
    }

    if cursor < text.len() {
        for window in fixed::windows(&text[cursor..], config.size, config.overlap) {
            push_fragment(
                &mut fragments,
                &mut index,
                source_id,
                &text[cursor + window.start..cursor + window.end],
                Boundary::None,
                None,
            );
        }
    }

    fragments
}

fn push_fragment(
    fragments: &mut Vec<Fragment>,
    index: &mut usize,
    source_id: &str,
    content: &str,
    boundary: Boundary,
    lines: Option<(usize, usize)>,
) {
    let mut fragment =
        Fragment::with_boundary(source_id.to_string(), *index, content.to_string(), boundary);
    if let Some((start, end)) = lines {
        fragment.set_line_range(start, end);
    }
    fragments.push(fragment);
    *index += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_headings_become_fragments() {
        let chunker = BoundaryAwareChunker::new();
        let text = "# A\nbody a\n## B\nbody b\n";
        let config = ChunkConfig::with_size(1000).file_path("notes.md");
        let fragments = chunker.chunk("src", text, &config).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].boundary.heading_title(), Some("A"));
        assert_eq!(fragments[1].boundary.heading_title(), Some("B"));
    }

    #[test]
    fn test_no_boundaries_falls_back_to_fixed() {
        let chunker = BoundaryAwareChunker::new();
        let text = "plain text with no structure at all here";
        let config = ChunkConfig::with_size(10).file_path("notes.txt");
        let fragments = chunker.chunk("src", text, &config).unwrap();
        assert!(fragments.iter().all(|f| f.boundary.is_none()));
    }

    #[test]
    fn test_reconstruction_contract_markdown() {
        let chunker = BoundaryAwareChunker::new();
        let text = "# Title\nintro line\n## Sub\nmore text\n";
        let config = ChunkConfig::with_size(1000).file_path("doc.md");
        let fragments = chunker.chunk("src", text, &config).unwrap();
        let stitched = crate::core::stitch_fragments(fragments.iter().map(|f| f.content.as_str()));
        assert_eq!(stitched, text);
    }

    #[test]
    fn test_oversized_span_is_rechunked() {
        let chunker = BoundaryAwareChunker::new();
        let body = "x".repeat(100);
        let text = format!("# Title\n{body}\n");
        let config = ChunkConfig::with_size(20).file_path("doc.md");
        let fragments = chunker.chunk("src", &text, &config).unwrap();
        assert!(fragments.len() > 1);
        assert!(fragments.iter().all(|f| f.boundary.heading_title() == Some("Title")));
    }

    #[test]
    fn test_dense_chunk_indices() {
        let chunker = BoundaryAwareChunker::new();
        let text = "# A\nbody\n## B\nbody2\n";
        let config = ChunkConfig::with_size(1000).file_path("doc.md");
        let fragments = chunker.chunk("src", text, &config).unwrap();
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.chunk_index, i);
        }
    }

    #[test]
    fn test_empty_text_yields_no_fragments() {
        let chunker = BoundaryAwareChunker::new();
        let config = ChunkConfig::with_size(10);
        assert!(chunker.chunk("src", "", &config).unwrap().is_empty());
    }
}
