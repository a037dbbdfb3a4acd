//! Boundary detector.
//!
//! Produces an ordered sequence of boundary spans over a text buffer, using
//! one of three strategies selected by [`crate::classify::Category`]:
//! markdown headings, CST-derived code definitions, or none (the chunker
//! falls back to size-only chunking). Parser-load failure is never fatal:
//! the detector returns an empty span list and callers degrade gracefully.

pub mod cst;
pub mod markdown;

use crate::classify::Classification;
use crate::core::{Boundary, CodeKind};

/// One structural region in a source, with its byte and line extents.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySpan {
    /// 0-based byte offset where the span starts.
    pub start_byte: usize,
    /// 0-based byte offset where the span ends (exclusive).
    pub end_byte: usize,
    /// 1-based line where the span starts.
    pub start_line: usize,
    /// 1-based line where the span ends.
    pub end_line: usize,
    /// The boundary tag this span carries.
    pub boundary: Boundary,
}

impl BoundarySpan {
    /// Byte length of the span.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end_byte - self.start_byte
    }

    /// Whether the span is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start_byte >= self.end_byte
    }
}

/// Detects boundary spans for `text` given its classification.
///
/// Markdown files get heading spans; tree-sitter-supported code files get
/// function/method/class spans when the `cst` feature is enabled and a
/// grammar loads; everything else returns an empty list.
#[must_use]
pub fn detect_boundaries(text: &str, classification: &Classification) -> Vec<BoundarySpan> {
    if classification.is_markdown {
        return markdown::parse_headings(text);
    }
    if classification.is_code && classification.tree_sitter_supported {
        if let Some(language) = classification.language {
            return cst::parse_boundaries(text, language).unwrap_or_default();
        }
    }
    Vec::new()
}

/// Returns `true` if `kind` should be emitted as a span (function, method,
/// class definitions only).
#[must_use]
pub const fn is_span_worthy(kind: CodeKind) -> bool {
    matches!(kind, CodeKind::Function | CodeKind::Method | CodeKind::Class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    #[test]
    fn test_detect_boundaries_other_category_is_empty() {
        let spans = detect_boundaries("hello", &classify("txt"));
        assert!(spans.is_empty());
    }

    #[test]
    fn test_detect_boundaries_markdown_delegates() {
        let text = "# Title\n\nBody\n";
        let spans = detect_boundaries(text, &classify("md"));
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_is_span_worthy() {
        assert!(is_span_worthy(CodeKind::Function));
        assert!(is_span_worthy(CodeKind::Method));
        assert!(is_span_worthy(CodeKind::Class));
    }
}
