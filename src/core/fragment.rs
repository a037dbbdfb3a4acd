//! Fragment entities.
//!
//! A [`Fragment`] is one chunk of a [`super::Source`], the unit of vector
//! search. `(source_id, chunk_index)` is unique within a source; the multiset
//! of fragment contents, laid out in `chunk_index` order with overlaps
//! stripped, reconstructs the source's original text byte-for-byte.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of code definition a [`Boundary::Code`] span covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// A free function.
    Function,
    /// A class, struct, or equivalent type definition.
    Class,
    /// A method defined on a class/struct/impl.
    Method,
}

/// Structural region a fragment was derived from, attached to support
/// section reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Boundary {
    /// A markdown heading section.
    Heading {
        /// Heading level, 1 through 6.
        level: u8,
        /// Heading title text, without the leading `#` markers.
        title: String,
    },
    /// A code definition located by a CST parser.
    Code {
        /// What kind of definition this is.
        kind: CodeKind,
        /// The definition's identifier, when it could be extracted.
        name: Option<String>,
    },
    /// No structural boundary; produced by size-only chunking.
    None,
}

impl Boundary {
    /// Returns `true` if this is [`Boundary::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the heading level when this is a [`Boundary::Heading`].
    #[must_use]
    pub const fn heading_level(&self) -> Option<u8> {
        match self {
            Self::Heading { level, .. } => Some(*level),
            _ => None,
        }
    }

    /// Returns the heading title when this is a [`Boundary::Heading`].
    #[must_use]
    pub fn heading_title(&self) -> Option<&str> {
        match self {
            Self::Heading { title, .. } => Some(title.as_str()),
            _ => None,
        }
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::None
    }
}

/// One chunk of a source.
///
/// # Examples
///
/// ```
/// use fragmint::core::{Fragment, Boundary};
///
/// let fragment = Fragment::new("src-1".to_string(), 0, "Hello, world!".to_string());
/// assert_eq!(fragment.chunk_index, 0);
/// assert!(fragment.boundary.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable id, assigned by the storage layer (UUIDv4 if the caller omits one).
    pub id: Option<String>,

    /// Id of the owning source.
    pub source_id: String,

    /// Dense, 0-based position within the source.
    pub chunk_index: usize,

    /// Fragment text content.
    pub content: String,

    /// Structural boundary this fragment was derived from, if any.
    pub boundary: Boundary,

    /// 1-based start line within the source, when known.
    pub start_line: Option<usize>,

    /// 1-based end line within the source, when known.
    pub end_line: Option<usize>,

    /// Whether this fragment's leading edge overlaps the previous fragment.
    pub has_overlap: bool,

    /// Free-form metadata, serialized as a JSON object at the storage boundary.
    pub metadata: HashMap<String, String>,
}

impl Fragment {
    /// Creates a new fragment with no boundary tag.
    #[must_use]
    pub fn new(source_id: String, chunk_index: usize, content: String) -> Self {
        Self {
            id: None,
            source_id,
            chunk_index,
            content,
            boundary: Boundary::None,
            start_line: None,
            end_line: None,
            has_overlap: false,
            metadata: HashMap::new(),
        }
    }

    /// Creates a new fragment tagged with a boundary.
    #[must_use]
    pub fn with_boundary(
        source_id: String,
        chunk_index: usize,
        content: String,
        boundary: Boundary,
    ) -> Self {
        let mut fragment = Self::new(source_id, chunk_index, content);
        fragment.boundary = boundary;
        fragment
    }

    /// Returns the fragment's size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Returns `true` if the fragment has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Sets the line range for this fragment.
    pub fn set_line_range(&mut self, start: usize, end: usize) {
        self.start_line = Some(start);
        self.end_line = Some(end);
    }

    /// Returns `true` if this fragment's `boundary` matches `other`'s on
    /// `type`, `title`/`name`, and `level` for the fields that are set.
    #[must_use]
    pub fn boundary_matches(&self, other: &Boundary) -> bool {
        match (&self.boundary, other) {
            (
                Boundary::Heading { level: l1, title: t1 },
                Boundary::Heading { level: l2, title: t2 },
            ) => l1 == l2 && t1 == t2,
            (Boundary::Code { kind: k1, name: n1 }, Boundary::Code { kind: k2, name: n2 }) => {
                k1 == k2 && n1 == n2
            }
            (Boundary::None, Boundary::None) => true,
            _ => false,
        }
    }

    /// A lightweight preview of the content, truncated to `max_len` bytes at
    /// a valid UTF-8 boundary.
    #[must_use]
    pub fn preview(&self, max_len: usize) -> &str {
        if self.content.len() <= max_len {
            &self.content
        } else {
            let end = find_char_boundary(&self.content, max_len);
            &self.content[..end]
        }
    }
}

fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut boundary = pos;
    while !s.is_char_boundary(boundary) && boundary > 0 {
        boundary -= 1;
    }
    boundary
}

/// Strips the pairwise overlap between two adjacent fragment texts by
/// longest-common suffix/prefix, then concatenates. Used both by the
/// chunker's reconstruction contract and the reconstructor.
#[must_use]
pub fn stitch_overlap(prefix: &str, next: &str) -> String {
    let max_overlap = prefix.len().min(next.len());
    for overlap_len in (1..=max_overlap).rev() {
        let Some(suffix_start) = char_boundary_from_end(prefix, overlap_len) else {
            continue;
        };
        let Some(prefix_slice) = prefix.get(suffix_start..) else {
            continue;
        };
        if next.starts_with(prefix_slice) {
            let mut combined = String::with_capacity(prefix.len() + next.len() - overlap_len);
            combined.push_str(prefix);
            combined.push_str(&next[prefix_slice.len()..]);
            return combined;
        }
    }
    format!("{prefix}{next}")
}

fn char_boundary_from_end(s: &str, len_from_end: usize) -> Option<usize> {
    if len_from_end > s.len() {
        return None;
    }
    let mut pos = s.len() - len_from_end;
    while pos < s.len() && !s.is_char_boundary(pos) {
        pos += 1;
    }
    Some(pos)
}

/// Concatenates a sequence of fragment texts (already ordered by
/// `chunk_index`), stripping pairwise overlaps between neighbours.
#[must_use]
pub fn stitch_fragments<'a, I: IntoIterator<Item = &'a str>>(texts: I) -> String {
    let mut result = String::new();
    for text in texts {
        if result.is_empty() {
            result.push_str(text);
        } else {
            result = stitch_overlap(&result, text);
        }
    }
    result
}
