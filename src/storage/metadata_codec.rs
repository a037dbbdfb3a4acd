//! Encodes/decodes the non-string parts of a [`Fragment`] (its `boundary`,
//! line range, and overlap flag) into the flat string metadata map that
//! every backend persists, so a single `metadata_json` column or column
//! family can carry the whole row.
//!
//! Keys prefixed `__` are reserved for this encoding and for source-row
//! upsert fields (`__title`, `__url`, `__source_type`, `__original_content`)
//! folded in by [`crate::storage::traits::BaseAdapter`]; callers see the
//! full flat map, including these reserved keys, but they are never
//! surfaced by [`crate::classify`] or [`crate::boundary`] themselves.

use std::collections::HashMap;

use crate::core::{Boundary, CodeKind, Fragment};

const KEY_BOUNDARY_TYPE: &str = "__boundary_type";
const KEY_BOUNDARY_LEVEL: &str = "__boundary_level";
const KEY_BOUNDARY_TITLE: &str = "__boundary_title";
const KEY_BOUNDARY_KIND: &str = "__boundary_kind";
const KEY_BOUNDARY_NAME: &str = "__boundary_name";
const KEY_START_LINE: &str = "__start_line";
const KEY_END_LINE: &str = "__end_line";
const KEY_HAS_OVERLAP: &str = "__has_overlap";

/// Builds the full metadata map to persist for `fragment`, folding in its
/// boundary, line range, and overlap flag alongside its free-form metadata.
#[must_use]
pub fn encode(fragment: &Fragment) -> HashMap<String, String> {
    let mut map = fragment.metadata.clone();

    match &fragment.boundary {
        Boundary::Heading { level, title } => {
            map.insert(KEY_BOUNDARY_TYPE.to_string(), "heading".to_string());
            map.insert(KEY_BOUNDARY_LEVEL.to_string(), level.to_string());
            map.insert(KEY_BOUNDARY_TITLE.to_string(), title.clone());
        }
        Boundary::Code { kind, name } => {
            map.insert(KEY_BOUNDARY_TYPE.to_string(), "code".to_string());
            map.insert(KEY_BOUNDARY_KIND.to_string(), code_kind_str(*kind).to_string());
            if let Some(name) = name {
                map.insert(KEY_BOUNDARY_NAME.to_string(), name.clone());
            }
        }
        Boundary::None => {}
    }

    if let Some(start) = fragment.start_line {
        map.insert(KEY_START_LINE.to_string(), start.to_string());
    }
    if let Some(end) = fragment.end_line {
        map.insert(KEY_END_LINE.to_string(), end.to_string());
    }
    if fragment.has_overlap {
        map.insert(KEY_HAS_OVERLAP.to_string(), "true".to_string());
    }

    map
}

/// Reconstructs the [`Boundary`] a fragment carried from its decoded
/// metadata map.
#[must_use]
pub fn boundary_from_metadata(map: &HashMap<String, String>) -> Boundary {
    match map.get(KEY_BOUNDARY_TYPE).map(String::as_str) {
        Some("heading") => {
            let level = map.get(KEY_BOUNDARY_LEVEL).and_then(|v| v.parse().ok()).unwrap_or(1);
            let title = map.get(KEY_BOUNDARY_TITLE).cloned().unwrap_or_default();
            Boundary::Heading { level, title }
        }
        Some("code") => {
            let kind = map.get(KEY_BOUNDARY_KIND).map_or(CodeKind::Function, |v| code_kind_from_str(v));
            let name = map.get(KEY_BOUNDARY_NAME).cloned();
            Boundary::Code { kind, name }
        }
        _ => Boundary::None,
    }
}

fn code_kind_str(kind: CodeKind) -> &'static str {
    match kind {
        CodeKind::Function => "function",
        CodeKind::Class => "class",
        CodeKind::Method => "method",
    }
}

fn code_kind_from_str(s: &str) -> CodeKind {
    match s {
        "class" => CodeKind::Class,
        "method" => CodeKind::Method,
        _ => CodeKind::Function,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_heading() {
        let fragment = Fragment::with_boundary(
            "s".to_string(),
            0,
            "text".to_string(),
            Boundary::Heading { level: 2, title: "Intro".to_string() },
        );
        let encoded = encode(&fragment);
        let decoded = boundary_from_metadata(&encoded);
        assert_eq!(decoded, fragment.boundary);
    }

    #[test]
    fn test_roundtrip_code() {
        let fragment = Fragment::with_boundary(
            "s".to_string(),
            0,
            "text".to_string(),
            Boundary::Code { kind: CodeKind::Method, name: Some("foo".to_string()) },
        );
        let encoded = encode(&fragment);
        let decoded = boundary_from_metadata(&encoded);
        assert_eq!(decoded, fragment.boundary);
    }

    #[test]
    fn test_roundtrip_none() {
        let fragment = Fragment::new("s".to_string(), 0, "text".to_string());
        let encoded = encode(&fragment);
        assert_eq!(boundary_from_metadata(&encoded), Boundary::None);
    }

    #[test]
    fn test_line_range_and_overlap_encoded() {
        let mut fragment = Fragment::new("s".to_string(), 0, "text".to_string());
        fragment.set_line_range(3, 9);
        fragment.has_overlap = true;
        let encoded = encode(&fragment);
        assert_eq!(encoded.get(KEY_START_LINE), Some(&"3".to_string()));
        assert_eq!(encoded.get(KEY_END_LINE), Some(&"9".to_string()));
        assert_eq!(encoded.get(KEY_HAS_OVERLAP), Some(&"true".to_string()));
    }
}
