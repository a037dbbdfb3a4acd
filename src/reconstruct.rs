//! Reconstructor: recovers a hit's owning source text or containing
//! section from the fragments stored alongside it.

use crate::core::stitch_fragments;
use crate::storage::{Hit, ListOptions, VectorStore};

/// Returns the full original text of `hit`'s source: the source row's
/// `original_content` if the caller preserved one (via
/// `__original_content` metadata on the source's first fragment), else all
/// of that source's fragments stitched in `chunk_index` order.
///
/// # Errors
///
/// Propagates storage errors from listing the source's fragments.
pub fn get_original_content(store: &dyn VectorStore, hit: &Hit) -> crate::error::Result<String> {
    if let Some(original) = hit.fragment.metadata.get("__original_content") {
        return Ok(original.clone());
    }

    let fragments = store.list(&ListOptions { limit: None, offset: None, filter: None })?;
    let mut same_source: Vec<_> = fragments.into_iter().filter(|f| f.source_id == hit.fragment.source_id).collect();
    same_source.sort_by_key(|f| f.chunk_index);
    Ok(stitch_fragments(same_source.iter().map(|f| f.content.as_str())))
}

/// Returns the text of the structural section `hit` belongs to: the hit's
/// own content if it carries no boundary, otherwise every fragment in the
/// same source whose boundary matches, stitched in order.
///
/// Failure to query the store degrades to returning the hit's own content
/// rather than propagating an error — this is a minimum-viable-result
/// policy, not a best-effort-with-logging one.
#[must_use]
pub fn get_section_content(store: &dyn VectorStore, hit: &Hit) -> String {
    if hit.fragment.boundary.is_none() {
        return hit.fragment.content.clone();
    }

    let Ok(fragments) = store.list(&ListOptions { limit: None, offset: None, filter: None }) else {
        return hit.fragment.content.clone();
    };

    let mut matching: Vec<_> = fragments
        .into_iter()
        .filter(|f| f.source_id == hit.fragment.source_id && f.boundary_matches(&hit.fragment.boundary))
        .collect();

    if matching.is_empty() {
        return hit.fragment.content.clone();
    }
    matching.sort_by_key(|f| f.chunk_index);
    stitch_fragments(matching.iter().map(|f| f.content.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Boundary, Fragment};
    use crate::storage::{BackendConfig, open};

    fn store_with_section() -> Box<dyn VectorStore> {
        let mut store = open(BackendConfig::Memory { dimensions: 3 }).unwrap();
        store.initialize().unwrap();
        let boundary = Boundary::Heading { level: 1, title: "Intro".to_string() };
        store
            .insert(
                Fragment::with_boundary("s1".to_string(), 0, "Hello, ".to_string(), boundary.clone()),
                vec![1.0, 0.0, 0.0],
            )
            .unwrap();
        store
            .insert(
                Fragment::with_boundary("s1".to_string(), 1, "world!".to_string(), boundary),
                vec![0.0, 1.0, 0.0],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_get_original_content_stitches_all_fragments() {
        let store = store_with_section();
        let hit = Hit {
            fragment: Fragment::new("s1".to_string(), 0, "Hello, ".to_string()),
            score: 1.0,
        };
        let content = get_original_content(store.as_ref(), &hit).unwrap();
        assert_eq!(content, "Hello, world!");
    }

    #[test]
    fn test_get_section_content_no_boundary_returns_own_content() {
        let store = store_with_section();
        let hit = Hit {
            fragment: Fragment::new("s1".to_string(), 0, "standalone".to_string()),
            score: 1.0,
        };
        assert_eq!(get_section_content(store.as_ref(), &hit), "standalone");
    }

    #[test]
    fn test_get_section_content_stitches_matching_boundary() {
        let store = store_with_section();
        let boundary = Boundary::Heading { level: 1, title: "Intro".to_string() };
        let hit = Hit {
            fragment: Fragment::with_boundary("s1".to_string(), 0, "Hello, ".to_string(), boundary),
            score: 1.0,
        };
        let content = get_section_content(store.as_ref(), &hit);
        assert_eq!(content, "Hello, world!");
    }
}
