//! Lexical reranker: boosts hits that contain the query verbatim.

use crate::storage::Hit;

/// Boosts any hit whose content contains `query` as a case-insensitive
/// substring by `boost_factor * (1 - hit.score)`, then re-sorts descending.
/// Idempotent and order-stable for hits that aren't boosted.
pub fn rerank(query: &str, mut hits: Vec<Hit>, boost_factor: f32) -> Vec<Hit> {
    let needle = query.to_lowercase();
    for hit in &mut hits {
        if hit.fragment.content.to_lowercase().contains(&needle) {
            hit.score += boost_factor * (1.0 - hit.score);
        }
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fragment;

    fn hit(content: &str, score: f32) -> Hit {
        Hit { fragment: Fragment::new("s".to_string(), 0, content.to_string()), score }
    }

    #[test]
    fn test_boosts_exact_substring_match() {
        let hits = vec![hit("no match here", 0.5), hit("contains NeEdLe text", 0.4)];
        let reranked = rerank("needle", hits, 0.5);
        assert_eq!(reranked[0].fragment.content, "contains NeEdLe text");
    }

    #[test]
    fn test_unboosted_hits_keep_relative_order() {
        let hits = vec![hit("a", 0.9), hit("b", 0.5)];
        let reranked = rerank("zzz", hits, 0.5);
        assert_eq!(reranked[0].fragment.content, "a");
        assert_eq!(reranked[1].fragment.content, "b");
    }

    #[test]
    fn test_reapplying_does_not_change_order() {
        let hits = vec![hit("needle here", 0.2), hit("no match", 0.15)];
        let once = rerank("needle", hits, 0.3);
        let twice = rerank("needle", once.clone(), 0.3);
        let order = |h: &[Hit]| h.iter().map(|x| x.fragment.content.clone()).collect::<Vec<_>>();
        assert_eq!(order(&once), order(&twice));
    }

    #[test]
    fn test_boost_factor_bounds_score_increase() {
        let hits = vec![hit("needle", 0.8)];
        let reranked = rerank("needle", hits, 1.0);
        assert!((reranked[0].score - 1.0).abs() < 1e-6);
    }
}
