//! Hybrid search engine: semantic, keyword, and weighted-fusion
//! retrieval over any [`VectorStore`] backend, plus a lexical reranker.

pub mod rerank;

use std::collections::{HashMap, HashSet};

use crate::core::SourceType;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::storage::{Filter, Hit, ListOptions, SearchOptions, VectorStore};

pub use rerank::rerank;

/// Default number of hits returned by a search call.
pub const DEFAULT_TOP_K: usize = 10;

/// Default boost factor applied by the reranker.
pub const DEFAULT_BOOST_FACTOR: f32 = 0.3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "were", "will", "with", "this", "but", "or",
    "not", "no", "so", "if", "than", "then",
    "これ", "それ", "あれ", "この", "その", "あの", "です", "ます", "した", "して", "いる",
];

/// Options shared by [`semantic`], [`keyword`], and [`hybrid`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Maximum number of hits to return.
    pub k: usize,
    /// Restrict results to fragments belonging to a source of this type.
    pub source_type: Option<SourceType>,
    /// Whether to apply the lexical reranker to the final hit list.
    pub rerank: bool,
    /// Weight given to the keyword side of [`hybrid`], in `[0, 1]`.
    pub keyword_weight: f32,
}

impl QueryOptions {
    /// Creates query options with the given `k`, reranking and keyword
    /// fusion both off.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, source_type: None, rerank: false, keyword_weight: 0.0 }
    }

    fn to_filter(&self) -> Option<Filter> {
        self.source_type.map(|source_type| {
            let mut filter = HashMap::new();
            filter.insert("__source_type".to_string(), source_type.as_str().to_string());
            filter
        })
    }
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 2 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

fn min_max_normalize(hits: &mut [Hit]) {
    if hits.is_empty() {
        return;
    }
    let min = hits.iter().map(|h| h.score).fold(f32::INFINITY, f32::min);
    let max = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    for hit in hits {
        hit.score = if range > f32::EPSILON { (hit.score - min) / range } else { 1.0 };
    }
}

fn dedupe_keep_max(hits: Vec<Hit>) -> Vec<Hit> {
    let mut best: HashMap<String, Hit> = HashMap::new();
    for hit in hits {
        let id = hit.fragment.id.clone().unwrap_or_default();
        best.entry(id)
            .and_modify(|existing| {
                if hit.score > existing.score {
                    *existing = hit.clone();
                }
            })
            .or_insert(hit);
    }
    let mut hits: Vec<Hit> = best.into_values().collect();
    crate::storage::traits::sort_hits(&mut hits);
    hits
}

/// Embeds `query` and performs vector similarity search against `store`.
///
/// # Errors
///
/// Propagates embedding and storage errors.
#[tracing::instrument(skip(store, embedder, query), fields(k = options.k))]
pub fn semantic(store: &dyn VectorStore, embedder: &dyn Embedder, query: &str, options: &QueryOptions) -> Result<Vec<Hit>> {
    let vector = embedder.embed(query)?;
    let mut hits = store.search(&vector, &SearchOptions { k: options.k, filter: options.to_filter() })?;
    if options.rerank {
        hits = rerank(query, hits, DEFAULT_BOOST_FACTOR);
    }
    hits.truncate(options.k.max(1));
    Ok(hits)
}

/// Term-frequency / fragment-length keyword search, approximating BM25
/// without corpus-wide IDF — IDF is unavailable without a separate
/// term-statistics pass.
///
/// # Errors
///
/// Propagates storage errors.
#[tracing::instrument(skip(store, query), fields(k = options.k))]
pub fn keyword(store: &dyn VectorStore, query: &str, options: &QueryOptions) -> Result<Vec<Hit>> {
    let terms: HashSet<String> = tokenize(query).into_iter().collect();
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let fragments = store.list(&ListOptions { limit: None, offset: None, filter: options.to_filter() })?;
    let mut hits: Vec<Hit> = fragments
        .into_iter()
        .filter_map(|fragment| {
            let tokens = tokenize(&fragment.content);
            if tokens.is_empty() {
                return None;
            }
            let matches = tokens.iter().filter(|t| terms.contains(*t)).count();
            if matches == 0 {
                return None;
            }
            #[allow(clippy::cast_precision_loss)]
            let score = matches as f32 / tokens.len() as f32;
            Some(Hit { fragment, score })
        })
        .collect();

    crate::storage::traits::sort_hits(&mut hits);
    hits.truncate((options.k.max(1)) * 2);
    if options.rerank {
        hits = rerank(query, hits, DEFAULT_BOOST_FACTOR);
    }
    hits.truncate(options.k.max(1));
    Ok(hits)
}

/// Weighted fusion of [`semantic`] and [`keyword`] search: each side
/// is computed at `2k`, min-max normalized independently, combined by
/// `(1 - keyword_weight) * semantic + keyword_weight * keyword`, deduped by
/// fragment id keeping the max, and truncated to `k`.
///
/// `keyword_weight = 0` reduces to [`semantic`] in both membership and
/// order (modulo score ties), since the keyword side then contributes
/// nothing to the combined score.
///
/// # Errors
///
/// Propagates embedding and storage errors.
#[tracing::instrument(skip(store, embedder, query), fields(k = options.k, keyword_weight = options.keyword_weight))]
pub fn hybrid(store: &dyn VectorStore, embedder: &dyn Embedder, query: &str, options: &QueryOptions) -> Result<Vec<Hit>> {
    let fanout_k = options.k.max(1) * 2;
    let fanout = QueryOptions { k: fanout_k, rerank: false, ..options.clone() };

    let mut semantic_hits = semantic(store, embedder, query, &fanout)?;
    let mut keyword_hits = keyword(store, query, &fanout)?;

    min_max_normalize(&mut semantic_hits);
    min_max_normalize(&mut keyword_hits);

    let kw = options.keyword_weight.clamp(0.0, 1.0);
    let mut combined: HashMap<String, Hit> = HashMap::new();
    for hit in semantic_hits {
        let id = hit.fragment.id.clone().unwrap_or_default();
        let score = (1.0 - kw) * hit.score;
        combined.insert(id, Hit { fragment: hit.fragment, score });
    }
    for hit in keyword_hits {
        let id = hit.fragment.id.clone().unwrap_or_default();
        let contribution = kw * hit.score;
        combined
            .entry(id)
            .and_modify(|existing| existing.score += contribution)
            .or_insert(Hit { fragment: hit.fragment, score: contribution });
    }

    let mut hits = dedupe_keep_max(combined.into_values().collect());
    if options.rerank {
        hits = rerank(query, hits, DEFAULT_BOOST_FACTOR);
    }
    hits.truncate(options.k.max(1));
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fragment;
    use crate::embedding::FallbackEmbedder;
    use crate::storage::{BackendConfig, open};

    fn populated_store() -> Box<dyn VectorStore> {
        let embedder = FallbackEmbedder::new(8);
        let mut store = open(BackendConfig::Memory { dimensions: 8 }).unwrap();
        store.initialize().unwrap();
        for (i, text) in ["the quick brown fox", "machine learning basics", "rust systems programming"]
            .iter()
            .enumerate()
        {
            let embedding = embedder.embed(text).unwrap();
            store.insert(Fragment::new("s".to_string(), i, (*text).to_string()), embedding).unwrap();
        }
        store
    }

    #[test]
    fn test_tokenize_strips_stop_words_and_short_tokens() {
        let tokens = tokenize("The quick a fox");
        assert_eq!(tokens, vec!["quick".to_string(), "fox".to_string()]);
    }

    #[test]
    fn test_keyword_search_finds_exact_term() {
        let store = populated_store();
        let hits = keyword(store.as_ref(), "rust programming", &QueryOptions::new(5)).unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].fragment.content.contains("rust"));
    }

    #[test]
    fn test_keyword_search_no_terms_returns_empty() {
        let store = populated_store();
        let hits = keyword(store.as_ref(), "a an the", &QueryOptions::new(5)).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_semantic_search_returns_hits() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let hits = semantic(store.as_ref(), &embedder, "fox", &QueryOptions::new(2)).unwrap();
        assert!(!hits.is_empty());
        assert!(hits.len() <= 2);
    }

    #[test]
    fn test_hybrid_with_zero_keyword_weight_matches_semantic_membership() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let options = QueryOptions { k: 2, keyword_weight: 0.0, ..QueryOptions::new(2) };
        let semantic_hits = semantic(store.as_ref(), &embedder, "fox", &options).unwrap();
        let hybrid_hits = hybrid(store.as_ref(), &embedder, "fox", &options).unwrap();
        let semantic_ids: HashSet<_> = semantic_hits.iter().filter_map(|h| h.fragment.id.clone()).collect();
        let hybrid_ids: HashSet<_> = hybrid_hits.iter().filter_map(|h| h.fragment.id.clone()).collect();
        assert_eq!(semantic_ids, hybrid_ids);
    }

    #[test]
    fn test_min_max_normalize_single_hit_maps_to_one() {
        let mut hits = vec![Hit { fragment: Fragment::new("s".to_string(), 0, "a".to_string()), score: 0.42 }];
        min_max_normalize(&mut hits);
        assert!((hits[0].score - 1.0).abs() < f32::EPSILON);
    }
}
