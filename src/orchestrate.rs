//! Query orchestrator: multi-stage chains, goal-aware agent queries
//! with paginated summaries, and a bounded recent-query cache.

use std::collections::{HashMap, VecDeque};

use crate::core::SourceType;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::search::{self, QueryOptions};
use crate::storage::{Hit, VectorStore};

/// Maximum number of cached queries retained; oldest is evicted first.
pub const QUERY_CACHE_CAPACITY: usize = 100;

/// Maximum hits returned per [`agent_query`] page.
pub const MAX_PAGE_SIZE: usize = 10;

/// Keyword weight applied to the hybrid stages of [`agent_mode_chain`].
const AGENT_CHAIN_KEYWORD_WEIGHT: f32 = 0.5;

/// One stage of a [`run_chain`] invocation.
#[derive(Debug, Clone)]
pub struct Stage {
    /// The query text for this stage.
    pub query: String,
    /// Whether to fuse keyword search in (via [`search::hybrid`]) rather
    /// than running [`search::semantic`] alone.
    pub hybrid: bool,
    /// Number of hits to request from the search engine at this stage.
    pub k: usize,
    /// Whether to rerank this stage's hits.
    pub rerank: bool,
    /// Keyword weight, used only when `hybrid` is set.
    pub keyword_weight: f32,
    /// Restrict this stage to a single source type.
    pub source_type: Option<SourceType>,
    /// Human-readable label for this stage, carried through to its result.
    pub description: Option<String>,
}

impl Stage {
    /// Creates a plain semantic stage with no reranking or source filter.
    #[must_use]
    pub fn semantic(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            hybrid: false,
            k,
            rerank: false,
            keyword_weight: 0.0,
            source_type: None,
            description: None,
        }
    }

    /// Creates a hybrid stage with the given keyword weight.
    #[must_use]
    pub fn hybrid(query: impl Into<String>, k: usize, keyword_weight: f32) -> Self {
        Self {
            query: query.into(),
            hybrid: true,
            k,
            rerank: false,
            keyword_weight,
            source_type: None,
            description: None,
        }
    }

    /// Attaches a human-readable description to this stage.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of running one [`Stage`].
#[derive(Debug, Clone)]
pub struct StageResult {
    /// The stage's description, carried through unchanged.
    pub description: Option<String>,
    /// Hits produced by this stage alone.
    pub hits: Vec<Hit>,
}

/// Result of [`run_chain`].
#[derive(Debug, Clone)]
pub struct ChainResult {
    /// Per-stage results, in execution order.
    pub stages: Vec<StageResult>,
    /// All hits across all stages, deduped by `(source_id, chunk_index)`
    /// keeping the max score, sorted descending.
    pub combined_results: Vec<Hit>,
    /// The chain's topic label, as supplied by the caller.
    pub topic: String,
    /// Unix timestamp of chain completion.
    pub timestamp: i64,
}

/// Runs `stages` serially against `store`, collecting every stage's hits
/// and deduping across the whole chain by `(source_id, chunk_index)`,
/// keeping the higher score on a collision.
///
/// # Errors
///
/// Propagates the first stage failure; stages after the failing one do not
/// run.
#[tracing::instrument(skip(store, embedder, stages), fields(stage_count = stages.len()))]
pub fn run_chain(store: &dyn VectorStore, embedder: &dyn Embedder, topic: &str, stages: &[Stage]) -> Result<ChainResult> {
    let mut stage_results = Vec::with_capacity(stages.len());
    let mut best: HashMap<(String, usize), Hit> = HashMap::new();

    for stage in stages {
        let options = QueryOptions {
            k: stage.k,
            source_type: stage.source_type,
            rerank: stage.rerank,
            keyword_weight: stage.keyword_weight,
        };
        let hits = if stage.hybrid {
            search::hybrid(store, embedder, &stage.query, &options)?
        } else {
            search::semantic(store, embedder, &stage.query, &options)?
        };

        for hit in &hits {
            let key = (hit.fragment.source_id.clone(), hit.fragment.chunk_index);
            best.entry(key)
                .and_modify(|existing| {
                    if hit.score > existing.score {
                        *existing = hit.clone();
                    }
                })
                .or_insert_with(|| hit.clone());
        }
        stage_results.push(StageResult { description: stage.description.clone(), hits });
    }

    let mut combined_results: Vec<Hit> = best.into_values().collect();
    crate::storage::traits::sort_hits(&mut combined_results);

    Ok(ChainResult { stages: stage_results, combined_results, topic: topic.to_string(), timestamp: current_timestamp() })
}

/// The built-in three-stage chain used by agent-mode queries:
/// a direct semantic pass, a hybrid pass widened toward architectural
/// vocabulary, and a hybrid pass widened toward related/alternative phrasing.
#[must_use]
pub fn agent_mode_chain(query: &str) -> Vec<Stage> {
    vec![
        Stage::semantic(query, 5).describe("direct match"),
        Stage::hybrid(format!("{query} implementation architecture design pattern structure"), 5, AGENT_CHAIN_KEYWORD_WEIGHT)
            .describe("architectural context"),
        Stage::hybrid(format!("related to \"{query}\" OR similar OR alternative approaches"), 3, AGENT_CHAIN_KEYWORD_WEIGHT)
            .describe("related approaches"),
    ]
}

/// Response detail level for [`agent_query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Metrics and a primary-action suggestion only; no hit list.
    Summary,
    /// [`Mode::Summary`] plus up to 5 hits with per-hit metadata.
    Detailed,
    /// Everything, with the full (unpaged within this call) hit list.
    Full,
}

/// Coarse quality bucket derived from average hit score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    /// Average score ≥ 0.7.
    High,
    /// 0.5 ≤ average score < 0.7.
    Medium,
    /// Average score < 0.5.
    Low,
}

/// How much of the goal's vocabulary the results actually cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageStatus {
    /// All of the goal's keywords appear somewhere in the hit contents.
    Complete,
    /// Some, but not all, of the goal's keywords appear.
    Partial,
    /// None of the goal's keywords appear.
    None,
}

/// Options for one [`agent_query`] call.
pub struct AgentQueryOptions {
    /// The caller's underlying objective, used to derive coverage and topics.
    pub goal: String,
    /// The search query to run.
    pub query: String,
    /// Response detail level.
    pub mode: Mode,
    /// Hits per page, clamped to [`MAX_PAGE_SIZE`].
    pub page_size: usize,
    /// Opaque pagination cursor from a prior response's `next_cursor`.
    pub cursor: Option<String>,
}

/// Response from [`agent_query`].
pub struct AgentQueryResponse {
    /// Total hits found by the underlying chain, before pagination.
    pub total_results: usize,
    /// Mean score across all hits.
    pub avg_score: f32,
    /// Quality bucket derived from `avg_score`.
    pub quality_level: QualityLevel,
    /// Up to 3 most frequent non-stop-word tokens across hit contents.
    pub main_topics: Vec<String>,
    /// How much of the goal's vocabulary the results cover.
    pub coverage_status: CoverageStatus,
    /// Suggested next action, driven by `quality_level`.
    pub primary_action: &'static str,
    /// Rough token-cost estimate for this response's payload.
    pub estimated_tokens: usize,
    /// Hits included in this page; empty for [`Mode::Summary`].
    pub hits: Vec<Hit>,
    /// Cursor for the next page, absent once the hit list is exhausted.
    pub next_cursor: Option<String>,
    /// Actionable follow-up suggestions; populated only for [`Mode::Detailed`].
    pub hints: Vec<String>,
}

fn encode_cursor(offset: usize) -> String {
    format!("c{offset:x}")
}

fn decode_cursor(cursor: &str) -> Result<usize> {
    let hex = cursor
        .strip_prefix('c')
        .ok_or_else(|| Error::InvalidCursor { reason: "cursor missing expected prefix".to_string() })?;
    usize::from_str_radix(hex, 16).map_err(|e| Error::InvalidCursor { reason: e.to_string() })
}

fn quality_for(avg_score: f32) -> (QualityLevel, &'static str) {
    if avg_score >= 0.7 {
        (QualityLevel::High, "refine")
    } else if avg_score >= 0.5 {
        (QualityLevel::Medium, "expand")
    } else {
        (QualityLevel::Low, "broaden query terms")
    }
}

fn main_topics(hits: &[Hit]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for hit in hits {
        for token in search::tokenize(&hit.fragment.content) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(3).map(|(token, _)| token).collect()
}

/// Builds actionable follow-up suggestions from a response's quality and
/// coverage, for surfacing alongside [`Mode::Detailed`] results.
fn strategic_hints(quality_level: QualityLevel, coverage_status: CoverageStatus, topics: &[String]) -> Vec<String> {
    let mut hints = Vec::new();
    hints.push(match quality_level {
        QualityLevel::High => "Results are strong; narrow the query or a source type for more precision.".to_string(),
        QualityLevel::Medium => "Results are moderate; try widening the query with related terms.".to_string(),
        QualityLevel::Low => "Results are weak; broaden query terms or lower the keyword weight.".to_string(),
    });
    hints.push(match coverage_status {
        CoverageStatus::Complete => "The goal's vocabulary is fully covered by the current hits.".to_string(),
        CoverageStatus::Partial => "Some goal terms are missing from the hits; consider a follow-up query targeting them.".to_string(),
        CoverageStatus::None => "None of the goal's terms appear in the hits; the goal and query may be mismatched.".to_string(),
    });
    if !topics.is_empty() {
        hints.push(format!("Consider following up on: {}.", topics.join(", ")));
    }
    hints
}

fn coverage_for(goal: &str, hits: &[Hit]) -> CoverageStatus {
    let goal_tokens: Vec<String> = search::tokenize(goal);
    if goal_tokens.is_empty() {
        return CoverageStatus::None;
    }
    let corpus = hits.iter().map(|h| h.fragment.content.to_lowercase()).collect::<Vec<_>>().join(" ");
    let covered = goal_tokens.iter().filter(|t| corpus.contains(t.as_str())).count();
    if covered == 0 {
        CoverageStatus::None
    } else if covered == goal_tokens.len() {
        CoverageStatus::Complete
    } else {
        CoverageStatus::Partial
    }
}

#[allow(clippy::cast_precision_loss)]
fn estimate_tokens(hits: &[Hit]) -> usize {
    let chars: usize = hits.iter().map(|h| h.fragment.content.len()).sum();
    chars / 4 + hits.len() * 20
}

/// Runs the built-in agent-mode chain for `options.query`, summarizes it
/// against `options.goal` using the quality/coverage heuristics below, and
/// returns a page of at most `MAX_PAGE_SIZE` hits per `options.mode`.
///
/// # Errors
///
/// Returns [`Error::InvalidCursor`] if `options.cursor` doesn't parse, or
/// propagates search errors from the underlying chain.
#[tracing::instrument(skip(store, embedder, options))]
pub fn agent_query(store: &dyn VectorStore, embedder: &dyn Embedder, options: &AgentQueryOptions) -> Result<AgentQueryResponse> {
    let offset = match &options.cursor {
        Some(cursor) => decode_cursor(cursor)?,
        None => 0,
    };

    let chain = agent_mode_chain(&options.query);
    let result = run_chain(store, embedder, &options.query, &chain)?;
    let all_hits = result.combined_results;

    let total_results = all_hits.len();
    #[allow(clippy::cast_precision_loss)]
    let avg_score = if all_hits.is_empty() { 0.0 } else { all_hits.iter().map(|h| h.score).sum::<f32>() / all_hits.len() as f32 };
    let (quality_level, primary_action) = quality_for(avg_score);
    let coverage_status = coverage_for(&options.goal, &all_hits);
    let topics = main_topics(&all_hits);

    let page_size = options.page_size.clamp(1, MAX_PAGE_SIZE);
    let page: Vec<Hit> = all_hits.iter().skip(offset).take(page_size).cloned().collect();
    let next_cursor = if offset + page.len() < all_hits.len() { Some(encode_cursor(offset + page.len())) } else { None };

    let hits = match options.mode {
        Mode::Summary => Vec::new(),
        Mode::Detailed => page.into_iter().take(5).collect(),
        Mode::Full => page,
    };
    let estimated_tokens = estimate_tokens(&hits).max(match options.mode {
        Mode::Summary => 200,
        Mode::Detailed => 800,
        Mode::Full => 200,
    });
    let hints = if options.mode == Mode::Detailed { strategic_hints(quality_level, coverage_status, &topics) } else { Vec::new() };

    Ok(AgentQueryResponse {
        total_results,
        avg_score,
        quality_level,
        main_topics: topics,
        coverage_status,
        primary_action,
        estimated_tokens,
        hits,
        next_cursor,
        hints,
    })
}

/// One entry in the bounded recent-query cache.
#[derive(Debug, Clone)]
pub struct CachedQuery {
    /// The query text that was run.
    pub query: String,
    /// Which search strategy served it: `"semantic"`, `"keyword"`, or `"hybrid"`.
    pub strategy: String,
    /// A short summary of the top hits.
    pub summary: String,
    /// Unix timestamp the query completed.
    pub timestamp: i64,
}

/// Bounded cache of recently-run successful queries: holds the most recent
/// [`QUERY_CACHE_CAPACITY`], oldest evicted first.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: VecDeque<CachedQuery>,
}

impl QueryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Records a successful query, evicting the oldest entry if the cache
    /// is at capacity.
    #[tracing::instrument(skip(self, entry), fields(strategy = %entry.strategy))]
    pub fn record(&mut self, entry: CachedQuery) {
        let evicted = self.entries.len() >= QUERY_CACHE_CAPACITY;
        if evicted {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        tracing::debug!(cache_size = self.entries.len(), evicted, "query cache updated");
    }

    /// Returns cached entries, most recent last.
    #[must_use]
    pub fn entries(&self) -> &VecDeque<CachedQuery> {
        &self.entries
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[allow(clippy::cast_possible_wrap)]
fn current_timestamp() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
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
        for (i, text) in ["rust ownership and borrowing", "async runtime design", "rust trait objects"].iter().enumerate() {
            let embedding = embedder.embed(text).unwrap();
            store.insert(Fragment::new("s".to_string(), i, (*text).to_string()), embedding).unwrap();
        }
        store
    }

    #[test]
    fn test_run_chain_dedupes_across_stages() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let stages = vec![Stage::semantic("rust", 5), Stage::semantic("rust", 5)];
        let result = run_chain(store.as_ref(), &embedder, "rust", &stages).unwrap();
        let mut seen = std::collections::HashSet::new();
        for hit in &result.combined_results {
            assert!(seen.insert((hit.fragment.source_id.clone(), hit.fragment.chunk_index)));
        }
    }

    #[test]
    fn test_agent_mode_chain_has_three_stages() {
        assert_eq!(agent_mode_chain("rust").len(), 3);
    }

    #[test]
    fn test_agent_query_summary_mode_has_no_hits() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let options = AgentQueryOptions {
            goal: "learn rust ownership".to_string(),
            query: "rust ownership".to_string(),
            mode: Mode::Summary,
            page_size: 10,
            cursor: None,
        };
        let response = agent_query(store.as_ref(), &embedder, &options).unwrap();
        assert!(response.hits.is_empty());
        assert!(response.total_results > 0);
    }

    #[test]
    fn test_agent_query_detailed_mode_caps_at_five() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let options = AgentQueryOptions {
            goal: "rust".to_string(),
            query: "rust".to_string(),
            mode: Mode::Detailed,
            page_size: 10,
            cursor: None,
        };
        let response = agent_query(store.as_ref(), &embedder, &options).unwrap();
        assert!(response.hits.len() <= 5);
    }

    #[test]
    fn test_agent_query_detailed_mode_includes_hints() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let options = AgentQueryOptions {
            goal: "rust ownership".to_string(),
            query: "rust".to_string(),
            mode: Mode::Detailed,
            page_size: 10,
            cursor: None,
        };
        let response = agent_query(store.as_ref(), &embedder, &options).unwrap();
        assert!(!response.hints.is_empty());
    }

    #[test]
    fn test_agent_query_summary_mode_has_no_hints() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let options = AgentQueryOptions {
            goal: "rust".to_string(),
            query: "rust".to_string(),
            mode: Mode::Summary,
            page_size: 10,
            cursor: None,
        };
        let response = agent_query(store.as_ref(), &embedder, &options).unwrap();
        assert!(response.hints.is_empty());
    }

    #[test]
    fn test_agent_query_invalid_cursor_is_recoverable() {
        let store = populated_store();
        let embedder = FallbackEmbedder::new(8);
        let options = AgentQueryOptions {
            goal: "rust".to_string(),
            query: "rust".to_string(),
            mode: Mode::Summary,
            page_size: 10,
            cursor: Some("not-a-cursor".to_string()),
        };
        let err = agent_query(store.as_ref(), &embedder, &options).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { .. }));
    }

    #[test]
    fn test_quality_level_thresholds() {
        assert!(matches!(quality_for(0.9), (QualityLevel::High, "refine")));
        assert!(matches!(quality_for(0.6), (QualityLevel::Medium, "expand")));
        assert!(matches!(quality_for(0.1), (QualityLevel::Low, _)));
    }

    #[test]
    fn test_query_cache_evicts_oldest_at_capacity() {
        let mut cache = QueryCache::new();
        for i in 0..QUERY_CACHE_CAPACITY + 1 {
            cache.record(CachedQuery { query: format!("q{i}"), strategy: "semantic".to_string(), summary: String::new(), timestamp: 0 });
        }
        assert_eq!(cache.len(), QUERY_CACHE_CAPACITY);
        assert_eq!(cache.entries().front().unwrap().query, "q1");
    }
}
