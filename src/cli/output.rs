//! Output formatting for CLI commands.
//!
//! Supports text, JSON, and NDJSON output, following the same per-format
//! dispatch shape for every command result.

use std::fmt::Write;

use serde::Serialize;

use crate::index::IndexReport;
use crate::orchestrate::{AgentQueryResponse, ChainResult, CoverageStatus, QualityLevel};
use crate::storage::{Hit, StoreInfo};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
    /// Newline-delimited JSON for streaming.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format from its CLI string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" | "stream" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Returns `true` if this format streams one record per line.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Ndjson)
    }
}

/// Formats a store status response.
#[must_use]
pub fn format_status(info: &StoreInfo, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str("fragmint status\n");
            output.push_str("===============\n\n");
            let _ = writeln!(output, "  Backend:      {}", info.backend);
            let _ = writeln!(output, "  Dimensions:   {}", info.dimensions);
            let _ = writeln!(output, "  Fragments:    {}", info.count);
            let _ = writeln!(output, "  Similarity:   {}", info.similarity_convention);
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(info),
    }
}

/// Formats a list of search hits.
#[must_use]
pub fn format_hits(hits: &[Hit], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_hits_text(hits),
        OutputFormat::Json => format_json(hits),
        OutputFormat::Ndjson => hits.iter().map(format_json).collect::<Vec<_>>().join("\n"),
    }
}

fn format_hits_text(hits: &[Hit]) -> String {
    if hits.is_empty() {
        return "No results.\n".to_string();
    }
    let mut output = String::new();
    let _ = writeln!(output, "{} results:\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(output, "[{i}] score={:.4} source={} chunk={}", hit.score, hit.fragment.source_id, hit.fragment.chunk_index);
        let _ = writeln!(output, "    {}", truncate(&hit.fragment.preview(200).replace('\n', " "), 200));
    }
    output
}

/// Formats an [`IndexReport`].
#[must_use]
pub fn format_index_report(report: &IndexReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Indexed {} item(s), {} fragment(s)", report.items_indexed, report.chunks_created);
            let _ = writeln!(output, "  source: {}", report.source_id);
            if !report.errors.is_empty() {
                let _ = writeln!(output, "  {} error(s):", report.errors.len());
                for error in &report.errors {
                    let _ = writeln!(output, "    {error}");
                }
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(report),
    }
}

/// Formats reconstructed content (full source or section).
#[must_use]
pub fn format_reconstructed(content: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str("---\n");
            output.push_str(content);
            if !content.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("---\n");
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            #[derive(Serialize)]
            struct Reconstructed<'a> {
                content: &'a str,
            }
            format_json(&Reconstructed { content })
        }
    }
}

/// Formats a [`ChainResult`].
#[must_use]
pub fn format_chain_result(result: &ChainResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Chain '{}' ({} stage(s)):\n", result.topic, result.stages.len());
            for (i, stage) in result.stages.iter().enumerate() {
                let label = stage.description.as_deref().unwrap_or("stage");
                let _ = writeln!(output, "  stage {i} ({label}): {} hit(s)", stage.hits.len());
            }
            let _ = writeln!(output, "\nCombined: {} result(s)", result.combined_results.len());
            output.push_str(&format_hits_text(&result.combined_results));
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(&ChainResultJson::from(result)),
    }
}

#[derive(Serialize)]
struct ChainResultJson<'a> {
    topic: &'a str,
    timestamp: i64,
    stage_hit_counts: Vec<usize>,
    combined_results: &'a [Hit],
}

impl<'a> From<&'a ChainResult> for ChainResultJson<'a> {
    fn from(result: &'a ChainResult) -> Self {
        Self {
            topic: &result.topic,
            timestamp: result.timestamp,
            stage_hit_counts: result.stages.iter().map(|s| s.hits.len()).collect(),
            combined_results: &result.combined_results,
        }
    }
}

/// Formats an [`AgentQueryResponse`].
#[must_use]
pub fn format_agent_query(response: &AgentQueryResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Total results: {}", response.total_results);
            let _ = writeln!(output, "Average score: {:.3}", response.avg_score);
            let _ = writeln!(output, "Quality:       {}", quality_label(response.quality_level));
            let _ = writeln!(output, "Coverage:      {}", coverage_label(response.coverage_status));
            let _ = writeln!(output, "Main topics:   {}", response.main_topics.join(", "));
            let _ = writeln!(output, "Next action:   {}", response.primary_action);
            let _ = writeln!(output, "Est. tokens:   {}", response.estimated_tokens);
            if !response.hints.is_empty() {
                output.push_str("\nHints:\n");
                for hint in &response.hints {
                    let _ = writeln!(output, "  - {hint}");
                }
            }
            if !response.hits.is_empty() {
                output.push('\n');
                output.push_str(&format_hits_text(&response.hits));
            }
            if let Some(cursor) = &response.next_cursor {
                let _ = writeln!(output, "\nNext cursor: {cursor}");
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "total_results": response.total_results,
                "avg_score": response.avg_score,
                "quality_level": quality_label(response.quality_level),
                "coverage_status": coverage_label(response.coverage_status),
                "main_topics": response.main_topics,
                "primary_action": response.primary_action,
                "estimated_tokens": response.estimated_tokens,
                "hits": response.hits,
                "next_cursor": response.next_cursor,
                "hints": response.hints,
            });
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

const fn quality_label(level: QualityLevel) -> &'static str {
    match level {
        QualityLevel::High => "high",
        QualityLevel::Medium => "medium",
        QualityLevel::Low => "low",
    }
}

const fn coverage_label(status: CoverageStatus) -> &'static str {
    match status {
        CoverageStatus::Complete => "complete",
        CoverageStatus::Partial => "partial",
        CoverageStatus::None => "none",
    }
}

/// Formats a value as pretty JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats an error for output. Text mode returns the display string;
/// JSON/NDJSON return a structured error object with a stable `type`.
#[must_use]
pub fn format_error(error: &crate::Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let error_type = error_type_name(error);
            let json = serde_json::json!({
                "success": false,
                "error": {
                    "type": error_type,
                    "message": error.to_string(),
                }
            });
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

const fn error_type_name(error: &crate::Error) -> &'static str {
    use crate::Error;
    match error {
        Error::InvalidArgument { .. } => "InvalidArgument",
        Error::DocumentNotFound { .. } => "DocumentNotFound",
        Error::DimensionMismatch { .. } => "DimensionMismatch",
        Error::NotInitialized => "NotInitialized",
        Error::BackendUnavailable { .. } => "BackendUnavailable",
        Error::Cancelled => "Cancelled",
        Error::InvalidCursor { .. } => "InvalidCursor",
        Error::Embedding(_) => "EmbeddingError",
        Error::Io(_) => "IoError",
        Error::Storage(_) => "StorageError",
        Error::Chunking(_) => "ChunkingError",
        Error::Internal { .. } => "InternalError",
    }
}

/// Maps an [`crate::Error`] to the exit code a CLI caller expects.
#[must_use]
pub const fn exit_code_for(error: &crate::Error) -> u8 {
    use crate::Error;
    match error {
        Error::InvalidArgument { .. }
        | Error::DocumentNotFound { .. }
        | Error::DimensionMismatch { .. }
        | Error::InvalidCursor { .. }
        | Error::Io(_) => 1,
        Error::NotInitialized => 2,
        Error::BackendUnavailable { .. } | Error::Storage(_) => 3,
        Error::Cancelled | Error::Embedding(_) | Error::Chunking(_) | Error::Internal { .. } => 1,
    }
}

/// Truncates a string to at most `max_len` bytes, appending an ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s[..max_len].to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fragment;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("ndjson"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("unknown"), OutputFormat::Text);
    }

    #[test]
    fn test_format_hits_empty() {
        let text = format_hits(&[], OutputFormat::Text);
        assert!(text.contains("No results"));
        let json = format_hits(&[], OutputFormat::Json);
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_format_hits_with_data() {
        let hits = vec![Hit { fragment: Fragment::new("s1".to_string(), 0, "hello world".to_string()), score: 0.9 }];
        let text = format_hits(&hits, OutputFormat::Text);
        assert!(text.contains("score=0.9000"));
        assert!(text.contains("hello world"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code_for(&crate::Error::NotInitialized), 2);
        assert_eq!(exit_code_for(&crate::Error::BackendUnavailable { reason: "x".to_string() }), 3);
        assert_eq!(exit_code_for(&crate::Error::InvalidArgument { reason: "x".to_string() }), 1);
    }

    #[test]
    fn test_format_error_json_has_type() {
        let error = crate::Error::NotInitialized;
        let json = format_error(&error, OutputFormat::Json);
        assert!(json.contains("\"NotInitialized\""));
    }
}
