//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros: index, search,
//! get/reconstruct, chain, agent-query, and database lifecycle commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fragmint: local semantic search over boundary-aware chunked sources.
#[derive(Parser, Debug)]
#[command(name = "fragmint")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a TOML config file. Defaults to `fragmint.toml` in the
    /// current directory if present, compiled-in defaults otherwise.
    #[arg(short = 'C', long, env = "FRAGMINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the storage path from the config.
    #[arg(long, env = "FRAGMINT_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose logging (equivalent to `RUST_LOG=debug`).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: text, json, or ndjson.
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the storage backend.
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Show store status: backend, dimensions, fragment count.
    Status,

    /// Reset all indexed data.
    Reset {
        /// Skip confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Index one specifier: materialize, chunk, embed, and persist.
    Index {
        /// Path to a local file to index. Mutually exclusive with `--text`.
        file: Option<PathBuf>,

        /// Raw text to index directly, instead of a file.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Chunking strategy (`boundary-aware` or `fixed`).
        #[arg(long, default_value = "boundary-aware")]
        chunker: String,

        /// Target fragment size in bytes.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap between size-only fragments, in bytes.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Search indexed fragments.
    Search {
        /// Query text.
        query: String,

        /// Search mode: semantic, keyword, or hybrid.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of hits to return.
        #[arg(short = 'k', long, default_value = "10")]
        k: usize,

        /// Weight given to the keyword side of hybrid search, in `[0, 1]`.
        #[arg(long, default_value = "0.5")]
        keyword_weight: f32,

        /// Apply the lexical reranker to the result list.
        #[arg(long)]
        rerank: bool,

        /// Restrict results to a source type (text, file, gist, github, url).
        #[arg(long)]
        source_type: Option<String>,
    },

    /// Reconstruct a fragment's owning source or containing section.
    Get {
        /// Fragment id.
        fragment_id: String,

        /// Reconstruct the containing structural section instead of the
        /// whole source.
        #[arg(long, conflicts_with = "full")]
        section: bool,

        /// Reconstruct the whole original source (default).
        #[arg(long)]
        full: bool,
    },

    /// Run a query chain from a JSON stage-list file.
    Chain {
        /// Path to a JSON file describing `[{query, hybrid?, k, rerank?,
        /// sourceType?, description?}, ...]`.
        stages_file: PathBuf,

        /// Label for this chain's results.
        #[arg(long, default_value = "chain")]
        topic: String,
    },

    /// Run the built-in agent-mode query chain and summarize the results.
    AgentQuery {
        /// The caller's underlying objective.
        goal: String,

        /// The search query to run.
        query: String,

        /// Response detail level: summary, detailed, or full.
        #[arg(long, default_value = "summary")]
        mode: String,

        /// Hits per page (clamped to 10).
        #[arg(long, default_value = "10")]
        page_size: usize,

        /// Pagination cursor from a prior response's `next_cursor`.
        #[arg(long)]
        cursor: Option<String>,
    },
}

impl Cli {
    /// Loads the effective [`crate::config::Config`] for this invocation,
    /// layering `--db-path` on top of the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but fails to parse.
    pub fn load_config(&self) -> crate::error::Result<crate::config::Config> {
        let mut config = crate::config::Config::load(self.config.as_deref())?;
        if let Some(db_path) = &self.db_path {
            config.storage.path = db_path.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_search_subcommand() {
        let cli = Cli::parse_from(["fragmint", "search", "hello world", "--mode", "semantic"]);
        match cli.command {
            Commands::Search { query, mode, .. } => {
                assert_eq!(query, "hello world");
                assert_eq!(mode, "semantic");
            }
            _ => panic!("expected Search command"),
        }
    }

    #[test]
    fn test_parses_index_with_text() {
        let cli = Cli::parse_from(["fragmint", "index", "--text", "hello"]);
        match cli.command {
            Commands::Index { file, text, .. } => {
                assert!(file.is_none());
                assert_eq!(text.as_deref(), Some("hello"));
            }
            _ => panic!("expected Index command"),
        }
    }
}
