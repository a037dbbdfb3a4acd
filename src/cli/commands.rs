//! Command dispatch: translates a parsed [`Cli`] into a call against the
//! core retrieval operations, returning the string to print.

use crate::core::SourceType;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{self, IndexOptions, Item};
use crate::orchestrate::{self, AgentQueryOptions, Mode, Stage};
use crate::reconstruct;
use crate::search::{self, QueryOptions};
use crate::storage::{self, Hit, VectorStore};

use super::output::{self, OutputFormat};
use super::parser::{Cli, Commands};

/// Runs `cli`'s subcommand and returns the text to print to stdout.
///
/// # Errors
///
/// Returns whatever error the underlying operation produced; the caller
/// maps it to an exit code via [`output::exit_code_for`].
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let config = cli.load_config()?;

    match &cli.command {
        Commands::Init { force } => run_init(&config, *force, format),
        Commands::Status => run_status(&config, format),
        Commands::Reset { yes } => run_reset(&config, *yes, format),
        Commands::Index { file, text, chunker, chunk_size, chunk_overlap } => {
            run_index(&config, file.as_deref(), text.as_deref(), chunker, *chunk_size, *chunk_overlap, format)
        }
        Commands::Search { query, mode, k, keyword_weight, rerank, source_type } => {
            run_search(&config, query, mode, *k, *keyword_weight, *rerank, source_type.as_deref(), format)
        }
        Commands::Get { fragment_id, section, full } => run_get(&config, fragment_id, *section && !*full, format),
        Commands::Chain { stages_file, topic } => run_chain(&config, stages_file, topic, format),
        Commands::AgentQuery { goal, query, mode, page_size, cursor } => {
            run_agent_query(&config, goal, query, mode, *page_size, cursor.as_deref(), format)
        }
    }
}

fn open_store(config: &Config) -> Result<Box<dyn VectorStore>> {
    let mut store = storage::open(config.backend_config())?;
    store.initialize()?;
    Ok(store)
}

fn remove_backing_file(config: &Config) {
    let _ = std::fs::remove_file(&config.storage.path);
}

fn run_init(config: &Config, force: bool, format: OutputFormat) -> Result<String> {
    if force {
        remove_backing_file(config);
    }
    let store = open_store(config)?;
    let info = store.get_info()?;
    Ok(output::format_status(&info, format))
}

fn run_status(config: &Config, format: OutputFormat) -> Result<String> {
    let store = open_store(config)?;
    let info = store.get_info()?;
    Ok(output::format_status(&info, format))
}

fn run_reset(config: &Config, yes: bool, format: OutputFormat) -> Result<String> {
    if !yes {
        return Err(Error::InvalidArgument { reason: "reset requires --yes to confirm destroying all indexed data".to_string() });
    }
    remove_backing_file(config);
    let store = open_store(config)?;
    let info = store.get_info()?;
    Ok(output::format_status(&info, format))
}

fn run_index(
    config: &Config,
    file: Option<&std::path::Path>,
    text: Option<&str>,
    chunker: &str,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let item = match (file, text) {
        (Some(path), _) => Item::File(path.display().to_string()),
        (None, Some(text)) => Item::Text(text.to_string()),
        (None, None) => return Err(Error::InvalidArgument { reason: "index requires a file path or --text".to_string() }),
    };

    let mut store = open_store(config)?;
    let embedder = crate::embedding::create_embedder()?;
    let options = IndexOptions {
        chunker: chunker.to_string(),
        chunk_size: chunk_size.unwrap_or(config.chunking.size),
        chunk_overlap: chunk_overlap.unwrap_or(config.chunking.overlap),
        batch_size: index::DEFAULT_BATCH_SIZE,
    };
    let report = index::index(store.as_mut(), embedder.as_ref(), item, &options)?;
    Ok(output::format_index_report(&report, format))
}

fn parse_source_type(name: &str) -> Result<SourceType> {
    match name.to_lowercase().as_str() {
        "text" => Ok(SourceType::Text),
        "file" => Ok(SourceType::File),
        "gist" => Ok(SourceType::Gist),
        "github" => Ok(SourceType::Github),
        "url" => Ok(SourceType::Url),
        other => Err(Error::InvalidArgument { reason: format!("unknown source type: {other}") }),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    config: &Config,
    query: &str,
    mode: &str,
    k: usize,
    keyword_weight: f32,
    rerank: bool,
    source_type: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let store = open_store(config)?;
    let embedder = crate::embedding::create_embedder()?;
    let options = QueryOptions { k, source_type: source_type.map(parse_source_type).transpose()?, rerank, keyword_weight };

    let hits: Vec<Hit> = match mode.to_lowercase().as_str() {
        "semantic" => search::semantic(store.as_ref(), embedder.as_ref(), query, &options)?,
        "keyword" => search::keyword(store.as_ref(), query, &options)?,
        "hybrid" => search::hybrid(store.as_ref(), embedder.as_ref(), query, &options)?,
        other => return Err(Error::InvalidArgument { reason: format!("unknown search mode: {other}") }),
    };
    Ok(output::format_hits(&hits, format))
}

fn run_get(config: &Config, fragment_id: &str, section: bool, format: OutputFormat) -> Result<String> {
    let store = open_store(config)?;
    let fragment = store.get(fragment_id)?;
    let hit = Hit { fragment, score: 1.0 };

    let content = if section {
        reconstruct::get_section_content(store.as_ref(), &hit)
    } else {
        reconstruct::get_original_content(store.as_ref(), &hit)?
    };
    Ok(output::format_reconstructed(&content, format))
}

/// One stage in a chain file, matching `{query, hybrid?, k, rerank?,
/// keywordWeight?, sourceType?, description?}`.
#[derive(serde::Deserialize)]
struct StageSpec {
    query: String,
    #[serde(default)]
    hybrid: bool,
    k: usize,
    #[serde(default)]
    rerank: bool,
    #[serde(default, rename = "keywordWeight")]
    keyword_weight: Option<f32>,
    #[serde(default, rename = "sourceType")]
    source_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn run_chain(config: &Config, stages_file: &std::path::Path, topic: &str, format: OutputFormat) -> Result<String> {
    let text = crate::io::read_file(stages_file)?;
    let specs: Vec<StageSpec> = serde_json::from_str(&text).map_err(|e| Error::InvalidArgument { reason: format!("invalid chain file: {e}") })?;

    let stages = specs
        .into_iter()
        .map(|spec| {
            let source_type = spec.source_type.as_deref().map(parse_source_type).transpose()?;
            Ok(Stage {
                query: spec.query,
                hybrid: spec.hybrid,
                k: spec.k,
                rerank: spec.rerank,
                keyword_weight: spec.keyword_weight.unwrap_or(config.search.keyword_weight),
                source_type,
                description: spec.description,
            })
        })
        .collect::<Result<Vec<Stage>>>()?;

    let store = open_store(config)?;
    let embedder = crate::embedding::create_embedder()?;
    let result = orchestrate::run_chain(store.as_ref(), embedder.as_ref(), topic, &stages)?;
    Ok(output::format_chain_result(&result, format))
}

fn parse_mode(name: &str) -> Result<Mode> {
    match name.to_lowercase().as_str() {
        "summary" => Ok(Mode::Summary),
        "detailed" => Ok(Mode::Detailed),
        "full" => Ok(Mode::Full),
        other => Err(Error::InvalidArgument { reason: format!("unknown agent-query mode: {other}") }),
    }
}

fn run_agent_query(config: &Config, goal: &str, query: &str, mode: &str, page_size: usize, cursor: Option<&str>, format: OutputFormat) -> Result<String> {
    let store = open_store(config)?;
    let embedder = crate::embedding::create_embedder()?;
    let options = AgentQueryOptions {
        goal: goal.to_string(),
        query: query.to_string(),
        mode: parse_mode(mode)?,
        page_size,
        cursor: cursor.map(str::to_string),
    };
    let response = orchestrate::agent_query(store.as_ref(), embedder.as_ref(), &options)?;
    Ok(output::format_agent_query(&response, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parser::Cli;
    use clap::Parser;

    fn cli_with(args: &[&str]) -> Cli {
        let mut full = vec!["fragmint"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_execute_status_on_fresh_backend() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "--format", "json", "status"]);
        let output = execute(&cli).unwrap();
        assert!(output.contains("\"count\""));
    }

    #[test]
    fn test_execute_reset_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "reset"]);
        let err = execute(&cli).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_execute_index_and_search_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let index_cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "index", "--text", "rust ownership and borrowing rules"]);
        let report = execute(&index_cli).unwrap();
        assert!(report.contains("Indexed"));

        let search_cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "search", "ownership", "--mode", "keyword"]);
        let results = execute(&search_cli).unwrap();
        assert!(results.contains("results") || results.contains("No results"));
    }

    #[test]
    fn test_execute_get_reconstructs_indexed_text() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let index_cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "index", "--text", "hello reconstruction world"]);
        execute(&index_cli).unwrap();

        let search_cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "--format", "json", "search", "reconstruction", "--mode", "keyword"]);
        let json = execute(&search_cli).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let fragment_id = parsed[0]["fragment"]["id"].as_str().unwrap().to_string();

        let get_cli = cli_with(&["--db-path", db_path.to_str().unwrap(), "get", &fragment_id]);
        let reconstructed = execute(&get_cli).unwrap();
        assert!(reconstructed.contains("hello reconstruction world"));
    }

    #[test]
    fn test_parse_source_type_rejects_unknown() {
        assert!(parse_source_type("bogus").is_err());
        assert!(parse_source_type("github").is_ok());
    }
}
