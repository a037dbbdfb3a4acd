//! Indexer pipeline: materialize → identify → chunk → embed → persist.

use crate::chunking::{ChunkConfig, Chunker};
use crate::core::{Source, SourceType};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::io::read_file;
use crate::storage::VectorStore;

/// Number of fragments embedded per batch, and the unit the progress
/// callback reports against, unless the caller overrides it.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// What to index: raw text, a local file, or a fetched URL. Gist and
/// GitHub specifiers resolve to a file fetch upstream of this pipeline and
/// arrive here as [`Item::Url`] plus an explicit [`SourceType`] override,
/// since the wire fetch itself is a `http-sources`-gated concern this
/// module does not own.
pub enum Item {
    /// Raw text content supplied directly.
    Text(String),
    /// A local file path to read and index.
    File(String),
    /// Already-fetched content plus its origin URL.
    Url { url: String, content: String },
}

/// Options controlling one [`index`] call.
pub struct IndexOptions {
    /// Chunking strategy name, passed to [`crate::chunking::create_chunker`].
    pub chunker: String,
    /// Target fragment size in bytes.
    pub chunk_size: usize,
    /// Overlap between consecutive size-only fragments, in bytes.
    pub chunk_overlap: usize,
    /// Fragments embedded per batch.
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunker: "boundary-aware".to_string(),
            chunk_size: crate::chunking::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::chunking::DEFAULT_OVERLAP,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Result of one [`index`] call.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Number of source items materialized.
    pub items_indexed: usize,
    /// Total number of fragments created and persisted.
    pub chunks_created: usize,
    /// Id of the indexed source. Only meaningful for single-item calls.
    pub source_id: String,
    /// Per-item failures; a failure here does not abort the remaining batch.
    pub errors: Vec<String>,
}

/// Indexes one [`Item`] into `store`: materializes its text, derives a
/// stable source identity, chunks it with `options.chunker`, embeds every
/// fragment through `embedder` in batches of `options.batch_size`, and
/// persists the batch.
///
/// # Errors
///
/// Returns an error if materializing the item, chunking, embedding, or
/// persisting fails; partial progress already persisted is not rolled
/// back.
pub fn index(store: &mut dyn VectorStore, embedder: &dyn Embedder, item: Item, options: &IndexOptions) -> Result<IndexReport> {
    let (source, file_path) = materialize(item)?;
    let chunk_config = ChunkConfig {
        size: options.chunk_size,
        overlap: options.chunk_overlap,
        preserve_boundaries: true,
        file_path: file_path.clone(),
    };
    chunk_config.validate()?;

    let text = source.original_content.clone().unwrap_or_default();
    let chunker: Box<dyn Chunker> = crate::chunking::create_chunker(&options.chunker)?;
    let fragments = chunker.chunk(&source.source_id, &text, &chunk_config)?;

    let mut chunks_created = 0;
    let mut errors = Vec::new();
    for batch in fragments.chunks(options.batch_size.max(1)) {
        let contents: Vec<&str> = batch.iter().map(|f| f.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&contents)?;
        let items: Vec<_> = batch.iter().cloned().zip(embeddings).collect();
        let outcome = store.insert_batch(items)?;
        chunks_created += outcome.ids.len();
        errors.extend(outcome.errors.into_iter().map(|error| error.to_string()));
    }

    Ok(IndexReport { items_indexed: 1, chunks_created, source_id: source.source_id, errors })
}

fn materialize(item: Item) -> Result<(Source, Option<String>)> {
    match item {
        Item::Text(content) => Ok((Source::from_text(content), None)),
        Item::File(path) => {
            let content = read_file(&path)?;
            let source = Source::from_file(&path, content);
            Ok((source, Some(path)))
        }
        Item::Url { url, content } => {
            let source = Source::from_url(&url, Some(content));
            Ok((source, None))
        }
    }
}

/// Overrides a materialized source's [`SourceType`], for callers that
/// fetched gist or github content upstream and want that distinction
/// preserved instead of the generic [`SourceType::Url`] [`materialize`]
/// assigns to fetched content.
#[must_use]
pub fn with_source_type(mut source: Source, source_type: SourceType) -> Source {
    source.source_type = source_type;
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::storage::{BackendConfig, open};

    fn store() -> Box<dyn VectorStore> {
        let mut store = open(BackendConfig::Memory { dimensions: 8 }).unwrap();
        store.initialize().unwrap();
        store
    }

    #[test]
    fn test_index_text_creates_fragments() {
        let mut store = store();
        let embedder = FallbackEmbedder::new(8);
        let report = index(
            store.as_mut(),
            &embedder,
            Item::Text("Hello, world! This is a test document.".to_string()),
            &IndexOptions::default(),
        )
        .unwrap();
        assert_eq!(report.items_indexed, 1);
        assert!(report.chunks_created >= 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_index_is_idempotent_on_source_id() {
        let mut store = store();
        let embedder = FallbackEmbedder::new(8);
        let report1 = index(store.as_mut(), &embedder, Item::Text("same text".to_string()), &IndexOptions::default()).unwrap();
        let report2 = index(store.as_mut(), &embedder, Item::Text("same text".to_string()), &IndexOptions::default()).unwrap();
        assert_eq!(report1.source_id, report2.source_id);
    }

    #[test]
    fn test_with_source_type_overrides() {
        let source = Source::from_url("https://example.com/gist/1", Some("content".to_string()));
        let source = with_source_type(source, SourceType::Gist);
        assert_eq!(source.source_type, SourceType::Gist);
    }
}
