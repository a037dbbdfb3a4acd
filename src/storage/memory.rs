//! In-memory vector store backend.
//!
//! A `Vec<(Fragment, embedding)>` with linear-scan cosine similarity.
//! No crate dependency: this backend exists for tests and for
//! `provider=memory` callers that don't want a file on disk.

use std::collections::HashMap;

use crate::core::{Fragment, Source};
use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::storage::metadata_codec;
use crate::storage::traits::{Filter, Hit, ListOptions, SearchOptions, StoragePrimitives};

struct Row {
    fragment: Fragment,
    embedding: Vec<f32>,
}

/// In-memory [`StoragePrimitives`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    dimensions: usize,
    rows: Vec<Row>,
    sources: HashMap<String, Source>,
}

impl MemoryStore {
    /// Creates an empty in-memory store with the given vector dimension.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: Vec::new(),
            sources: HashMap::new(),
        }
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.fragment.id.as_deref() == Some(id))
    }

    fn matches(fragment: &Fragment, filter: &Filter) -> bool {
        let metadata = metadata_codec::encode(fragment);
        filter.iter().all(|(key, value)| metadata.get(key) == Some(value))
    }
}

impl StoragePrimitives for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn similarity_convention(&self) -> &'static str {
        "raw cosine similarity"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn shut(&mut self) -> Result<()> {
        Ok(())
    }

    fn store_document(&mut self, fragment: &Fragment, embedding: &[f32]) -> Result<()> {
        let id = fragment.id.clone().expect("id assigned before store_document");
        if let Some(idx) = self.index_of(&id) {
            self.rows[idx] = Row { fragment: fragment.clone(), embedding: embedding.to_vec() };
        } else {
            self.rows.push(Row { fragment: fragment.clone(), embedding: embedding.to_vec() });
        }
        Ok(())
    }

    fn retrieve_document(&self, id: &str) -> Result<Option<Fragment>> {
        Ok(self.index_of(id).map(|idx| self.rows[idx].fragment.clone()))
    }

    fn replace_document(&mut self, id: &str, content: Option<&str>, metadata: Option<&Filter>) -> Result<bool> {
        let Some(idx) = self.index_of(id) else {
            return Ok(false);
        };
        if let Some(content) = content {
            self.rows[idx].fragment.content = content.to_string();
        }
        if let Some(metadata) = metadata {
            for (key, value) in metadata {
                self.rows[idx].fragment.metadata.insert(key.clone(), value.clone());
            }
        }
        Ok(true)
    }

    fn remove_document(&mut self, id: &str) -> Result<Option<String>> {
        let Some(idx) = self.index_of(id) else {
            return Ok(None);
        };
        Ok(Some(self.rows.remove(idx).fragment.source_id))
    }

    #[tracing::instrument(skip(self, vector, options), fields(k = options.k))]
    fn search_similar(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }
        let mut hits: Vec<Hit> = self
            .rows
            .iter()
            .filter(|row| options.filter.as_ref().is_none_or(|f| Self::matches(&row.fragment, f)))
            .map(|row| Hit { fragment: row.fragment.clone(), score: cosine_similarity(vector, &row.embedding) })
            .collect();
        crate::storage::traits::sort_hits(&mut hits);
        hits.truncate(options.k.max(1));
        Ok(hits)
    }

    fn count_for_source(&self, source_id: &str) -> Result<usize> {
        Ok(self.rows.iter().filter(|row| row.fragment.source_id == source_id).count())
    }

    fn count_documents(&self, filter: Option<&Filter>) -> Result<usize> {
        Ok(match filter {
            Some(filter) => self.rows.iter().filter(|row| Self::matches(&row.fragment, filter)).count(),
            None => self.rows.len(),
        })
    }

    fn list_documents(&self, options: &ListOptions) -> Result<Vec<Fragment>> {
        let mut fragments: Vec<Fragment> = self
            .rows
            .iter()
            .filter(|row| options.filter.as_ref().is_none_or(|f| Self::matches(&row.fragment, f)))
            .map(|row| row.fragment.clone())
            .collect();
        fragments.sort_by(|a, b| a.source_id.cmp(&b.source_id).then(a.chunk_index.cmp(&b.chunk_index)));
        let offset = options.offset.unwrap_or(0);
        let fragments: Vec<_> = fragments.into_iter().skip(offset).collect();
        Ok(match options.limit {
            Some(limit) => fragments.into_iter().take(limit).collect(),
            None => fragments,
        })
    }

    fn upsert_source(&mut self, source: &Source) -> Result<()> {
        self.sources.insert(source.source_id.clone(), source.clone());
        Ok(())
    }

    fn delete_source(&mut self, source_id: &str) -> Result<()> {
        self.sources.remove(source_id);
        Ok(())
    }

    fn source_exists(&self, source_id: &str) -> Result<bool> {
        Ok(self.sources.contains_key(source_id))
    }
}
