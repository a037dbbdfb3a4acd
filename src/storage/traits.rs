//! Vector store adapter contract.
//!
//! [`VectorStore`] is the public surface every backend exposes. Backends
//! don't implement it directly; they implement [`StoragePrimitives`] (six
//! storage-level operations) and get [`VectorStore`] for free via
//! [`BaseAdapter`], which folds in id assignment, source-row upkeep, and
//! orphan-source cleanup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::core::{Fragment, Source};
use crate::error::{Error, Result};

/// Equality predicate over fragment metadata keys, including dotted paths
/// into the `boundary` record (e.g. `"boundary.kind"`).
pub type Filter = HashMap<String, String>;

/// One result from [`VectorStore::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// The matching fragment.
    pub fragment: Fragment,
    /// Similarity score; higher is more similar. Backends normalize their
    /// native distance metric to this convention at the adapter boundary.
    pub score: f32,
}

/// Options for [`VectorStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of hits to return.
    pub k: usize,
    /// Optional equality filter over metadata.
    pub filter: Option<Filter>,
}

/// Options for [`VectorStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of fragments to return.
    pub limit: Option<usize>,
    /// Number of fragments to skip.
    pub offset: Option<usize>,
    /// Optional equality filter over metadata.
    pub filter: Option<Filter>,
}

/// Descriptive info returned by [`VectorStore::get_info`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    /// Backend name (`"sqlite"`, `"libsql"`, `"columnar"`, `"memory"`).
    pub backend: &'static str,
    /// Configured vector dimension.
    pub dimensions: usize,
    /// Number of fragments currently stored.
    pub count: usize,
    /// How a raw backend distance is converted to the `[-1, 1]`-ish
    /// similarity convention used by [`Hit::score`] (documented per backend
    /// per the open-question resolution in `DESIGN.md`).
    pub similarity_convention: &'static str,
}

/// The result of a batched write: ids that succeeded, and errors for the
/// fragments that didn't. Batches are best-effort, not all-or-nothing.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Ids of fragments that were written successfully, in input order.
    pub ids: Vec<String>,
    /// One error per fragment that failed to write.
    pub errors: Vec<Error>,
}

/// The public vector store adapter surface, identical across every
/// backend.
pub trait VectorStore: Send + Sync {
    /// Prepares the backend for use (opens connections, creates schema,
    /// loads vector extensions). Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the backend or its vector
    /// extension cannot be brought up.
    fn initialize(&mut self) -> Result<()>;

    /// Releases backend resources. For the columnar backend this only
    /// releases the physical connection when the last reference-counted
    /// holder calls it.
    ///
    /// # Errors
    ///
    /// Returns an error if resources cannot be released cleanly.
    fn close(&mut self) -> Result<()>;

    /// Inserts one fragment (with its embedding already attached via
    /// `metadata["__embedding"]` is never used; embeddings travel alongside
    /// the fragment through `insert`/`insert_batch`'s `embedding` parameter).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if called before `initialize`, or
    /// [`Error::DimensionMismatch`] if `embedding`'s length doesn't match
    /// the configured dimension.
    fn insert(&mut self, fragment: Fragment, embedding: Vec<f32>) -> Result<String>;

    /// Inserts a batch of `(fragment, embedding)` pairs. Best-effort: see
    /// [`BatchOutcome`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if called before `initialize`.
    fn insert_batch(&mut self, items: Vec<(Fragment, Vec<f32>)>) -> Result<BatchOutcome>;

    /// Retrieves a fragment by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if `id` is unknown.
    fn get(&self, id: &str) -> Result<Fragment>;

    /// Updates a fragment's content and/or metadata in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if `id` is unknown.
    fn update(&mut self, id: &str, content: Option<String>, metadata: Option<Filter>) -> Result<()>;

    /// Deletes a fragment, deleting its owning source if it was the last
    /// fragment of that source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if `id` is unknown.
    fn delete(&mut self, id: &str) -> Result<()>;

    /// Deletes a batch of fragments by id. Best-effort per id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if called before `initialize`.
    fn delete_batch(&mut self, ids: &[String]) -> Result<BatchOutcome>;

    /// Vector similarity search. Results are sorted by descending
    /// similarity; ties broken by `chunk_index` ascending, then `source_id`
    /// lexicographically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `vector`'s length doesn't
    /// match the configured dimension.
    fn search(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>>;

    /// Lists fragments, optionally filtered and paginated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if called before `initialize`.
    fn list(&self, options: &ListOptions) -> Result<Vec<Fragment>>;

    /// Counts fragments, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if called before `initialize`.
    fn count(&self, filter: Option<&Filter>) -> Result<usize>;

    /// Returns descriptive backend info.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if called before `initialize`.
    fn get_info(&self) -> Result<StoreInfo>;
}

/// The four storage primitives each backend actually implements.
/// [`BaseAdapter`] builds the full [`VectorStore`] surface on top of these.
pub trait StoragePrimitives: Send + Sync {
    /// Backend name, surfaced through [`StoreInfo::backend`].
    fn backend_name(&self) -> &'static str;

    /// How this backend's raw distance maps to [`Hit::score`].
    fn similarity_convention(&self) -> &'static str;

    /// Configured vector dimension.
    fn dimensions(&self) -> usize;

    /// Opens/creates the backend's physical storage.
    fn open(&mut self) -> Result<()>;

    /// Releases the backend's physical storage.
    fn shut(&mut self) -> Result<()>;

    /// Writes one fragment row (id already assigned) plus its embedding.
    fn store_document(&mut self, fragment: &Fragment, embedding: &[f32]) -> Result<()>;

    /// Reads one fragment row by id.
    fn retrieve_document(&self, id: &str) -> Result<Option<Fragment>>;

    /// Overwrites a fragment's content/metadata by id.
    fn replace_document(&mut self, id: &str, content: Option<&str>, metadata: Option<&Filter>) -> Result<bool>;

    /// Deletes one fragment row by id; returns the deleted fragment's
    /// `source_id` if a row was deleted.
    fn remove_document(&mut self, id: &str) -> Result<Option<String>>;

    /// Nearest-neighbour search over stored embeddings.
    fn search_similar(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>>;

    /// Counts fragment rows belonging to `source_id`. Used to decide
    /// whether a source has become orphaned after a delete.
    fn count_for_source(&self, source_id: &str) -> Result<usize>;

    /// Counts all fragment rows, optionally filtered.
    fn count_documents(&self, filter: Option<&Filter>) -> Result<usize>;

    /// Lists fragment rows, optionally filtered and paginated.
    fn list_documents(&self, options: &ListOptions) -> Result<Vec<Fragment>>;

    /// Upserts a source row (called on `chunk_index == 0`).
    fn upsert_source(&mut self, source: &Source) -> Result<()>;

    /// Deletes a source row (called when its last fragment is removed).
    fn delete_source(&mut self, source_id: &str) -> Result<()>;

    /// Whether a source row exists. Used to assert `chunk_index > 0`
    /// fragments have an owning source already.
    fn source_exists(&self, source_id: &str) -> Result<bool>;
}

/// Generic [`VectorStore`] built from a backend's [`StoragePrimitives`].
pub struct BaseAdapter<P: StoragePrimitives> {
    primitives: P,
    initialized: bool,
}

impl<P: StoragePrimitives> BaseAdapter<P> {
    /// Wraps a backend's primitives in the base adapter.
    pub const fn new(primitives: P) -> Self {
        Self {
            primitives,
            initialized: false,
        }
    }

    fn require_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn assign_id(fragment: &mut Fragment) -> String {
        let id = fragment.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        fragment.id = Some(id.clone());
        id
    }

    /// Derives the [`Source`] a `chunk_index == 0` fragment implies, from
    /// its metadata (`__title`, `__url`, `__source_type`, `__original_content`).
    fn source_from_fragment(fragment: &Fragment) -> Source {
        use crate::core::SourceType;

        let source_type = match fragment.metadata.get("__source_type").map(String::as_str) {
            Some("file") => SourceType::File,
            Some("gist") => SourceType::Gist,
            Some("github") => SourceType::Github,
            Some("url") => SourceType::Url,
            _ => SourceType::Text,
        };

        Source {
            source_id: fragment.source_id.clone(),
            title: fragment.metadata.get("__title").cloned(),
            url: fragment.metadata.get("__url").cloned(),
            source_type,
            original_content: fragment.metadata.get("__original_content").cloned(),
            created_at: 0,
        }
    }

    fn ingest_one(&mut self, mut fragment: Fragment, embedding: Vec<f32>) -> Result<String> {
        if embedding.len() != self.primitives.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.primitives.dimensions(),
                actual: embedding.len(),
            });
        }

        let id = Self::assign_id(&mut fragment);

        if fragment.chunk_index == 0 {
            let source = Self::source_from_fragment(&fragment);
            self.primitives.upsert_source(&source)?;
        } else if !self.primitives.source_exists(&fragment.source_id)? {
            return Err(Error::InvalidArgument {
                reason: format!(
                    "fragment with chunk_index {} references unknown source {}",
                    fragment.chunk_index, fragment.source_id
                ),
            });
        }

        self.primitives.store_document(&fragment, &embedding)?;
        Ok(id)
    }

    fn remove_one(&mut self, id: &str) -> Result<()> {
        let Some(source_id) = self.primitives.remove_document(id)? else {
            return Err(Error::DocumentNotFound { id: id.to_string() });
        };
        if self.primitives.count_for_source(&source_id)? == 0 {
            self.primitives.delete_source(&source_id)?;
        }
        Ok(())
    }
}

impl<P: StoragePrimitives> VectorStore for BaseAdapter<P> {
    #[instrument(skip(self))]
    fn initialize(&mut self) -> Result<()> {
        self.primitives.open()?;
        self.initialized = true;
        tracing::debug!(backend = self.primitives.backend_name(), "storage backend opened");
        Ok(())
    }

    #[instrument(skip(self))]
    fn close(&mut self) -> Result<()> {
        self.primitives.shut()?;
        self.initialized = false;
        Ok(())
    }

    #[instrument(skip(self, fragment, embedding))]
    fn insert(&mut self, fragment: Fragment, embedding: Vec<f32>) -> Result<String> {
        self.require_initialized()?;
        self.ingest_one(fragment, embedding)
    }

    #[instrument(skip(self, items), fields(batch_size = items.len()))]
    fn insert_batch(&mut self, items: Vec<(Fragment, Vec<f32>)>) -> Result<BatchOutcome> {
        self.require_initialized()?;
        let mut outcome = BatchOutcome::default();
        for (fragment, embedding) in items {
            match self.ingest_one(fragment, embedding) {
                Ok(id) => outcome.ids.push(id),
                Err(err) => outcome.errors.push(err),
            }
        }
        tracing::debug!(succeeded = outcome.ids.len(), failed = outcome.errors.len(), "batch insert complete");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    fn get(&self, id: &str) -> Result<Fragment> {
        self.require_initialized()?;
        self.primitives
            .retrieve_document(id)?
            .ok_or_else(|| Error::DocumentNotFound { id: id.to_string() })
    }

    #[instrument(skip(self, content, metadata))]
    fn update(&mut self, id: &str, content: Option<String>, metadata: Option<Filter>) -> Result<()> {
        self.require_initialized()?;
        let found = self
            .primitives
            .replace_document(id, content.as_deref(), metadata.as_ref())?;
        if found {
            Ok(())
        } else {
            Err(Error::DocumentNotFound { id: id.to_string() })
        }
    }

    #[instrument(skip(self))]
    fn delete(&mut self, id: &str) -> Result<()> {
        self.require_initialized()?;
        self.remove_one(id)
    }

    #[instrument(skip(self, ids), fields(batch_size = ids.len()))]
    fn delete_batch(&mut self, ids: &[String]) -> Result<BatchOutcome> {
        self.require_initialized()?;
        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.remove_one(id) {
                Ok(()) => outcome.ids.push(id.clone()),
                Err(err) => outcome.errors.push(err),
            }
        }
        Ok(outcome)
    }

    #[instrument(skip(self, vector, options))]
    fn search(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>> {
        self.require_initialized()?;
        if vector.len() != self.primitives.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.primitives.dimensions(),
                actual: vector.len(),
            });
        }
        let mut hits = self.primitives.search_similar(vector, options)?;
        sort_hits(&mut hits);
        tracing::debug!(k = options.k, found = hits.len(), "search complete");
        Ok(hits)
    }

    #[instrument(skip(self, options))]
    fn list(&self, options: &ListOptions) -> Result<Vec<Fragment>> {
        self.require_initialized()?;
        self.primitives.list_documents(options)
    }

    #[instrument(skip(self, filter))]
    fn count(&self, filter: Option<&Filter>) -> Result<usize> {
        self.require_initialized()?;
        self.primitives.count_documents(filter)
    }

    #[instrument(skip(self))]
    fn get_info(&self) -> Result<StoreInfo> {
        self.require_initialized()?;
        Ok(StoreInfo {
            backend: self.primitives.backend_name(),
            dimensions: self.primitives.dimensions(),
            count: self.primitives.count_documents(None)?,
            similarity_convention: self.primitives.similarity_convention(),
        })
    }
}

/// Sorts hits by descending similarity, ties broken by `chunk_index`
/// ascending then `source_id` lexicographically.
pub fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.fragment.chunk_index.cmp(&b.fragment.chunk_index))
            .then_with(|| a.fragment.source_id.cmp(&b.fragment.source_id))
    });
}
