//! Pluggable vector store backends.
//!
//! Every backend implements [`traits::StoragePrimitives`] and gets the full
//! [`traits::VectorStore`] surface for free via [`traits::BaseAdapter`].
//! [`open`] selects a backend from a [`BackendConfig`] and returns it boxed
//! behind the public trait.

pub mod metadata_codec;
pub mod schema;
pub mod sqlite;
pub mod traits;

#[cfg(feature = "backend-libsql")]
pub mod libsql_backend;

#[cfg(feature = "backend-columnar")]
pub mod columnar;

pub mod memory;

use std::path::PathBuf;

use crate::error::{Error, Result};

pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::SqliteStore;
pub use traits::{BaseAdapter, BatchOutcome, Filter, Hit, ListOptions, SearchOptions, StoreInfo, VectorStore};

#[cfg(feature = "backend-columnar")]
pub use columnar::{ColumnarStore, HnswMetric};

#[cfg(feature = "backend-libsql")]
pub use libsql_backend::LibsqlStore;

pub use memory::MemoryStore;

/// Default database file name, used when a backend's config doesn't name
/// one explicitly.
pub const DEFAULT_DB_NAME: &str = "fragmint.db";

/// Default database directory, relative to the project root.
pub const DEFAULT_DB_DIR: &str = ".fragmint";

/// Which backend to bring up, and where.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Relational, native runtime (`rusqlite` + `sqlite-vec`).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Embedding vector dimension.
        dimensions: usize,
    },
    /// Relational, alternative runtime (`libsql`).
    Libsql {
        /// Database file path.
        path: PathBuf,
        /// Embedding vector dimension.
        dimensions: usize,
    },
    /// Columnar analytical (`duckdb`), optionally HNSW-accelerated.
    Columnar {
        /// Database file path.
        path: PathBuf,
        /// Embedding vector dimension.
        dimensions: usize,
        /// Whether to attempt building an HNSW index via `usearch`.
        enable_hnsw: bool,
    },
    /// In-memory, for tests and ephemeral sessions.
    Memory {
        /// Embedding vector dimension.
        dimensions: usize,
    },
}

/// Builds the backend named by `config`, boxed behind [`VectorStore`].
/// Callers still need to call [`VectorStore::initialize`].
///
/// # Errors
///
/// Returns [`Error::BackendUnavailable`] if the crate was built without the
/// feature the requested backend needs.
#[tracing::instrument(skip(config))]
pub fn open(config: BackendConfig) -> Result<Box<dyn VectorStore>> {
    let backend = match &config {
        BackendConfig::Sqlite { .. } => "sqlite",
        BackendConfig::Libsql { .. } => "libsql",
        BackendConfig::Columnar { .. } => "columnar",
        BackendConfig::Memory { .. } => "memory",
    };
    tracing::debug!(backend, "opening storage backend");
    match config {
        BackendConfig::Sqlite { path, dimensions } => {
            let store = SqliteStore::open(path, dimensions)?;
            Ok(Box::new(BaseAdapter::new(store)))
        }
        #[cfg(feature = "backend-libsql")]
        BackendConfig::Libsql { path, dimensions } => {
            let store = LibsqlStore::open(path, dimensions)?;
            Ok(Box::new(BaseAdapter::new(store)))
        }
        #[cfg(not(feature = "backend-libsql"))]
        BackendConfig::Libsql { .. } => Err(Error::BackendUnavailable {
            reason: "crate built without the backend-libsql feature".to_string(),
        }),
        #[cfg(feature = "backend-columnar")]
        BackendConfig::Columnar { path, dimensions, enable_hnsw } => {
            let store = columnar::ColumnarStore::open(path, dimensions, enable_hnsw, columnar::HnswMetric::Cosine)?;
            Ok(Box::new(BaseAdapter::new(store)))
        }
        #[cfg(not(feature = "backend-columnar"))]
        BackendConfig::Columnar { .. } => Err(Error::BackendUnavailable {
            reason: "crate built without the backend-columnar feature".to_string(),
        }),
        BackendConfig::Memory { dimensions } => Ok(Box::new(BaseAdapter::new(MemoryStore::new(dimensions)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_backend() {
        let mut store = open(BackendConfig::Memory { dimensions: 3 }).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.get_info().unwrap().backend, "memory");
    }

    #[test]
    fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(BackendConfig::Sqlite { path: dir.path().join("s.db"), dimensions: 3 }).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.get_info().unwrap().backend, "sqlite");
    }
}
