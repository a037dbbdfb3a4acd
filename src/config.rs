//! Runtime configuration: an optional TOML file plus environment
//! variable overrides, with settings grouped to mirror the chunking,
//! storage, embedding, search, and cache concerns they configure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which storage backend a [`Config`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Relational-native backend (rusqlite + sqlite-vec).
    RelationalNative,
    /// Relational-alternative backend (libsql).
    RelationalAlt,
    /// Columnar analytical backend (duckdb).
    Columnar,
    /// In-memory, non-persistent backend.
    Memory,
}

/// Chunking defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target fragment size in bytes.
    pub size: usize,
    /// Overlap between consecutive size-only fragments, in bytes.
    pub overlap: usize,
    /// Whether to honour boundary spans before falling back to size-only
    /// chunking.
    pub preserve_boundaries: bool,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            size: crate::chunking::DEFAULT_CHUNK_SIZE,
            overlap: crate::chunking::DEFAULT_OVERLAP,
            preserve_boundaries: true,
        }
    }
}

/// Storage backend selection and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Which backend to open.
    pub backend: BackendKind,
    /// Filesystem path for file-backed backends. Unused for `Memory`.
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: BackendKind::RelationalNative, path: default_db_path() }
    }
}

/// Embedding façade selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Vector dimension; must match what the store was initialized with.
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { dimensions: crate::embedding::DEFAULT_DIMENSIONS }
    }
}

/// Default search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Default number of hits returned by a search call.
    pub default_k: usize,
    /// Default keyword weight for hybrid search, in `[0, 1]`.
    pub keyword_weight: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_k: crate::search::DEFAULT_TOP_K, keyword_weight: 0.5 }
    }
}

/// Query-cache location and capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Directory holding `queries.json`/`queries.md`/`structured/`.
    pub dir: PathBuf,
    /// Maximum cached queries retained.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { dir: default_cache_dir(), capacity: crate::orchestrate::QUERY_CACHE_CAPACITY }
    }
}

/// Top-level configuration, loaded from an optional TOML file with
/// environment variable overrides layered on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunking defaults.
    pub chunking: ChunkingSettings,
    /// Storage backend selection.
    pub storage: StorageSettings,
    /// Embedding façade selection.
    pub embedding: EmbeddingSettings,
    /// Default search parameters.
    pub search: SearchSettings,
    /// Query-cache settings.
    pub cache: CacheSettings,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(crate::storage::DEFAULT_DB_DIR).join(crate::storage::DEFAULT_DB_NAME)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(crate::storage::DEFAULT_DB_DIR).join("cache")
}

impl Config {
    /// Loads config from `path` if given, falling back to compiled-in
    /// defaults when the file doesn't exist. Environment variables
    /// (`FRAGMINT_DB_PATH`, `FRAGMINT_BACKEND`) override whatever the file
    /// (or the defaults) set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the file exists but fails to
    /// parse as TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path).map_err(|e| Error::InvalidArgument {
                    reason: format!("failed to read config file {}: {e}", path.display()),
                })?;
                toml::from_str(&text)
                    .map_err(|e| Error::InvalidArgument { reason: format!("invalid config TOML: {e}") })?
            }
            _ => Self::default(),
        };

        if let Ok(db_path) = std::env::var("FRAGMINT_DB_PATH") {
            config.storage.path = PathBuf::from(db_path);
        }
        if let Ok(backend) = std::env::var("FRAGMINT_BACKEND") {
            config.storage.backend = match backend.as_str() {
                "relational-alt" => BackendKind::RelationalAlt,
                "columnar" => BackendKind::Columnar,
                "memory" => BackendKind::Memory,
                _ => BackendKind::RelationalNative,
            };
        }

        Ok(config)
    }

    /// Builds the [`crate::storage::BackendConfig`] this config selects.
    #[must_use]
    pub fn backend_config(&self) -> crate::storage::BackendConfig {
        let dimensions = self.embedding.dimensions;
        match self.storage.backend {
            BackendKind::RelationalNative => crate::storage::BackendConfig::Sqlite { path: self.storage.path.clone(), dimensions },
            BackendKind::RelationalAlt => crate::storage::BackendConfig::Libsql { path: self.storage.path.clone(), dimensions },
            BackendKind::Columnar => {
                crate::storage::BackendConfig::Columnar { path: self.storage.path.clone(), dimensions, enable_hnsw: false }
            }
            BackendKind::Memory => crate::storage::BackendConfig::Memory { dimensions },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_relational_native() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::RelationalNative);
        assert_eq!(config.search.default_k, crate::search::DEFAULT_TOP_K);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/fragmint.toml"))).unwrap();
        assert_eq!(config.storage.backend, BackendKind::RelationalNative);
    }

    #[test]
    fn test_load_parses_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fragmint.toml");
        std::fs::write(&path, "[storage]\nbackend = \"memory\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Memory);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fragmint.toml");
        std::fs::write(&path, "not valid [[[ toml").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_backend_config_matches_selection() {
        let mut config = Config::default();
        config.storage.backend = BackendKind::Memory;
        assert!(matches!(config.backend_config(), crate::storage::BackendConfig::Memory { .. }));
    }
}
