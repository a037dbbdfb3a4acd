//! Error types for fragmint.
//!
//! A layered `thiserror` hierarchy: the top-level [`Error`] enum is the stable,
//! caller-facing taxonomy from the design document; [`StorageError`],
//! [`ChunkingError`] and [`EmbeddingError`] carry the substructure a real backend
//! or chunker needs internally and fold into the top-level kinds at the boundary.

use thiserror::Error as ThisError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable, caller-facing error taxonomy.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Caller input violates a contract (bad `k`, conflicting flags, ...).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable explanation.
        reason: String,
    },

    /// `get`/`update`/`delete` of an unknown fragment id.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// The id that was not found.
        id: String,
    },

    /// Vector length did not match the store's configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually supplied.
        actual: usize,
    },

    /// Operation attempted before `initialize()`.
    #[error("store not initialized")]
    NotInitialized,

    /// A backend's vector extension failed to load, or its connection was lost.
    #[error("backend unavailable: {reason}")]
    BackendUnavailable {
        /// Human-readable explanation.
        reason: String,
    },

    /// Cancellation was observed at a suspension point.
    #[error("operation cancelled")]
    Cancelled,

    /// An opaque pagination cursor failed to parse.
    #[error("invalid cursor: {reason}")]
    InvalidCursor {
        /// Human-readable explanation.
        reason: String,
    },

    /// Failure reported by the embedding façade.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// File read, glob expansion, or HTTP fetch failure.
    #[error("io error: {0}")]
    Io(#[from] IoError),

    /// Storage substructure that does not map 1:1 onto a public error kind.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chunking substructure.
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Invariant violation; must not occur from valid inputs.
    #[error("internal error: {reason}")]
    Internal {
        /// Human-readable explanation.
        reason: String,
    },
}

/// Storage-layer errors, internal to a backend implementation.
#[derive(Debug, ThisError)]
pub enum StorageError {
    /// Generic database-level failure.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Transaction commit/rollback failed.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Serialization of metadata or vectors failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The columnar backend's connection cache had no room (refcount underflow/overflow).
    #[error("connection pool exhausted for path {path}")]
    ConnectionPoolExhausted {
        /// Database path whose connection cache was exhausted.
        path: String,
    },

    /// A vector extension (sqlite-vec, libsql vector type, duckdb vss) failed to load.
    #[error("vector extension failed to load: {0}")]
    VectorExtensionLoad(String),
}

/// Chunking-layer errors.
#[derive(Debug, ThisError)]
pub enum ChunkingError {
    /// `size`/`overlap` violate the chunker contract.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Human-readable explanation.
        reason: String,
    },

    /// A boundary-detection regex failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// The requested language has no classifier/boundary entry.
    #[error("unknown language: {name}")]
    UnknownLanguage {
        /// Language name that was not recognized.
        name: String,
    },

    /// A CST parser failed to load for a language (missing grammar, init race lost).
    ///
    /// Never fatal to the caller: the boundary detector catches this and degrades
    /// to size-only chunking.
    #[error("failed to load parser for {language}: {reason}")]
    ParserLoad {
        /// Language the parser was requested for.
        language: String,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Embedding-façade errors.
#[derive(Debug, ThisError)]
pub enum EmbeddingError {
    /// A produced vector did not have the expected dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// The embedding model failed to load.
    #[error("failed to load embedding model: {reason}")]
    ModelLoad {
        /// Human-readable explanation.
        reason: String,
    },

    /// The embedding backend (ONNX runtime, remote provider) failed.
    #[error("embedding backend error: {reason}")]
    Backend {
        /// Human-readable explanation.
        reason: String,
    },
}

/// I/O-layer errors.
#[derive(Debug, ThisError)]
pub enum IoError {
    /// A requested file does not exist.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// A file existed but could not be read.
    #[error("failed to read {path}: {reason}")]
    ReadFailed {
        /// Path that failed to read.
        path: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// Content was not valid UTF-8.
    #[error("invalid utf-8 in {path}")]
    Utf8 {
        /// Path containing invalid UTF-8.
        path: String,
    },

    /// Glob pattern expansion failed.
    #[error("glob expansion failed: {0}")]
    Glob(String),

    /// A remote fetch (URL, gist, github) failed.
    #[error("http fetch failed ({status}): {reason}")]
    Http {
        /// HTTP status code, 0 if the request never completed.
        status: u16,
        /// Human-readable explanation.
        reason: String,
    },

    /// A path escaped its expected root (symlink or `..` traversal).
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// Offending path.
        path: String,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::ReadFailed {
            path: String::new(),
            reason: err.to_string(),
        })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::Chunking(ChunkingError::Regex(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Io(IoError::Utf8 {
            path: err.to_string(),
        })
    }
}
