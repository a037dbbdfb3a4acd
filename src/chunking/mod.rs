//! Chunking strategies for fragmint.
//!
//! This module turns a source's text into an ordered sequence of
//! [`crate::core::Fragment`]s. Two strategies are available:
//!
//! - **`boundary-aware`** (default): honours markdown headings and CST
//!   definitions, falling back to fixed windows where no boundary
//!   applies.
//! - **`fixed`**: size-only sliding windows, no boundary awareness.

pub mod boundary_aware;
pub mod fixed;
pub mod traits;

pub use boundary_aware::BoundaryAwareChunker;
pub use fixed::FixedChunker;
pub use traits::{ChunkConfig, Chunker};

/// Default fragment size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1_500;

/// Default overlap between size-only fragments, in bytes.
pub const DEFAULT_OVERLAP: usize = 200;

/// Maximum allowed fragment size, in bytes.
pub const MAX_CHUNK_SIZE: usize = 50_000;

/// Creates the default chunker (boundary-aware).
#[must_use]
pub const fn default_chunker() -> BoundaryAwareChunker {
    BoundaryAwareChunker::new()
}

/// Creates a chunker by strategy name: `"boundary-aware"` or `"fixed"`.
///
/// # Errors
///
/// Returns [`crate::error::ChunkingError::UnknownLanguage`]-shaped error via
/// [`crate::error::Error::InvalidArgument`] for unrecognized names.
pub fn create_chunker(name: &str) -> crate::error::Result<Box<dyn Chunker>> {
    match name.to_lowercase().as_str() {
        "boundary-aware" | "boundary" | "default" => Ok(Box::new(BoundaryAwareChunker::new())),
        "fixed" => Ok(Box::new(FixedChunker::new())),
        other => Err(crate::error::Error::InvalidArgument {
            reason: format!("unknown chunking strategy: {other}"),
        }),
    }
}

/// Lists available chunking strategy names.
#[must_use]
pub fn available_strategies() -> Vec<&'static str> {
    vec!["boundary-aware", "fixed"]
}
