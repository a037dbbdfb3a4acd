//! Chunker trait and configuration.
//!
//! Defines the interface every chunking strategy implements, producing
//! [`Fragment`]s from source text.

use crate::core::Fragment;
use crate::error::{ChunkingError, Result};

/// Configuration shared by all chunking strategies.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target fragment size in bytes.
    pub size: usize,
    /// Overlap between consecutive size-only fragments, in bytes.
    pub overlap: usize,
    /// Whether to honour boundary spans before falling back to
    /// size-only chunking.
    pub preserve_boundaries: bool,
    /// Originating file path or name, used to classify the content.
    pub file_path: Option<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: super::DEFAULT_CHUNK_SIZE,
            overlap: super::DEFAULT_OVERLAP,
            preserve_boundaries: true,
            file_path: None,
        }
    }
}

impl ChunkConfig {
    /// Creates a config with a custom size and no overlap.
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            overlap: 0,
            ..Self::default()
        }
    }

    /// Creates a config with a custom size and overlap.
    #[must_use]
    pub fn with_size_and_overlap(size: usize, overlap: usize) -> Self {
        Self {
            size,
            overlap,
            ..Self::default()
        }
    }

    /// Sets the originating file path, used for boundary-strategy selection.
    #[must_use]
    pub fn file_path(mut self, path: &str) -> Self {
        self.file_path = Some(path.to_string());
        self
    }

    /// Sets whether to honour detected boundary spans.
    #[must_use]
    pub const fn preserve_boundaries(mut self, enabled: bool) -> Self {
        self.preserve_boundaries = enabled;
        self
    }

    /// Validates `size ≥ 1` and `0 ≤ overlap < size`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] if the bounds are violated.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "size must be > 0".to_string(),
            }
            .into());
        }
        if self.size > super::MAX_CHUNK_SIZE {
            return Err(ChunkingError::InvalidConfig {
                reason: format!("size {} exceeds maximum {}", self.size, super::MAX_CHUNK_SIZE),
            }
            .into());
        }
        if self.overlap >= self.size {
            return Err(ChunkingError::InvalidConfig {
                reason: format!("overlap {} must be less than size {}", self.overlap, self.size),
            }
            .into());
        }
        Ok(())
    }
}

/// Trait for chunking a source's text into [`Fragment`]s.
///
/// Implementations must be `Send + Sync`, deterministic, and must satisfy the
/// reconstruction contract: laying fragment texts out in `chunk_index` order
/// with overlaps stitched by longest-suffix/prefix match reproduces the
/// original text byte-for-byte (see [`crate::core::stitch_fragments`]).
pub trait Chunker: Send + Sync {
    /// Chunks `text` (belonging to `source_id`) into fragments per `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    fn chunk(&self, source_id: &str, text: &str, config: &ChunkConfig) -> Result<Vec<Fragment>>;

    /// Name of this chunking strategy.
    fn name(&self) -> &'static str;

    /// Description of this chunking strategy.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_config_defaults() {
        let config = ChunkConfig::default();
        assert_eq!(config.size, super::super::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.overlap, super::super::DEFAULT_OVERLAP);
        assert!(config.preserve_boundaries);
    }

    #[test]
    fn test_chunk_config_validate_zero_size() {
        let config = ChunkConfig::with_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_config_validate_overlap_too_large() {
        let config = ChunkConfig::with_size_and_overlap(10, 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_config_validate_ok() {
        let config = ChunkConfig::with_size_and_overlap(100, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_config_builder() {
        let config = ChunkConfig::with_size(500).file_path("a.rs").preserve_boundaries(false);
        assert_eq!(config.size, 500);
        assert_eq!(config.file_path.as_deref(), Some("a.rs"));
        assert!(!config.preserve_boundaries);
    }
}
