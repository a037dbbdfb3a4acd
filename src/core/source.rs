//! Source entities.
//!
//! A [`Source`] is one logical ingested artifact: a raw text string, a file, a
//! gist, a github repository file, or a fetched URL. The indexer creates one
//! source per artifact and never mutates it afterwards; a source is destroyed
//! by the base storage adapter when its last fragment is removed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of artifact a [`Source`] was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Raw text supplied directly by the caller.
    Text,
    /// Content read from a local file.
    File,
    /// Content fetched from a hosted gist.
    Gist,
    /// A file within a github repository.
    Github,
    /// Content fetched from an arbitrary URL.
    Url,
}

impl SourceType {
    /// Returns the lowercase wire name used in persisted metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::Gist => "gist",
            Self::Github => "github",
            Self::Url => "url",
        }
    }
}

/// One ingested artifact.
///
/// # Examples
///
/// ```
/// use fragmint::core::{Source, SourceType};
///
/// let source = Source::from_text("Hello, world!".to_string());
/// assert_eq!(source.source_type, SourceType::Text);
/// assert_eq!(source.original_content.len(), 13);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Stable id: content-derived for raw text, canonical-identifier-derived otherwise.
    pub source_id: String,

    /// Human-readable title.
    pub title: Option<String>,

    /// Filesystem path or URL this source was loaded from, if any.
    pub url: Option<String>,

    /// What kind of artifact this source is.
    pub source_type: SourceType,

    /// The full original content, when captured at ingestion time.
    pub original_content: Option<String>,

    /// Unix timestamp when this source was created. Immutable thereafter.
    pub created_at: i64,
}

impl Source {
    /// Creates a source from raw text. The id is a SHA-256 hash of the content.
    #[must_use]
    pub fn from_text(content: String) -> Self {
        let source_id = stable_id(SourceType::Text, &content);
        Self {
            source_id,
            title: None,
            url: None,
            source_type: SourceType::Text,
            original_content: Some(content),
            created_at: current_timestamp(),
        }
    }

    /// Creates a source from a file path and its content.
    #[must_use]
    pub fn from_file(path: &str, content: String) -> Self {
        let source_id = stable_id(SourceType::File, path);
        let title = path.rsplit('/').next().map(ToString::to_string);
        Self {
            source_id,
            title,
            url: Some(path.to_string()),
            source_type: SourceType::File,
            original_content: Some(content),
            created_at: current_timestamp(),
        }
    }

    /// Creates a source from a fetched URL.
    #[must_use]
    pub fn from_url(url: &str, content: Option<String>) -> Self {
        let source_id = stable_id(SourceType::Url, url);
        Self {
            source_id,
            title: None,
            url: Some(url.to_string()),
            source_type: SourceType::Url,
            original_content: content,
            created_at: current_timestamp(),
        }
    }

    /// Returns a display name for this source.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.title.clone().unwrap_or_else(|| match &self.url {
            Some(url) => url.clone(),
            None => self.source_id.clone(),
        })
    }
}

/// Derives the stable source id from `sourceType + canonical-identifier`.
#[must_use]
pub fn stable_id(source_type: SourceType, canonical_identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(canonical_identifier.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[allow(clippy::cast_possible_wrap)]
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_text() {
        let source = Source::from_text("hello".to_string());
        assert_eq!(source.source_type, SourceType::Text);
        assert_eq!(source.original_content, Some("hello".to_string()));
        assert!(source.url.is_none());
    }

    #[test]
    fn test_source_from_text_is_deterministic() {
        let a = Source::from_text("hello".to_string());
        let b = Source::from_text("hello".to_string());
        assert_eq!(a.source_id, b.source_id);
    }

    #[test]
    fn test_source_from_text_differs_by_content() {
        let a = Source::from_text("hello".to_string());
        let b = Source::from_text("world".to_string());
        assert_ne!(a.source_id, b.source_id);
    }

    #[test]
    fn test_source_from_file() {
        let source = Source::from_file("/tmp/example.md", "# Title".to_string());
        assert_eq!(source.source_type, SourceType::File);
        assert_eq!(source.title, Some("example.md".to_string()));
        assert_eq!(source.url, Some("/tmp/example.md".to_string()));
    }

    #[test]
    fn test_source_from_url() {
        let source = Source::from_url("https://example.com/gist", None);
        assert_eq!(source.source_type, SourceType::Url);
        assert!(source.original_content.is_none());
    }

    #[test]
    fn test_display_name_prefers_title() {
        let mut source = Source::from_text("x".to_string());
        source.title = Some("My Title".to_string());
        assert_eq!(source.display_name(), "My Title");
    }

    #[test]
    fn test_display_name_falls_back_to_url() {
        let source = Source::from_url("https://example.com", None);
        assert_eq!(source.display_name(), "https://example.com");
    }

    #[test]
    fn test_source_type_as_str() {
        assert_eq!(SourceType::Text.as_str(), "text");
        assert_eq!(SourceType::File.as_str(), "file");
        assert_eq!(SourceType::Gist.as_str(), "gist");
        assert_eq!(SourceType::Github.as_str(), "github");
        assert_eq!(SourceType::Url.as_str(), "url");
    }

    #[test]
    fn test_source_serialization_roundtrip() {
        let source = Source::from_text("content".to_string());
        let json = serde_json::to_string(&source).unwrap();
        let back: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }
}
