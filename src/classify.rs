//! File-extension classifier.
//!
//! A pure, total function table: given a filename or bare extension, returns
//! the language, content category, and boundary-detection eligibility. Unknown
//! extensions map to `category: Other` rather than failing — the classifier
//! never errors.

use serde::{Deserialize, Serialize};

/// Content category used to pick a boundary-detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Source code in a supported language.
    Code,
    /// Prose documentation (markdown, plain text).
    Documentation,
    /// Structured configuration (json, yaml, toml).
    Config,
    /// Stylesheets.
    Style,
    /// Structured data formats.
    Data,
    /// Anything not covered above.
    Other,
}

/// Classification result for one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Canonical language name, when recognized.
    pub language: Option<&'static str>,
    /// Content category driving boundary-detection policy.
    pub category: Category,
    /// Human-facing display name, when recognized.
    pub display_name: Option<&'static str>,
    /// Whether a tree-sitter grammar exists for this language in this crate.
    pub tree_sitter_supported: bool,
    /// Whether this extension should use the markdown boundary strategy.
    pub is_markdown: bool,
    /// Whether this extension is source code (category == Code).
    pub is_code: bool,
}

impl Classification {
    const fn other() -> Self {
        Self {
            language: None,
            category: Category::Other,
            display_name: None,
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: false,
        }
    }

    const fn code(language: &'static str, display_name: &'static str, cst: bool) -> Self {
        Self {
            language: Some(language),
            category: Category::Code,
            display_name: Some(display_name),
            tree_sitter_supported: cst,
            is_markdown: false,
            is_code: true,
        }
    }
}

/// Classifies a filename or bare extension.
///
/// The closed supported-language set (see the glossary): javascript,
/// typescript, tsx, python, go, rust, java, ruby, c, cpp, html, css, bash,
/// vue. Markdown (`md`, `mdx`) is documentation, not code. Anything else maps
/// to `Category::Other`.
#[must_use]
pub fn classify(filename_or_extension: &str) -> Classification {
    let ext = extension_of(filename_or_extension);
    match ext.as_str() {
        "js" | "mjs" | "cjs" | "jsx" => Classification::code("javascript", "JavaScript", true),
        "ts" | "mts" | "cts" => Classification::code("typescript", "TypeScript", true),
        "tsx" => Classification::code("tsx", "TSX", true),
        "py" | "pyi" => Classification::code("python", "Python", true),
        "go" => Classification::code("go", "Go", true),
        "rs" => Classification::code("rust", "Rust", true),
        "java" => Classification::code("java", "Java", true),
        "rb" => Classification::code("ruby", "Ruby", true),
        "c" | "h" => Classification::code("c", "C", true),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => Classification::code("cpp", "C++", true),
        "html" | "htm" => Classification {
            language: Some("html"),
            category: Category::Code,
            display_name: Some("HTML"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: true,
        },
        "css" => Classification {
            language: Some("css"),
            category: Category::Style,
            display_name: Some("CSS"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: false,
        },
        "sh" | "bash" => Classification {
            language: Some("bash"),
            category: Category::Code,
            display_name: Some("Bash"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: true,
        },
        "vue" => Classification {
            language: Some("vue"),
            category: Category::Code,
            display_name: Some("Vue"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: true,
        },
        "md" | "mdx" => Classification {
            language: None,
            category: Category::Documentation,
            display_name: Some("Markdown"),
            tree_sitter_supported: false,
            is_markdown: true,
            is_code: false,
        },
        "txt" => Classification {
            language: None,
            category: Category::Documentation,
            display_name: Some("Text"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: false,
        },
        "json" | "yaml" | "yml" | "toml" => Classification {
            language: None,
            category: Category::Config,
            display_name: Some("Config"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: false,
        },
        "csv" | "tsv" => Classification {
            language: None,
            category: Category::Data,
            display_name: Some("Data"),
            tree_sitter_supported: false,
            is_markdown: false,
            is_code: false,
        },
        _ => Classification::other(),
    }
}

/// Extracts the lowercase extension from a filename or bare extension string.
fn extension_of(input: &str) -> String {
    let trimmed = input.trim_start_matches('.');
    let ext = trimmed.rsplit('.').next().unwrap_or(trimmed);
    ext.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("rs", "rust")]
    #[test_case("main.rs", "rust")]
    #[test_case("py", "python")]
    #[test_case("script.py", "python")]
    #[test_case("go", "go")]
    #[test_case("java", "java")]
    #[test_case("rb", "ruby")]
    #[test_case("c", "c")]
    #[test_case("cpp", "cpp")]
    #[test_case("ts", "typescript")]
    #[test_case("tsx", "tsx")]
    #[test_case("js", "javascript")]
    fn test_classify_known_languages(input: &str, expected_language: &str) {
        let classification = classify(input);
        assert_eq!(classification.language, Some(expected_language));
        assert_eq!(classification.category, Category::Code);
    }

    #[test]
    fn test_classify_markdown() {
        let classification = classify("README.md");
        assert_eq!(classification.category, Category::Documentation);
        assert!(classification.is_markdown);
        assert!(!classification.is_code);
    }

    #[test]
    fn test_classify_unknown_is_other() {
        let classification = classify("weird.xyz123");
        assert_eq!(classification.category, Category::Other);
        assert!(classification.language.is_none());
    }

    #[test]
    fn test_classify_is_total_for_empty_input() {
        let classification = classify("");
        assert_eq!(classification.category, Category::Other);
    }

    #[test]
    fn test_classify_css_is_style_not_code() {
        let classification = classify("app.css");
        assert_eq!(classification.category, Category::Style);
        assert!(!classification.is_code);
    }

    #[test]
    fn test_classify_json_is_config() {
        let classification = classify("package.json");
        assert_eq!(classification.category, Category::Config);
    }

    #[test]
    fn test_classify_tree_sitter_supported_languages() {
        assert!(classify("rs").tree_sitter_supported);
        assert!(classify("py").tree_sitter_supported);
        assert!(!classify("css").tree_sitter_supported);
        assert!(!classify("vue").tree_sitter_supported);
    }

    #[test]
    fn test_classify_strips_dotfile_prefix() {
        let classification = classify(".rs");
        assert_eq!(classification.language, Some("rust"));
    }
}
