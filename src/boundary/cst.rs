//! CST-based code boundary strategy.
//!
//! Walks a tree-sitter parse tree emitting spans for function, method, and
//! class definitions only; imports, variables, comments, and other node
//! kinds are not span-worthy here. Parser tables are process-wide and
//! lazily initialized per language, guarded by a single mutex so
//! concurrent first callers share one initialization rather than racing.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::core::{Boundary, CodeKind};
use crate::error::{ChunkingError, Result};

use super::BoundarySpan;

#[cfg(feature = "cst")]
use tree_sitter::{Language as TsLanguage, Node, Parser};

/// Maps a tree-sitter node-type string to the [`CodeKind`] it represents, for
/// one language. Only function/method/class node types are present; anything
/// else is simply absent from the table and skipped during the walk.
#[cfg(feature = "cst")]
fn node_kinds_for(language: &str) -> Option<HashMap<&'static str, CodeKind>> {
    let table: &[(&str, CodeKind)] = match language {
        "python" => &[
            ("function_definition", CodeKind::Function),
            ("class_definition", CodeKind::Class),
        ],
        "javascript" | "tsx" => &[
            ("function_declaration", CodeKind::Function),
            ("method_definition", CodeKind::Method),
            ("class_declaration", CodeKind::Class),
        ],
        "typescript" => &[
            ("function_declaration", CodeKind::Function),
            ("method_definition", CodeKind::Method),
            ("class_declaration", CodeKind::Class),
            ("interface_declaration", CodeKind::Class),
        ],
        "go" => &[
            ("function_declaration", CodeKind::Function),
            ("method_declaration", CodeKind::Method),
            ("type_declaration", CodeKind::Class),
        ],
        "rust" => &[
            ("function_item", CodeKind::Function),
            ("struct_item", CodeKind::Class),
            ("impl_item", CodeKind::Class),
            ("trait_item", CodeKind::Class),
        ],
        "java" => &[
            ("method_declaration", CodeKind::Method),
            ("class_declaration", CodeKind::Class),
            ("interface_declaration", CodeKind::Class),
        ],
        "ruby" => &[
            ("method", CodeKind::Method),
            ("class", CodeKind::Class),
            ("module", CodeKind::Class),
        ],
        "c" => &[("function_definition", CodeKind::Function)],
        "cpp" => &[
            ("function_definition", CodeKind::Function),
            ("class_specifier", CodeKind::Class),
            ("struct_specifier", CodeKind::Class),
        ],
        _ => return None,
    };
    Some(table.iter().copied().collect())
}

#[cfg(feature = "cst")]
fn tree_sitter_language(language: &str) -> Option<TsLanguage> {
    match language {
        "python" => Some(tree_sitter_python::language()),
        "javascript" => Some(tree_sitter_javascript::language()),
        "typescript" => Some(tree_sitter_typescript::language_typescript()),
        "tsx" => Some(tree_sitter_typescript::language_tsx()),
        "go" => Some(tree_sitter_go::language()),
        "rust" => Some(tree_sitter_rust::language()),
        "java" => Some(tree_sitter_java::language()),
        "c" => Some(tree_sitter_c::language()),
        "cpp" => Some(tree_sitter_cpp::language()),
        "ruby" => Some(tree_sitter_ruby::language()),
        _ => None,
    }
}

/// Process-wide, lazily-initialized per-language parser table. Guarded by a
/// single mutex: concurrent first-callers for different languages still
/// serialize on this lock, but that cost is paid once per process, not once
/// per chunking call.
#[cfg(feature = "cst")]
static PARSERS: OnceLock<Mutex<HashMap<String, Parser>>> = OnceLock::new();

#[cfg(feature = "cst")]
fn with_parser<T>(
    language: &str,
    f: impl FnOnce(&mut Parser) -> T,
) -> std::result::Result<T, ChunkingError> {
    let table = PARSERS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = table.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    if !guard.contains_key(language) {
        let ts_lang = tree_sitter_language(language).ok_or_else(|| ChunkingError::ParserLoad {
            language: language.to_string(),
            reason: "no tree-sitter grammar bundled for this language".to_string(),
        })?;
        let mut parser = Parser::new();
        parser.set_language(&ts_lang).map_err(|e| ChunkingError::ParserLoad {
            language: language.to_string(),
            reason: e.to_string(),
        })?;
        guard.insert(language.to_string(), parser);
    }

    let parser = guard.get_mut(language).expect("just inserted or already present");
    Ok(f(parser))
}

/// Parses `text` as `language` and returns function/method/class boundary
/// spans. Nested definitions (a method inside a class) both appear; the
/// chunker decides how to treat containment.
#[cfg(feature = "cst")]
pub fn parse_boundaries(text: &str, language: &str) -> Result<Vec<BoundarySpan>> {
    let Some(node_kinds) = node_kinds_for(language) else {
        return Err(ChunkingError::UnknownLanguage {
            name: language.to_string(),
        }
        .into());
    };

    let tree = with_parser(language, |parser| parser.parse(text.as_bytes(), None))?;
    let Some(tree) = tree else {
        return Err(ChunkingError::ParserLoad {
            language: language.to_string(),
            reason: "parser returned no tree".to_string(),
        }
        .into());
    };

    let mut spans = Vec::new();
    walk(tree.root_node(), text, &node_kinds, &mut spans);
    spans.sort_by_key(|s| s.start_byte);
    Ok(spans)
}

#[cfg(not(feature = "cst"))]
pub fn parse_boundaries(_text: &str, language: &str) -> Result<Vec<BoundarySpan>> {
    Err(ChunkingError::ParserLoad {
        language: language.to_string(),
        reason: "crate built without the `cst` feature".to_string(),
    }
    .into())
}

#[cfg(feature = "cst")]
fn walk(
    node: Node,
    text: &str,
    node_kinds: &HashMap<&'static str, CodeKind>,
    spans: &mut Vec<BoundarySpan>,
) {
    if let Some(&kind) = node_kinds.get(node.kind()) {
        spans.push(BoundarySpan {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            boundary: Boundary::Code {
                kind,
                name: extract_name(node, text),
            },
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, text, node_kinds, spans);
    }
}

#[cfg(feature = "cst")]
fn extract_name(node: Node, text: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(
            child.kind(),
            "identifier" | "name" | "property_identifier" | "type_identifier" | "field_identifier"
        ) {
            return text.get(child.start_byte()..child.end_byte()).map(str::to_string);
        }
    }
    None
}

#[cfg(all(test, feature = "cst"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python_function_and_class() {
        let code = "def greet(name):\n    return name\n\nclass Greeter:\n    def hello(self):\n        pass\n";
        let spans = parse_boundaries(code, "python").unwrap();
        assert!(spans.iter().any(|s| matches!(
            s.boundary,
            Boundary::Code { kind: CodeKind::Function, .. }
        )));
        assert!(spans.iter().any(|s| matches!(
            s.boundary,
            Boundary::Code { kind: CodeKind::Class, .. }
        )));
    }

    #[test]
    fn test_parse_rust_function_name() {
        let code = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let spans = parse_boundaries(code, "rust").unwrap();
        let function_span = spans
            .iter()
            .find(|s| matches!(s.boundary, Boundary::Code { kind: CodeKind::Function, .. }))
            .expect("expected a function span");
        assert_eq!(function_span.boundary.heading_title(), None);
    }

    #[test]
    fn test_unknown_language_errors() {
        let err = parse_boundaries("whatever", "cobol");
        assert!(err.is_err());
    }

    #[test]
    fn test_nested_class_and_method_both_present() {
        let code = "class Box:\n    def open(self):\n        pass\n";
        let spans = parse_boundaries(code, "python").unwrap();
        assert_eq!(spans.len(), 2);
    }
}
