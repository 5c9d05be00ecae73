use std::path::Path;
use std::sync::Arc;

use crate::error::{InjectorError, Result};
use crate::languages::{LanguageGrammar, LanguageRegistry};

pub struct Parser {
    registry: LanguageRegistry,
}

impl Parser {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedFile> {
        let grammar = self.registry.get_for_file(path).ok_or_else(|| InjectorError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: "unsupported source language".to_string(),
        })?;

        let source = std::fs::read_to_string(path)?;
        self.parse_source(&source, grammar).map_err(|e| match e {
            InjectorError::Parse { line, message, .. } => InjectorError::Parse {
                path: path.to_path_buf(),
                line,
                message,
            },
            other => other,
        })
    }

    pub fn parse_source(&self, source: &str, grammar: Arc<dyn LanguageGrammar>) -> Result<ParsedFile> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar.language())
            .map_err(|e| parse_failure(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_failure("Failed to parse source".to_string()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_string(),
            grammar,
        })
    }
}

fn parse_failure(message: String) -> InjectorError {
    InjectorError::Parse {
        path: Default::default(),
        line: 0,
        message,
    }
}

pub struct ParsedFile {
    pub tree: tree_sitter::Tree,
    pub source: String,
    pub grammar: Arc<dyn LanguageGrammar>,
}

impl ParsedFile {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn node_text(&self, node: &tree_sitter::Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }

    /// First ERROR or MISSING node in document order, if the tree has any.
    pub fn first_error(&self) -> Option<tree_sitter::Node<'_>> {
        let root = self.root_node();
        if !root.has_error() {
            return None;
        }

        let mut cursor = root.walk();
        loop {
            let node = cursor.node();
            if node.is_error() || node.is_missing() {
                return Some(node);
            }
            if node.has_error() && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Some(root);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_parser() -> Parser {
        Parser::new(LanguageRegistry::new())
    }

    fn java() -> Arc<dyn LanguageGrammar> {
        LanguageRegistry::new().get_by_name("java").unwrap()
    }

    #[test]
    fn test_parse_source_java() {
        let parser = create_parser();
        let source = r#"
public class Main {
    public static void main(String[] args) {
        System.out.println("Hello");
    }
}
"#;

        let parsed = parser.parse_source(source, java()).unwrap();
        assert_eq!(parsed.grammar.name(), "java");
        assert_eq!(parsed.root_node().kind(), "program");
        assert!(parsed.first_error().is_none());
    }

    #[test]
    fn test_parse_source_empty() {
        let parser = create_parser();
        let parsed = parser.parse_source("", java()).unwrap();
        assert_eq!(parsed.source, "");
        assert!(parsed.first_error().is_none());
    }

    #[test]
    fn test_parsed_file_node_text() {
        let parser = create_parser();
        let source = "class A {}";
        let parsed = parser.parse_source(source, java()).unwrap();

        let root = parsed.root_node();
        assert_eq!(parsed.node_text(&root), source);
        assert_eq!(parsed.source_bytes(), source.as_bytes());
    }

    #[test]
    fn test_first_error_on_malformed_source() {
        let parser = create_parser();
        let source = "class A {\n    void m() {\n        int x = ;\n    }\n}\n";
        let parsed = parser.parse_source(source, java()).unwrap();

        let error = parsed.first_error().expect("malformed source must report an error");
        assert_eq!(error.start_position().row, 2);
    }

    #[test]
    fn test_parse_file_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();

        let err = create_parser().parse_file(&path).err().unwrap();
        assert!(matches!(err, InjectorError::Parse { .. }));
    }

    #[test]
    fn test_parse_file_reads_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("A.java");
        fs::write(&path, "class A { void m() {} }").unwrap();

        let parsed = create_parser().parse_file(&path).unwrap();
        assert_eq!(parsed.source, "class A { void m() {} }");
    }
}
