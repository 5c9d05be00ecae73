//! In-memory source model: parsing, import/type extraction, edits and print-back.
//!
//! A [`SourceModel`] is owned by exactly one injection pass. It is built by a
//! [`ModelBuilder`], handed to the detectors (which record edits through their
//! listeners) and finally written out by the [`SourcePrinter`].

pub mod builder;
pub mod classpath;
pub mod edits;
pub mod parser;
pub mod printer;
pub mod walker;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tree_sitter::StreamingIterator;

pub use builder::{ClasspathMode, ModelBuilder, ModelSettings, TreeSitterModelBuilder};
pub use classpath::ClasspathIndex;
pub use edits::{TextEdit, UnitEdits};
pub use parser::{ParsedFile, Parser};
pub use printer::SourcePrinter;
pub use walker::FileWalker;

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// A source root (or a single file below it) handed to the injection routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Root the output layout is computed against.
    pub root: PathBuf,
    /// Either `root` itself or one file below it.
    pub path: PathBuf,
}

impl SourceUnit {
    pub fn root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            path: root.clone(),
            root,
        }
    }

    pub fn file(root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub path: String,
    pub is_static: bool,
    pub wildcard: bool,
    pub line: usize,
}

impl ImportDecl {
    fn parse(text: &str, line: usize) -> Option<Self> {
        let body = text.trim().strip_prefix("import")?.trim();
        let body = body.trim_end_matches(';').trim();
        let (is_static, body) = match body.strip_prefix("static") {
            Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim()),
            _ => (false, body),
        };
        let path: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let (path, wildcard) = match path.strip_suffix(".*") {
            Some(stripped) => (stripped.to_string(), true),
            None => (path, false),
        };
        Some(Self {
            path,
            is_static,
            wildcard,
            line,
        })
    }

    /// The type or package this import needs on the classpath.
    pub fn target(&self) -> &str {
        if self.is_static && !self.wildcard {
            self.path.rsplit_once('.').map(|(owner, _)| owner).unwrap_or(&self.path)
        } else {
            &self.path
        }
    }
}

/// One parsed compilation unit.
pub struct CompilationUnit {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub parsed: ParsedFile,
    pub package: Option<String>,
    pub imports: Vec<ImportDecl>,
    /// Fully qualified names of every type declared in this unit.
    pub declared_types: Vec<String>,
    /// Byte offset right after the package declaration or the last import.
    pub import_anchor: usize,
}

impl CompilationUnit {
    pub fn new(path: PathBuf, relative_path: PathBuf, parsed: ParsedFile) -> Self {
        let mut unit = Self {
            path,
            relative_path,
            parsed,
            package: None,
            imports: Vec::new(),
            declared_types: Vec::new(),
            import_anchor: 0,
        };
        unit.extract_imports();
        unit.extract_types();
        unit
    }

    fn extract_imports(&mut self) {
        let Some(query) = self.parsed.grammar.cached_imports_query() else {
            return;
        };

        let mut package = None;
        let mut imports = Vec::new();
        let mut anchor = 0;

        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, self.parsed.root_node(), self.parsed.source_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                match query.capture_names()[capture.index as usize] {
                    "package_path" => package = Some(self.parsed.node_text(&node).to_string()),
                    "package" => anchor = anchor.max(node.end_byte()),
                    "import" => {
                        anchor = anchor.max(node.end_byte());
                        let line = node.start_position().row + 1;
                        if let Some(decl) = ImportDecl::parse(self.parsed.node_text(&node), line) {
                            imports.push(decl);
                        }
                    }
                    _ => {}
                }
            }
        }

        self.package = package;
        self.imports = imports;
        self.import_anchor = anchor;
    }

    fn extract_types(&mut self) {
        let Some(query) = self.parsed.grammar.cached_types_query() else {
            return;
        };

        let mut types = Vec::new();
        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, self.parsed.root_node(), self.parsed.source_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if query.capture_names()[capture.index as usize] == "name" {
                    continue;
                }
                if let Some(name) = self.qualified_type_name(capture.node) {
                    types.push(name);
                }
            }
        }
        self.declared_types = types;
    }

    /// Package-qualified, dot-separated name of a type declaration node.
    pub fn qualified_type_name(&self, node: tree_sitter::Node<'_>) -> Option<String> {
        let mut names = vec![self.declaration_name(node)?];
        names.extend(self.enclosing_types(node));
        names.reverse();
        let nested = names.join(".");
        Some(match &self.package {
            Some(package) => format!("{}.{}", package, nested),
            None => nested,
        })
    }

    /// Names of the types enclosing `node`, innermost first.
    ///
    /// Anonymous classes are numbered per enclosing type in source order
    /// (`anonymous$1`, `anonymous$2`), enum constant bodies take the constant
    /// name, and local classes are preceded by the signature of the method
    /// declaring them (`m(int).Local`).
    pub fn enclosing_types(&self, node: tree_sitter::Node<'_>) -> Vec<String> {
        let mut names = Vec::new();
        let mut local = false;
        let mut current = node.parent();
        while let Some(parent) = current {
            let kind = parent.kind();
            if TYPE_DECLARATIONS.contains(&kind) {
                if let Some(name) = self.declaration_name(parent) {
                    names.push(name);
                }
                local = is_local_declaration(parent);
            } else if local && (kind == "method_declaration" || kind == "constructor_declaration") {
                names.push(self.method_signature(parent));
                local = false;
            } else if kind == "class_body" {
                match parent.parent() {
                    Some(owner) if owner.kind() == "object_creation_expression" => {
                        names.push(format!("anonymous${}", anonymous_ordinal(owner)));
                        local = false;
                    }
                    Some(owner) if owner.kind() == "enum_constant" => {
                        names.push(
                            self.declaration_name(owner)
                                .unwrap_or_else(|| "anonymous".to_string()),
                        );
                        local = false;
                    }
                    _ => {}
                }
            }
            current = parent.parent();
        }
        names
    }

    /// `<name>(<param types>)` of a method or constructor declaration.
    pub fn method_signature(&self, declaration: tree_sitter::Node<'_>) -> String {
        let name = declaration
            .child_by_field_name("name")
            .map(|n| self.parsed.node_text(&n))
            .unwrap_or_default();
        let types = declaration
            .child_by_field_name("parameters")
            .map(|params| self.parameter_types(params))
            .unwrap_or_default();
        format!("{}({})", name, types.join(","))
    }

    /// Parameter types of a `formal_parameters` node with whitespace removed.
    /// Varargs are written `T...`.
    pub fn parameter_types(&self, params: tree_sitter::Node<'_>) -> Vec<String> {
        let mut types = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let text = match param.kind() {
                "formal_parameter" => param
                    .child_by_field_name("type")
                    .map(|t| self.parsed.node_text(&t).to_string())
                    .unwrap_or_default(),
                "spread_parameter" => {
                    let mut inner = param.walk();
                    let ty = param
                        .named_children(&mut inner)
                        .find(|c| c.kind() != "modifiers" && c.kind() != "variable_declarator")
                        .map(|t| self.parsed.node_text(&t).to_string())
                        .unwrap_or_default();
                    format!("{}...", ty)
                }
                _ => continue,
            };
            types.push(text.chars().filter(|c| !c.is_whitespace()).collect());
        }
        types
    }

    fn declaration_name(&self, node: tree_sitter::Node<'_>) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| self.parsed.node_text(&n).to_string())
    }

    pub fn source(&self) -> &str {
        &self.parsed.source
    }

    /// Simple names of the types declared at any depth in this unit.
    pub fn declares_simple_name(&self, simple: &str) -> bool {
        self.declared_types
            .iter()
            .any(|t| t.rsplit('.').next() == Some(simple))
    }
}

/// The parsed units of one injection pass together with their pending edits.
pub struct SourceModel {
    units: Vec<CompilationUnit>,
    edits: Vec<UnitEdits>,
}

impl SourceModel {
    pub fn new(units: Vec<CompilationUnit>, auto_imports: bool) -> Self {
        let edits = units.iter().map(|_| UnitEdits::new(auto_imports)).collect();
        Self { units, edits }
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit_mut(&mut self, index: usize) -> Option<(&CompilationUnit, &mut UnitEdits)> {
        let unit = self.units.get(index)?;
        let edits = self.edits.get_mut(index)?;
        Some((unit, edits))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompilationUnit, &UnitEdits)> {
        self.units.iter().zip(self.edits.iter())
    }

    /// Every type declared anywhere in the model.
    pub fn declared_types(&self) -> HashSet<&str> {
        self.units
            .iter()
            .flat_map(|u| u.declared_types.iter().map(String::as_str))
            .collect()
    }

    pub fn declared_packages(&self) -> HashSet<&str> {
        self.units.iter().filter_map(|u| u.package.as_deref()).collect()
    }
}

/// Type declarations outside a type body are local classes.
fn is_local_declaration(node: tree_sitter::Node<'_>) -> bool {
    !matches!(
        node.parent().map(|p| p.kind()),
        None | Some(
            "program"
                | "class_body"
                | "interface_body"
                | "enum_body"
                | "enum_body_declarations"
                | "annotation_type_body"
        )
    )
}

/// Whether `node` is an instance creation with a class body.
fn is_anonymous_creation(node: tree_sitter::Node<'_>) -> bool {
    if node.kind() != "object_creation_expression" {
        return false;
    }
    let mut cursor = node.walk();
    let has_body = node.named_children(&mut cursor).any(|c| c.kind() == "class_body");
    has_body
}

/// The nearest type (named, anonymous or enum constant body) containing `node`.
fn type_scope(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if TYPE_DECLARATIONS.contains(&parent.kind()) {
            return Some(parent);
        }
        if parent.kind() == "class_body"
            && parent
                .parent()
                .is_some_and(|p| p.kind() == "object_creation_expression" || p.kind() == "enum_constant")
        {
            return Some(parent);
        }
        current = parent.parent();
    }
    None
}

/// 1-based position of an anonymous class among those of its enclosing type.
fn anonymous_ordinal(creation: tree_sitter::Node<'_>) -> usize {
    let scope = type_scope(creation);
    let mut root = creation;
    while let Some(parent) = root.parent() {
        root = parent;
    }
    let search = scope.unwrap_or(root);

    let mut ordinal = 0;
    let mut cursor = search.walk();
    loop {
        let node = cursor.node();
        if is_anonymous_creation(node) && type_scope(node) == scope {
            ordinal += 1;
            if node == creation {
                return ordinal;
            }
        }
        if node.start_byte() <= creation.start_byte() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return ordinal.max(1);
            }
        }
    }
}

/// Depth-first search for the first node matching `predicate`.
pub(crate) fn find_node<'t>(
    root: tree_sitter::Node<'t>,
    mut predicate: impl FnMut(&tree_sitter::Node<'t>) -> bool,
) -> Option<tree_sitter::Node<'t>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if predicate(&node) {
            return Some(node);
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

/// Leading whitespace of the line containing `offset`.
pub(crate) fn line_indent(source: &str, offset: usize) -> &str {
    let line_start = source[..offset.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let line = &source[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

pub(crate) fn relative_to(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
        _ => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::LanguageRegistry;

    fn unit(source: &str) -> CompilationUnit {
        let parser = Parser::new(LanguageRegistry::new());
        let grammar = LanguageRegistry::new().get_by_name("java").unwrap();
        let parsed = parser.parse_source(source, grammar).unwrap();
        CompilationUnit::new(PathBuf::from("/src/A.java"), PathBuf::from("A.java"), parsed)
    }

    #[test]
    fn test_import_decl_parse() {
        let single = ImportDecl::parse("import java.util.List;", 1).unwrap();
        assert_eq!(single.path, "java.util.List");
        assert!(!single.is_static && !single.wildcard);

        let wildcard = ImportDecl::parse("import org.acme.*;", 2).unwrap();
        assert_eq!(wildcard.path, "org.acme");
        assert!(wildcard.wildcard);
        assert_eq!(wildcard.target(), "org.acme");

        let member = ImportDecl::parse("import static org.acme.Util.helper;", 3).unwrap();
        assert!(member.is_static);
        assert_eq!(member.target(), "org.acme.Util");
    }

    #[test]
    fn test_unit_extracts_package_imports_and_types() {
        let source = r#"package com.acme;

import java.util.List;
import org.lib.Helper;

public class Shop {
    static class Cart {}
    interface Pricing {}
}
"#;
        let unit = unit(source);

        assert_eq!(unit.package.as_deref(), Some("com.acme"));
        assert_eq!(unit.imports.len(), 2);
        assert_eq!(unit.imports[1].path, "org.lib.Helper");
        assert_eq!(unit.imports[1].line, 4);
        assert_eq!(&source[..unit.import_anchor], "package com.acme;\n\nimport java.util.List;\nimport org.lib.Helper;");
        assert!(unit.declared_types.contains(&"com.acme.Shop".to_string()));
        assert!(unit.declared_types.contains(&"com.acme.Shop.Cart".to_string()));
        assert!(unit.declared_types.contains(&"com.acme.Shop.Pricing".to_string()));
        assert!(unit.declares_simple_name("Cart"));
    }

    #[test]
    fn test_unit_default_package() {
        let unit = unit("class Lonely {}\n");
        assert!(unit.package.is_none());
        assert_eq!(unit.import_anchor, 0);
        assert_eq!(unit.declared_types, vec!["Lonely".to_string()]);
    }

    #[test]
    fn test_line_indent() {
        let source = "class A {\n    void m() {}\n\tint x;\n}";
        let method = source.find("void").unwrap();
        assert_eq!(line_indent(source, method), "    ");
        let field = source.find("int").unwrap();
        assert_eq!(line_indent(source, field), "\t");
        assert_eq!(line_indent(source, 0), "");
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/p/src/main/java");
        assert_eq!(
            relative_to(Path::new("/p/src/main/java/com/A.java"), root),
            PathBuf::from("com/A.java")
        );
        assert_eq!(relative_to(Path::new("/elsewhere/B.java"), root), PathBuf::from("B.java"));
    }
}
