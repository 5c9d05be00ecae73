//! Detector for method and constructor bodies.

use tree_sitter::StreamingIterator;

use crate::error::{InjectorError, Result};
use crate::instrument::IdMap;
use crate::model::{line_indent, CompilationUnit, UnitEdits};

use super::{DetectionEvent, Detector, EventKind, ListenerHandle, ListenerTable};

/// Fires [`EventKind::METHOD_ENTRY`] for every method that has a body and,
/// when enabled, [`EventKind::CONSTRUCTOR_ENTRY`] for every constructor.
pub struct MethodDetector {
    constructors: bool,
    emits: Vec<EventKind>,
    ids: Option<IdMap>,
    listeners: ListenerTable,
    detected: usize,
}

impl MethodDetector {
    pub fn new() -> Self {
        Self {
            constructors: false,
            emits: vec![EventKind::METHOD_ENTRY],
            ids: None,
            listeners: ListenerTable::new(),
            detected: 0,
        }
    }

    pub fn with_constructors(mut self, constructors: bool) -> Self {
        self.constructors = constructors;
        self.emits = if constructors {
            vec![EventKind::METHOD_ENTRY, EventKind::CONSTRUCTOR_ENTRY]
        } else {
            vec![EventKind::METHOD_ENTRY]
        };
        self
    }

    pub fn from_params(params: &toml::Table) -> Result<Self> {
        let constructors = match params.get("constructors") {
            None => false,
            Some(value) => value.as_bool().ok_or_else(|| {
                crate::instrument::config::ConfigError::InvalidParameter {
                    component: "method".to_string(),
                    param: "constructors".to_string(),
                    message: "expected a boolean".to_string(),
                }
            })?,
        };
        Ok(Self::new().with_constructors(constructors))
    }
}

impl Default for MethodDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for MethodDetector {
    fn name(&self) -> &str {
        "method"
    }

    fn emits(&self) -> &[EventKind] {
        &self.emits
    }

    fn set_id_map(&mut self, ids: IdMap) {
        self.ids = Some(ids);
    }

    fn add_listener(&mut self, kind: EventKind, listener: ListenerHandle) {
        self.listeners.add(kind, listener);
    }

    fn process(&mut self, unit: &CompilationUnit, edits: &mut UnitEdits) -> Result<()> {
        let ids = self.ids.clone().ok_or_else(|| InjectorError::Detector {
            detector: self.name().to_string(),
            message: "no id map configured".to_string(),
        })?;
        let query = unit
            .parsed
            .grammar
            .cached_methods_query()
            .ok_or_else(|| InjectorError::Detector {
                detector: self.name().to_string(),
                message: format!("no methods query for {}", unit.parsed.grammar.name()),
            })?;

        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, unit.parsed.root_node(), unit.parsed.source_bytes());

        while let Some(m) = matches.next() {
            let mut declaration = None;
            let mut kind = EventKind::METHOD_ENTRY;
            let mut name = None;
            let mut params = None;
            let mut body = None;

            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "method" => declaration = Some(capture.node),
                    "constructor" => {
                        declaration = Some(capture.node);
                        kind = EventKind::CONSTRUCTOR_ENTRY;
                    }
                    "name" => name = Some(unit.parsed.node_text(&capture.node)),
                    "params" => params = Some(capture.node),
                    "body" => body = Some(capture.node),
                    _ => {}
                }
            }

            let (Some(declaration), Some(name), Some(params), Some(body)) =
                (declaration, name, params, body)
            else {
                continue;
            };
            if kind == EventKind::CONSTRUCTOR_ENTRY && !self.constructors {
                continue;
            }

            let key = element_key(unit, declaration, name, params);
            let id = ids.get_or_create(&key);
            let indent = statement_indent(unit, declaration);
            let event = DetectionEvent {
                kind: &kind,
                unit,
                node: declaration,
                key: &key,
                id,
                insertion_offset: entry_offset(body),
                indent: &indent,
            };

            self.detected += 1;
            self.listeners.dispatch(&event, edits)?;
        }

        Ok(())
    }

    fn detected_count(&self) -> usize {
        self.detected
    }

    fn reset(&mut self) {
        self.detected = 0;
    }
}

/// `<package>.<Outer>.<Inner>.<name>(<param types>)`
fn element_key(
    unit: &CompilationUnit,
    declaration: tree_sitter::Node<'_>,
    name: &str,
    params: tree_sitter::Node<'_>,
) -> String {
    let mut owners = unit.enclosing_types(declaration);
    owners.reverse();

    let mut key = String::new();
    if let Some(package) = &unit.package {
        key.push_str(package);
        key.push('.');
    }
    for owner in owners {
        key.push_str(&owner);
        key.push('.');
    }
    key.push_str(name);
    key.push('(');
    key.push_str(&unit.parameter_types(params).join(","));
    key.push(')');
    key
}

/// Just inside the opening brace, or after an explicit `this(...)`/`super(...)` call.
fn entry_offset(body: tree_sitter::Node<'_>) -> usize {
    if body.kind() == "constructor_body" {
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|c| !c.kind().ends_with("comment"));
        if let Some(first) = first {
            if first.kind() == "explicit_constructor_invocation" {
                return first.end_byte();
            }
        }
    }
    body.start_byte() + 1
}

fn statement_indent(unit: &CompilationUnit, declaration: tree_sitter::Node<'_>) -> String {
    let base = line_indent(unit.source(), declaration.start_byte());
    let step = if base.contains('\t') { "\t" } else { "    " };
    format!("{}{}", base, step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::LanguageRegistry;
    use crate::model::edits::apply_edits;
    use crate::model::Parser;
    use std::path::PathBuf;

    fn unit(source: &str) -> CompilationUnit {
        let parser = Parser::new(LanguageRegistry::new());
        let grammar = LanguageRegistry::new().get_by_name("java").unwrap();
        let parsed = parser.parse_source(source, grammar).unwrap();
        CompilationUnit::new(PathBuf::from("/src/Shop.java"), PathBuf::from("Shop.java"), parsed)
    }

    const SHOP: &str = r#"package com.acme;

public class Shop {
    public Shop() {
        this(1);
    }

    Shop(int size) {
    }

    public int total(int[] prices, String... tags) {
        return 0;
    }

    abstract static class Item {
        abstract void describe();

        void print() { System.out.println("item"); }
    }
}
"#;

    fn detector() -> MethodDetector {
        let mut detector = MethodDetector::new();
        detector.set_id_map(IdMap::new());
        detector
    }

    #[test]
    fn test_detects_methods_with_bodies() {
        let unit = unit(SHOP);
        let ids = IdMap::new();
        let mut detector = MethodDetector::new();
        detector.set_id_map(ids.clone());
        let mut edits = UnitEdits::new(false);

        detector.process(&unit, &mut edits).unwrap();

        assert_eq!(detector.detected_count(), 2);
        assert_eq!(
            ids.entries(),
            vec![
                (1, "com.acme.Shop.total(int[],String...)".to_string()),
                (2, "com.acme.Shop.Item.print()".to_string()),
            ]
        );
    }

    const NESTED: &str = r#"package p;

enum E {
    A { void run() {} },
    B { void run() {} };

    void run() {}
}

class C {
    void start() {
        Runnable first = new Runnable() { public void run() {} };
        Runnable second = new Runnable() { public void run() {} };
    }

    void local(int n) {
        class Task { void run() {} }
    }

    void other() {
        class Task { void run() {} }
    }
}
"#;

    #[test]
    fn test_keys_distinct_for_anonymous_enum_constant_and_local_classes() {
        let unit = unit(NESTED);
        let ids = IdMap::new();
        let mut detector = MethodDetector::new();
        detector.set_id_map(ids.clone());
        let mut edits = UnitEdits::new(false);

        detector.process(&unit, &mut edits).unwrap();

        assert_eq!(detector.detected_count(), 10);
        assert_eq!(ids.len(), detector.detected_count());

        let mut keys: Vec<String> = ids.entries().into_iter().map(|(_, key)| key).collect();
        keys.sort();
        let mut expected = vec![
            "p.E.A.run()",
            "p.E.B.run()",
            "p.E.run()",
            "p.C.start()",
            "p.C.anonymous$1.run()",
            "p.C.anonymous$2.run()",
            "p.C.local(int)",
            "p.C.local(int).Task.run()",
            "p.C.other()",
            "p.C.other().Task.run()",
        ];
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_detects_constructors_when_enabled() {
        let unit = unit(SHOP);
        let ids = IdMap::new();
        let mut detector = MethodDetector::new().with_constructors(true);
        detector.set_id_map(ids.clone());
        let mut edits = UnitEdits::new(false);

        detector.process(&unit, &mut edits).unwrap();

        assert_eq!(detector.detected_count(), 4);
        assert_eq!(ids.get("com.acme.Shop.Shop()"), Some(1));
        assert_eq!(ids.get("com.acme.Shop.Shop(int)"), Some(2));
        assert_eq!(detector.emits().len(), 2);
    }

    #[test]
    fn test_reset_clears_count_but_not_ids() {
        let unit = unit(SHOP);
        let mut detector = detector();
        let mut edits = UnitEdits::new(false);

        detector.process(&unit, &mut edits).unwrap();
        detector.reset();
        assert_eq!(detector.detected_count(), 0);

        detector.process(&unit, &mut edits).unwrap();
        assert_eq!(detector.detected_count(), 2);
    }

    #[test]
    fn test_process_without_id_map_fails() {
        let unit = unit(SHOP);
        let mut detector = MethodDetector::new();
        let mut edits = UnitEdits::new(false);
        assert!(matches!(
            detector.process(&unit, &mut edits),
            Err(InjectorError::Detector { .. })
        ));
    }

    #[test]
    fn test_entry_offsets() {
        let source = "class A {\n    A() {\n        super();\n    }\n    void m() {}\n}\n";
        let unit = unit(source);
        let query = unit.parsed.grammar.cached_methods_query().unwrap();
        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, unit.parsed.root_node(), unit.parsed.source_bytes());

        let mut offsets = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if query.capture_names()[capture.index as usize] == "body" {
                    offsets.push(entry_offset(capture.node));
                }
            }
        }

        let edits: Vec<_> = offsets
            .into_iter()
            .map(|offset| crate::model::TextEdit {
                offset,
                text: "#".to_string(),
            })
            .collect();
        assert_eq!(
            apply_edits(source, &edits),
            "class A {\n    A() {\n        super();#\n    }\n    void m() {#}\n}\n"
        );
    }

    #[test]
    fn test_statement_indent_follows_declaration() {
        let unit = unit("class A {\n\tvoid m() {}\n}\n");
        let method = crate::model::find_node(unit.parsed.root_node(), |n| n.kind() == "method_declaration")
            .unwrap();
        assert_eq!(statement_indent(&unit, method), "\t\t");
    }

    #[test]
    fn test_from_params() {
        let mut params = toml::Table::new();
        params.insert("constructors".to_string(), toml::Value::Boolean(true));
        let detector = MethodDetector::from_params(&params).unwrap();
        assert_eq!(detector.emits(), &[EventKind::METHOD_ENTRY, EventKind::CONSTRUCTOR_ENTRY]);

        params.insert("constructors".to_string(), toml::Value::String("yes".to_string()));
        assert!(MethodDetector::from_params(&params).is_err());
    }
}
