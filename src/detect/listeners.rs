use crate::error::{InjectorError, Result};
use crate::instrument::config::ConfigError;
use crate::model::{CompilationUnit, UnitEdits};

use super::{DetectionEvent, DetectionListener};

/// Inserts `<Logger>.<method>(<id>);` as the first statement of the detected element.
#[derive(Debug, Clone)]
pub struct EntryLoggerListener {
    logger_class: String,
    method: String,
}

impl EntryLoggerListener {
    pub const DEFAULT_METHOD: &'static str = "log";

    pub fn new(logger_class: impl Into<String>) -> Self {
        Self {
            logger_class: logger_class.into(),
            method: Self::DEFAULT_METHOD.to_string(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn logger_class(&self) -> &str {
        &self.logger_class
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn from_params(params: &toml::Table) -> Result<Self> {
        let class = string_param(params, "class")?.ok_or_else(|| ConfigError::MissingParameter {
            component: "entry_logger".to_string(),
            param: "class".to_string(),
        })?;
        let mut listener = Self::new(class);
        if let Some(method) = string_param(params, "method")? {
            listener = listener.with_method(method);
        }
        Ok(listener)
    }

    /// Whether the simple name of the logger class would be shadowed in `unit`.
    fn clashes(&self, unit: &CompilationUnit) -> bool {
        let simple = self.logger_class.rsplit('.').next().unwrap_or(&self.logger_class);
        let declared = unit.declares_simple_name(simple)
            && !unit.declared_types.iter().any(|t| t == &self.logger_class);
        let imported = unit.imports.iter().any(|import| {
            !import.is_static
                && !import.wildcard
                && import.path != self.logger_class
                && import.path.rsplit('.').next() == Some(simple)
        });
        declared || imported
    }
}

fn string_param(params: &toml::Table, name: &str) -> Result<Option<String>> {
    match params.get(name) {
        None => Ok(None),
        Some(toml::Value::String(value)) if !value.trim().is_empty() => Ok(Some(value.clone())),
        Some(_) => Err(ConfigError::InvalidParameter {
            component: "entry_logger".to_string(),
            param: name.to_string(),
            message: "expected a non-empty string".to_string(),
        }
        .into()),
    }
}

impl DetectionListener for EntryLoggerListener {
    fn name(&self) -> &str {
        "entry_logger"
    }

    fn on_event(&self, event: &DetectionEvent<'_>, edits: &mut UnitEdits) -> Result<()> {
        if !event.unit.source().is_char_boundary(event.insertion_offset) {
            return Err(InjectorError::Listener {
                listener: self.name().to_string(),
                message: format!(
                    "insertion offset {} for `{}` is outside {}",
                    event.insertion_offset,
                    event.key,
                    event.unit.relative_path.display()
                ),
            });
        }
        let target = if self.clashes(event.unit) {
            self.logger_class.clone()
        } else {
            edits.reference_type(&self.logger_class)
        };
        edits.insert(
            event.insertion_offset,
            format!("\n{}{}.{}({});", event.indent, target, self.method, event.id),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::EventKind;
    use crate::languages::LanguageRegistry;
    use crate::model::printer::render;
    use crate::model::Parser;
    use std::path::PathBuf;

    fn unit(source: &str) -> CompilationUnit {
        let parser = Parser::new(LanguageRegistry::new());
        let grammar = LanguageRegistry::new().get_by_name("java").unwrap();
        let parsed = parser.parse_source(source, grammar).unwrap();
        CompilationUnit::new(PathBuf::from("/src/com/A.java"), PathBuf::from("com/A.java"), parsed)
    }

    fn fire(listener: &EntryLoggerListener, unit: &CompilationUnit, edits: &mut UnitEdits) {
        let offset = unit.source().find("m() {").unwrap() + "m() {".len();
        let event = DetectionEvent {
            kind: &EventKind::METHOD_ENTRY,
            unit,
            node: unit.parsed.root_node(),
            key: "com.A.m()",
            id: 7,
            insertion_offset: offset,
            indent: "        ",
        };
        listener.on_event(&event, edits).unwrap();
    }

    #[test]
    fn test_inserts_call_with_import() {
        let unit = unit("package com;\n\nclass A {\n    void m() {\n    }\n}\n");
        let listener = EntryLoggerListener::new("org.trace.Trace").with_method("hit");
        let mut edits = UnitEdits::new(true);
        fire(&listener, &unit, &mut edits);

        assert_eq!(
            render(&unit, &edits),
            "package com;\n\nimport org.trace.Trace;\n\nclass A {\n    void m() {\n        Trace.hit(7);\n    }\n}\n"
        );
    }

    #[test]
    fn test_uses_qualified_name_without_auto_imports() {
        let unit = unit("package com;\nclass A {\n    void m() {}\n}\n");
        let listener = EntryLoggerListener::new("org.trace.Trace");
        let mut edits = UnitEdits::new(false);
        fire(&listener, &unit, &mut edits);

        assert_eq!(edits.edits()[0].text, "\n        org.trace.Trace.log(7);");
        assert!(edits.imports().is_empty());
    }

    #[test]
    fn test_uses_qualified_name_on_clash() {
        let unit = unit("package com;\nimport other.Trace;\nclass A {\n    void m() {}\n}\n");
        let listener = EntryLoggerListener::new("org.trace.Trace");
        let mut edits = UnitEdits::new(true);
        fire(&listener, &unit, &mut edits);

        assert_eq!(edits.edits()[0].text, "\n        org.trace.Trace.log(7);");
        assert!(edits.imports().is_empty());
    }

    #[test]
    fn test_rejects_offset_outside_source() {
        let unit = unit("package com;\nclass A {\n    void m() {}\n}\n");
        let listener = EntryLoggerListener::new("org.trace.Trace");
        let mut edits = UnitEdits::new(true);
        let event = DetectionEvent {
            kind: &EventKind::METHOD_ENTRY,
            unit: &unit,
            node: unit.parsed.root_node(),
            key: "com.A.m()",
            id: 7,
            insertion_offset: unit.source().len() + 1,
            indent: "        ",
        };

        let err = listener.on_event(&event, &mut edits).err().unwrap();
        assert!(matches!(err, InjectorError::Listener { ref listener, .. } if listener == "entry_logger"));
        assert!(edits.edits().is_empty());
    }

    #[test]
    fn test_from_params() {
        let params: toml::Table = toml::from_str("class = \"org.trace.Trace\"\nmethod = \"enter\"").unwrap();
        let listener = EntryLoggerListener::from_params(&params).unwrap();
        assert_eq!(listener.logger_class(), "org.trace.Trace");
        assert_eq!(listener.method(), "enter");

        let missing = toml::Table::new();
        assert!(EntryLoggerListener::from_params(&missing).is_err());
    }
}
