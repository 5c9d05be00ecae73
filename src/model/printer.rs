use std::fs;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::error::Result;

use super::edits::apply_edits;
use super::{CompilationUnit, SourceModel, TextEdit, UnitEdits};

/// Serializes a model back to source text below an output root.
pub struct SourcePrinter {
    output_root: PathBuf,
}

impl SourcePrinter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn output_path(&self, unit: &CompilationUnit) -> PathBuf {
        self.output_root.join(&unit.relative_path)
    }

    /// Writes every unit of the model. Returns the number of files whose
    /// content actually changed on disk.
    pub fn print(&self, model: &SourceModel) -> Result<usize> {
        let mut written = 0;
        for (unit, edits) in model.iter() {
            let rendered = render(unit, edits);
            let target = self.output_path(unit);

            if let Ok(existing) = fs::read(&target) {
                if xxh3_64(&existing) == xxh3_64(rendered.as_bytes()) {
                    tracing::debug!("Unchanged output {}", target.display());
                    continue;
                }
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, rendered)?;
            written += 1;
        }
        Ok(written)
    }
}

/// Source text of `unit` with its pending edits and missing imports applied.
pub fn render(unit: &CompilationUnit, edits: &UnitEdits) -> String {
    let mut all: Vec<TextEdit> = Vec::with_capacity(edits.edits().len() + 1);

    if edits.auto_imports() {
        let missing: Vec<&str> = edits
            .imports()
            .iter()
            .map(String::as_str)
            .filter(|name| needs_import(unit, name))
            .collect();
        if !missing.is_empty() {
            all.push(import_edit(unit, &missing));
        }
    }
    all.extend(edits.edits().iter().cloned());

    apply_edits(unit.source(), &all)
}

fn needs_import(unit: &CompilationUnit, qualified_name: &str) -> bool {
    let (package, _) = match qualified_name.rsplit_once('.') {
        Some(split) => split,
        None => return false,
    };
    if package == "java.lang" || unit.package.as_deref() == Some(package) {
        return false;
    }
    !unit.imports.iter().any(|import| {
        !import.is_static
            && ((!import.wildcard && import.path == qualified_name)
                || (import.wildcard && import.path == package))
    })
}

fn import_edit(unit: &CompilationUnit, names: &[&str]) -> TextEdit {
    let block: String = names
        .iter()
        .map(|name| format!("import {};", name))
        .collect::<Vec<_>>()
        .join("\n");

    let text = if unit.import_anchor == 0 {
        format!("{}\n\n", block)
    } else if unit.imports.is_empty() {
        format!("\n\n{}", block)
    } else {
        format!("\n{}", block)
    };

    TextEdit {
        offset: unit.import_anchor,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::LanguageRegistry;
    use crate::model::Parser;
    use tempfile::TempDir;

    fn unit(relative: &str, source: &str) -> CompilationUnit {
        let parser = Parser::new(LanguageRegistry::new());
        let grammar = LanguageRegistry::new().get_by_name("java").unwrap();
        let parsed = parser.parse_source(source, grammar).unwrap();
        CompilationUnit::new(PathBuf::from("/src").join(relative), PathBuf::from(relative), parsed)
    }

    #[test]
    fn test_render_adds_import_after_package() {
        let unit = unit("com/A.java", "package com;\n\nclass A {}\n");
        let mut edits = UnitEdits::new(true);
        let name = edits.reference_type("org.log.Tracer");
        assert_eq!(name, "Tracer");

        let out = render(&unit, &edits);
        assert_eq!(out, "package com;\n\nimport org.log.Tracer;\n\nclass A {}\n");
    }

    #[test]
    fn test_render_appends_after_last_import() {
        let unit = unit("com/A.java", "package com;\n\nimport java.util.List;\n\nclass A {}\n");
        let mut edits = UnitEdits::new(true);
        edits.reference_type("org.log.Tracer");

        let out = render(&unit, &edits);
        assert_eq!(
            out,
            "package com;\n\nimport java.util.List;\nimport org.log.Tracer;\n\nclass A {}\n"
        );
    }

    #[test]
    fn test_render_skips_present_and_same_package_imports() {
        let unit = unit("com/A.java", "package com;\nimport org.log.*;\nclass A {}\n");
        let mut edits = UnitEdits::new(true);
        edits.reference_type("org.log.Tracer");
        edits.reference_type("com.Helper");
        edits.reference_type("java.lang.System");

        assert_eq!(render(&unit, &edits), unit.source());
    }

    #[test]
    fn test_render_default_package() {
        let unit = unit("A.java", "class A {}\n");
        let mut edits = UnitEdits::new(true);
        edits.reference_type("org.log.Tracer");

        assert_eq!(render(&unit, &edits), "import org.log.Tracer;\n\nclass A {}\n");
    }

    #[test]
    fn test_print_writes_and_skips_identical_output() {
        let temp_dir = TempDir::new().unwrap();
        let unit = unit("com/A.java", "package com;\nclass A {}\n");
        let model = SourceModel::new(vec![unit], false);

        let printer = SourcePrinter::new(temp_dir.path());
        assert_eq!(printer.print(&model).unwrap(), 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("com/A.java")).unwrap(),
            "package com;\nclass A {}\n"
        );

        assert_eq!(printer.print(&model).unwrap(), 0);
    }
}
