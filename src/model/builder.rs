//! Building a [`SourceModel`] from source units.

use std::path::Path;

use crate::error::{InjectorError, Result};
use crate::languages::LanguageRegistry;

use super::{
    find_node, relative_to, ClasspathIndex, CompilationUnit, FileWalker, ParsedFile, Parser,
    SourceModel, SourceUnit,
};

/// How unresolved imports are treated while building a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClasspathMode {
    /// Every import must resolve against the platform, the source set or the classpath.
    Strict,
    /// Unresolved imports are tolerated.
    NoClasspath,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSettings<'a> {
    pub mode: ClasspathMode,
    pub classpath: &'a ClasspathIndex,
    pub auto_imports: bool,
    pub compliance_level: u32,
}

/// The parsing capability used by the instrumenter.
pub trait ModelBuilder {
    fn build(&self, units: &[SourceUnit], settings: &ModelSettings<'_>) -> Result<SourceModel>;
}

pub struct TreeSitterModelBuilder {
    parser: Parser,
    walker: FileWalker,
}

impl TreeSitterModelBuilder {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(LanguageRegistry::new()),
            walker: FileWalker::new(LanguageRegistry::new()),
        }
    }

    fn parse_unit(&self, path: &Path, root: &Path, compliance_level: u32) -> Result<CompilationUnit> {
        let parsed = self.parser.parse_file(path)?;

        if let Some(node) = parsed.first_error() {
            let snippet: String = parsed.node_text(&node).chars().take(40).collect();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                format!("syntax error near `{}`", snippet.trim())
            };
            return Err(InjectorError::Parse {
                path: path.to_path_buf(),
                line: node.start_position().row + 1,
                message,
            });
        }

        check_compliance(&parsed, path, compliance_level)?;

        Ok(CompilationUnit::new(
            path.to_path_buf(),
            relative_to(path, root),
            parsed,
        ))
    }
}

impl Default for TreeSitterModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder for TreeSitterModelBuilder {
    fn build(&self, units: &[SourceUnit], settings: &ModelSettings<'_>) -> Result<SourceModel> {
        let mut parsed_units = Vec::new();
        for unit in units {
            for path in self.walker.walk(&unit.path)? {
                parsed_units.push(self.parse_unit(&path, &unit.root, settings.compliance_level)?);
            }
        }

        let model = SourceModel::new(parsed_units, settings.auto_imports);
        match settings.mode {
            ClasspathMode::Strict => check_imports(&model, settings.classpath)?,
            ClasspathMode::NoClasspath => log_unresolved_imports(&model, settings.classpath),
        }

        tracing::debug!("Built model with {} compilation units", model.len());
        Ok(model)
    }
}

fn check_compliance(parsed: &ParsedFile, path: &Path, level: u32) -> Result<()> {
    let gated: Vec<_> = parsed
        .grammar
        .feature_levels()
        .iter()
        .filter(|(_, _, required)| *required > level)
        .collect();
    if gated.is_empty() {
        return Ok(());
    }

    let found = find_node(parsed.root_node(), |node| {
        gated.iter().any(|(kind, _, _)| node.kind() == *kind)
    });
    match found {
        Some(node) => {
            let (_, feature, required) = gated
                .iter()
                .find(|(kind, _, _)| node.kind() == *kind)
                .copied()
                .copied()
                .unwrap_or(("", "language feature", level + 1));
            Err(InjectorError::Compliance {
                path: path.to_path_buf(),
                feature,
                required,
                level,
            })
        }
        None => Ok(()),
    }
}

fn unresolved_imports<'m>(
    model: &'m SourceModel,
    classpath: &ClasspathIndex,
) -> Vec<(&'m CompilationUnit, &'m super::ImportDecl)> {
    let types = model.declared_types();
    let packages = model.declared_packages();

    let mut unresolved = Vec::new();
    for unit in model.units() {
        let platform = unit.parsed.grammar.platform_packages();
        for import in &unit.imports {
            if platform.iter().any(|p| import.path.starts_with(p)) {
                continue;
            }
            let target = import.target();
            let resolved = types.contains(target)
                || classpath.has_class(target)
                || (import.wildcard
                    && !import.is_static
                    && (packages.contains(target) || classpath.has_package(target)));
            if !resolved {
                unresolved.push((unit, import));
            }
        }
    }
    unresolved
}

fn check_imports(model: &SourceModel, classpath: &ClasspathIndex) -> Result<()> {
    match unresolved_imports(model, classpath).first() {
        Some((unit, import)) => Err(InjectorError::UnresolvedImport {
            path: unit.path.clone(),
            import: import.path.clone(),
        }),
        None => Ok(()),
    }
}

fn log_unresolved_imports(model: &SourceModel, classpath: &ClasspathIndex) {
    for (unit, import) in unresolved_imports(model, classpath) {
        tracing::debug!(
            "Ignoring unresolved import {} at {}:{}",
            import.path,
            unit.path.display(),
            import.line
        );
    }
}
