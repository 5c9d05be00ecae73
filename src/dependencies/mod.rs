//! Module for dependency resolution.
//!
//! This module turns a project's build descriptor into the compile classpath
//! handed to the model builder:
//! - Parsing build descriptors (pom.xml)
//! - Locating dependency archives in the local repository
//! - Merging manual classpath overrides

pub mod maven;
pub mod resolver;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Maven dependency scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Compile,
    Provided,
    Runtime,
    Test,
    System,
    Import,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Compile => "compile",
            Scope::Provided => "provided",
            Scope::Runtime => "runtime",
            Scope::Test => "test",
            Scope::System => "system",
            Scope::Import => "import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "compile" => Some(Scope::Compile),
            "provided" => Some(Scope::Provided),
            "runtime" => Some(Scope::Runtime),
            "test" => Some(Scope::Test),
            "system" => Some(Scope::System),
            "import" => Some(Scope::Import),
            _ => None,
        }
    }

    /// Whether dependencies of this scope are visible when compiling main sources.
    pub fn on_compile_classpath(&self) -> bool {
        matches!(self, Scope::Compile | Scope::Provided | Scope::System)
    }
}

/// A project dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Scope,
    pub optional: bool,
    /// Explicit archive path of a `system` scoped dependency
    pub system_path: Option<PathBuf>,
}

impl Dependency {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: None,
            scope: Scope::default(),
            optional: false,
            system_path: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// `group:artifact:version`
    pub fn coordinates(&self) -> String {
        format!(
            "{}:{}:{}",
            self.group_id,
            self.artifact_id,
            self.version.as_deref().unwrap_or("?")
        )
    }
}

/// Information about a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    /// Path to the build descriptor
    pub manifest_path: PathBuf,
    pub dependencies: Vec<Dependency>,
}

impl ProjectInfo {
    pub fn new(artifact_id: impl Into<String>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            group_id: None,
            artifact_id: artifact_id.into(),
            version: None,
            manifest_path: manifest_path.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<Dependency>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Dependencies needed to compile the main sources, optional ones included.
    pub fn compile_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.scope.on_compile_classpath())
    }
}

/// Ordered, duplicate-free list of classpath entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classpath {
    entries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` unless already present. Returns whether it was added.
    pub fn push(&mut self, entry: impl Into<PathBuf>) -> bool {
        let entry = entry.into();
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn contains(&self, entry: &Path) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries joined with the platform path separator.
    pub fn to_path_string(&self) -> String {
        let separator = if cfg!(windows) { ";" } else { ":" };
        self.entries
            .iter()
            .map(|e| e.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for Classpath {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut classpath = Classpath::new();
        for entry in iter {
            classpath.push(entry);
        }
        classpath
    }
}

// Re-export commonly used types
pub use maven::MavenResolver;
pub use resolver::DependencyResolver;
