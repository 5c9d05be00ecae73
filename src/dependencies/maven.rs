//! Maven dependency resolver.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};

use crate::error::{InjectorError, Result};

use super::resolver::DependencyResolver;
use super::{Dependency, ProjectInfo, Scope};

static PROPERTY_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Parent descriptors followed before giving up.
const MAX_PARENT_DEPTH: usize = 8;

/// Resolver for Maven projects.
pub struct MavenResolver {
    /// Local repository root
    repository: Option<PathBuf>,
}

impl MavenResolver {
    pub fn new() -> Self {
        Self {
            repository: Self::find_repository(),
        }
    }

    pub fn with_repository(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: Some(repository.into()),
        }
    }

    pub fn repository(&self) -> Option<&Path> {
        self.repository.as_deref()
    }

    /// Finds the local repository.
    fn find_repository() -> Option<PathBuf> {
        if let Some(repo) = std::env::var_os("M2_REPO") {
            return Some(PathBuf::from(repo));
        }
        dirs_home().map(|home| home.join(".m2/repository"))
    }

    fn parse_pom(&self, path: &Path, depth: usize) -> Result<PomModel> {
        let content = fs::read_to_string(path).map_err(|e| {
            InjectorError::Resolution(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let doc = Document::parse(&content).map_err(|e| InjectorError::Xml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let root = doc.root_element();
        if !root.has_tag_name("project") {
            return Err(InjectorError::Xml {
                path: path.to_path_buf(),
                message: format!("expected <project>, found <{}>", root.tag_name().name()),
            });
        }

        let parent_ref = child(root, "parent");
        let parent = match parent_ref {
            Some(parent_node) if depth < MAX_PARENT_DEPTH => {
                let relative = child_text(parent_node, "relativePath").unwrap_or("../pom.xml");
                let mut parent_path = path.parent().unwrap_or_else(|| Path::new(".")).join(relative);
                if parent_path.is_dir() {
                    parent_path = parent_path.join("pom.xml");
                }
                if parent_path.is_file() {
                    Some(self.parse_pom(&parent_path, depth + 1)?)
                } else {
                    tracing::debug!("Parent descriptor {} not found", parent_path.display());
                    None
                }
            }
            _ => None,
        };

        // Parent dependencies are inherited and precede the module's own.
        let mut model = parent.unwrap_or_default();

        model.group_id = child_text(root, "groupId")
            .or_else(|| parent_ref.and_then(|p| child_text(p, "groupId")))
            .map(str::to_string)
            .or(model.group_id);
        model.artifact_id = child_text(root, "artifactId").unwrap_or_default().to_string();
        model.version = child_text(root, "version")
            .or_else(|| parent_ref.and_then(|p| child_text(p, "version")))
            .map(str::to_string)
            .or(model.version);

        if let Some(parent_node) = parent_ref {
            for (name, key) in [("groupId", "project.parent.groupId"), ("version", "project.parent.version")] {
                if let Some(value) = child_text(parent_node, name) {
                    model.properties.insert(key.to_string(), value.to_string());
                }
            }
        }
        if let Some(properties) = child(root, "properties") {
            for property in properties.children().filter(Node::is_element) {
                model.properties.insert(
                    property.tag_name().name().to_string(),
                    property.text().unwrap_or_default().trim().to_string(),
                );
            }
        }
        let builtins = [
            ("project.groupId", model.group_id.clone()),
            ("project.artifactId", Some(model.artifact_id.clone())),
            ("project.version", model.version.clone()),
        ];
        for (key, value) in builtins {
            if let Some(value) = value {
                model.properties.insert(key.to_string(), value);
            }
        }

        if let Some(management) = child(root, "dependencyManagement").and_then(|m| child(m, "dependencies")) {
            for node in management.children().filter(|n| n.has_tag_name("dependency")) {
                let dep = read_dependency(node);
                model
                    .managed
                    .insert((dep.group_id.clone(), dep.artifact_id.clone()), dep);
            }
        }

        if let Some(dependencies) = child(root, "dependencies") {
            for node in dependencies.children().filter(|n| n.has_tag_name("dependency")) {
                model.dependencies.push(read_dependency(node));
            }
        }

        Ok(model)
    }

    /// Substitutes `${...}` references and fills versions and scopes from
    /// dependency management.
    fn finish(&self, model: PomModel, manifest_path: &Path) -> ProjectInfo {
        let resolve = |text: &str| interpolate(text, &model.properties);

        let managed: HashMap<(String, String), &RawDependency> = model
            .managed
            .values()
            .map(|dep| ((resolve(&dep.group_id), resolve(&dep.artifact_id)), dep))
            .collect();

        let dependencies = model
            .dependencies
            .iter()
            .map(|raw| {
                let group_id = resolve(&raw.group_id);
                let artifact_id = resolve(&raw.artifact_id);
                let managed = managed.get(&(group_id.clone(), artifact_id.clone()));

                let version = raw
                    .version
                    .as_deref()
                    .or_else(|| managed.and_then(|m| m.version.as_deref()))
                    .map(&resolve);
                let scope = raw
                    .scope
                    .as_deref()
                    .or_else(|| managed.and_then(|m| m.scope.as_deref()))
                    .map(&resolve)
                    .and_then(|s| Scope::from_str(&s))
                    .unwrap_or_default();

                let mut dep = Dependency::new(group_id, artifact_id)
                    .with_scope(scope)
                    .with_optional(raw.optional);
                dep.version = version;
                dep.system_path = raw.system_path.as_deref().map(|p| PathBuf::from(resolve(p)));
                dep
            })
            .collect();

        let mut project = ProjectInfo::new(resolve(&model.artifact_id), manifest_path)
            .with_dependencies(dependencies);
        project.group_id = model.group_id.as_deref().map(&resolve);
        project.version = model.version.as_deref().map(&resolve);
        project
    }
}

impl Default for MavenResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyResolver for MavenResolver {
    fn name(&self) -> &str {
        "maven"
    }

    fn manifest_names(&self) -> &[&str] {
        &["pom.xml"]
    }

    fn parse_manifest(&self, path: &Path) -> Result<ProjectInfo> {
        if !path.is_file() {
            return Err(InjectorError::Resolution(format!(
                "Build descriptor not found: {}",
                path.display()
            )));
        }
        let model = self.parse_pom(path, 0)?;
        Ok(self.finish(model, path))
    }

    fn locate_artifact(&self, dep: &Dependency) -> Option<PathBuf> {
        if dep.scope == Scope::System {
            return dep.system_path.clone().filter(|p| p.is_file());
        }

        let version = dep.version.as_deref()?;
        if version.contains("${") || dep.group_id.contains("${") {
            return None;
        }

        let mut path = self.repository.clone()?;
        for segment in dep.group_id.split('.') {
            path.push(segment);
        }
        path.push(&dep.artifact_id);
        path.push(version);
        path.push(format!("{}-{}.jar", dep.artifact_id, version));

        path.is_file().then_some(path)
    }
}

#[derive(Debug, Default)]
struct PomModel {
    group_id: Option<String>,
    artifact_id: String,
    version: Option<String>,
    properties: HashMap<String, String>,
    managed: HashMap<(String, String), RawDependency>,
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Clone)]
struct RawDependency {
    group_id: String,
    artifact_id: String,
    version: Option<String>,
    scope: Option<String>,
    optional: bool,
    system_path: Option<String>,
}

fn read_dependency(node: Node<'_, '_>) -> RawDependency {
    RawDependency {
        group_id: child_text(node, "groupId").unwrap_or_default().to_string(),
        artifact_id: child_text(node, "artifactId").unwrap_or_default().to_string(),
        version: child_text(node, "version").map(str::to_string),
        scope: child_text(node, "scope").map(str::to_string),
        optional: child_text(node, "optional") == Some("true"),
        system_path: child_text(node, "systemPath").map(str::to_string),
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Replaces `${name}` references, following nested references a bounded
/// number of times. Unknown references are kept verbatim.
fn interpolate(text: &str, properties: &HashMap<String, String>) -> String {
    let mut current = text.to_string();
    for _ in 0..10 {
        if !current.contains("${") {
            break;
        }
        let next = PROPERTY_REF
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                properties
                    .get(name)
                    .cloned()
                    .or_else(|| {
                        name.strip_prefix("env.")
                            .and_then(|var| std::env::var(var).ok())
                    })
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Gets the home directory.
fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
