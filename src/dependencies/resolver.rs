//! Dependency resolver trait.

use std::path::{Path, PathBuf};

use crate::error::Result;

use super::{Classpath, Dependency, ProjectInfo};

/// Trait for resolving the compile classpath of a project.
pub trait DependencyResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns the manifest file names this resolver can parse.
    fn manifest_names(&self) -> &[&str];

    /// Checks if this resolver can handle the given path.
    fn can_handle(&self, path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            self.manifest_names().contains(&file_name)
        } else {
            false
        }
    }

    /// Parses a manifest file and returns project information.
    fn parse_manifest(&self, path: &Path) -> Result<ProjectInfo>;

    /// Locates the archive of a dependency.
    fn locate_artifact(&self, dep: &Dependency) -> Option<PathBuf>;

    /// Resolves the compile classpath of the project described by `manifest`,
    /// followed by the `manual` entries. Dependencies that cannot be located
    /// are reported and skipped.
    fn resolve_classpath(&self, manifest: &Path, manual: &[PathBuf]) -> Result<Classpath> {
        let project = self.parse_manifest(manifest)?;

        let mut classpath = Classpath::new();
        for dep in project.compile_dependencies() {
            match self.locate_artifact(dep) {
                Some(path) => {
                    classpath.push(path);
                }
                None => tracing::warn!("Could not locate {} in the local repository", dep.coordinates()),
            }
        }
        for entry in manual {
            classpath.push(entry.clone());
        }

        tracing::debug!(
            "{}: {} classpath entries for {}",
            self.name(),
            classpath.len(),
            project.artifact_id
        );
        Ok(classpath)
    }
}
