use std::path::{Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};

use crate::error::Result;
use crate::languages::LanguageRegistry;

/// Lists the compilation units below a source root, in a stable order.
pub struct FileWalker {
    registry: LanguageRegistry,
}

impl FileWalker {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if root.is_file() {
            return Ok(if self.is_supported(root) {
                vec![root.to_path_buf()]
            } else {
                Vec::new()
            });
        }
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source root not found: {}", root.display()),
            )
            .into());
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        self.collect_sources(walker)
    }

    /// Supported files among `entries`. The first walk error ends the walk.
    fn collect_sources(
        &self,
        entries: impl IntoIterator<Item = std::result::Result<DirEntry, ignore::Error>>,
    ) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                tracing::warn!("Failed to walk source tree: {}", e);
                e
            })?;
            let path = entry.path();
            if path.is_file() && self.is_supported(path) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.get_for_file(path).is_some()
    }
}

impl Default for FileWalker {
    fn default() -> Self {
        Self::new(LanguageRegistry::new())
    }
}
