//! Index of the types reachable through a resolved classpath.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use walkdir::WalkDir;

use crate::dependencies::Classpath;
use crate::error::{InjectorError, Result};

#[derive(Debug, Default, Clone)]
pub struct ClasspathIndex {
    classes: HashSet<String>,
    packages: HashSet<String>,
}

impl ClasspathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every entry of `classpath`. Entries that cannot be read are
    /// reported and skipped.
    pub fn build(classpath: &Classpath) -> Self {
        let mut index = Self::new();
        for entry in classpath.iter() {
            let outcome = if entry.is_dir() {
                index.index_directory(entry);
                Ok(())
            } else if entry.is_file() {
                index.index_archive(entry)
            } else {
                tracing::warn!("Classpath entry not found: {}", entry.display());
                Ok(())
            };
            if let Err(e) = outcome {
                tracing::warn!("Skipping classpath entry {}: {}", entry.display(), e);
            }
        }
        tracing::debug!(
            "Classpath index: {} classes in {} packages",
            index.classes.len(),
            index.packages.len()
        );
        index
    }

    fn index_archive(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let archive = zip::ZipArchive::new(file).map_err(|e| InjectorError::Archive {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        for name in names {
            self.add_entry(&name);
        }
        Ok(())
    }

    fn index_directory(&mut self, root: &Path) {
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    tracing::warn!("Skipping {} in classpath directory: {}", path.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                self.add_entry(&name);
            }
        }
    }

    /// Registers an archive-style entry name such as `org/acme/Util$Inner.class`.
    pub fn add_entry(&mut self, name: &str) {
        let stem = match name
            .strip_suffix(".class")
            .or_else(|| name.strip_suffix(".java"))
        {
            Some(stem) => stem,
            None => return,
        };
        if stem.starts_with("META-INF/") || stem.ends_with("module-info") || stem.ends_with("package-info") {
            return;
        }

        let dotted = stem.replace('/', ".");
        let (package, simple) = match dotted.rfind('.') {
            Some(pos) => (&dotted[..pos], &dotted[pos + 1..]),
            None => ("", dotted.as_str()),
        };

        if !package.is_empty() {
            self.packages.insert(package.to_string());
        }
        // Nested classes are addressable as Outer.Inner in source.
        let source_name = simple.replace('$', ".");
        let fqn = if package.is_empty() {
            source_name
        } else {
            format!("{}.{}", package, source_name)
        };
        self.classes.insert(fqn);
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains(name)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_add_entry_class() {
        let mut index = ClasspathIndex::new();
        index.add_entry("org/acme/Util.class");
        index.add_entry("org/acme/Util$Inner.class");
        index.add_entry("META-INF/MANIFEST.MF");
        index.add_entry("module-info.class");

        assert!(index.has_class("org.acme.Util"));
        assert!(index.has_class("org.acme.Util.Inner"));
        assert!(index.has_package("org.acme"));
        assert!(!index.has_package("org"));
        assert_eq!(index.class_count(), 2);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_walk_errors_are_logged() {
        let temp_dir = TempDir::new().unwrap();
        let classes = temp_dir.path().join("classes");
        fs::create_dir_all(classes.join("org/acme")).unwrap();
        fs::write(classes.join("org/acme/Util.class"), "").unwrap();
        std::os::unix::fs::symlink(&classes, classes.join("org/loop")).unwrap();

        let mut classpath = Classpath::new();
        classpath.push(classes.clone());

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let index = tracing::subscriber::with_default(subscriber, || {
            ClasspathIndex::build(&classpath)
        });

        assert!(index.has_class("org.acme.Util"));
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains(&classes.join("org/loop").display().to_string()));
    }

    #[test]
    fn test_build_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let classes = temp_dir.path().join("classes/org/acme");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("Service.class"), [0xCA, 0xFE]).unwrap();

        let mut classpath = Classpath::new();
        classpath.push(temp_dir.path().join("classes"));
        let index = ClasspathIndex::build(&classpath);

        assert!(index.has_class("org.acme.Service"));
    }

    #[test]
    fn test_build_from_archive() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        {
            let file = File::create(&jar).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer.start_file("com/lib/Helper.class", options).unwrap();
            writer.write_all(&[0xCA, 0xFE]).unwrap();
            writer.finish().unwrap();
        }

        let mut classpath = Classpath::new();
        classpath.push(jar);
        let index = ClasspathIndex::build(&classpath);

        assert!(index.has_class("com.lib.Helper"));
        assert!(index.has_package("com.lib"));
    }

    #[test]
    fn test_build_skips_broken_entries() {
        let temp_dir = TempDir::new().unwrap();
        let bogus = temp_dir.path().join("broken.jar");
        fs::write(&bogus, "not a zip").unwrap();

        let mut classpath = Classpath::new();
        classpath.push(bogus);
        classpath.push(temp_dir.path().join("missing.jar"));
        let index = ClasspathIndex::build(&classpath);

        assert!(index.is_empty());
    }
}
