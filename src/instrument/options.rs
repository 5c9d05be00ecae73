use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Run options of an [`Instrumenter`](super::Instrumenter).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstrumenterOptions {
    pub project_dir: PathBuf,
    /// Directory holding the build descriptor; relative paths are taken
    /// relative to `project_dir`.
    pub production_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Build descriptor override. Defaults to `<production_dir>/pom.xml`.
    pub pom: Option<PathBuf>,
    /// Classpath entries appended after the resolved dependencies.
    pub classpath: Vec<PathBuf>,
    pub maven_repo: Option<PathBuf>,
    pub use_classpath: bool,
    pub file_by_file: bool,
    pub compliance_level: u32,
    pub auto_imports: bool,
    pub copy_project: bool,
    /// Name of the id map file below `<output_dir>/log`.
    pub id_file: String,
    pub build_program: String,
    pub build_phases: Vec<String>,
    /// Seconds; 0 disables the timeout.
    pub build_timeout_secs: u64,
    pub verbose_build: bool,
}

impl Default for InstrumenterOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            production_dir: PathBuf::from("."),
            output_dir: PathBuf::from("instrumented"),
            pom: None,
            classpath: Vec::new(),
            maven_repo: None,
            use_classpath: true,
            file_by_file: false,
            compliance_level: 8,
            auto_imports: true,
            copy_project: false,
            id_file: "id.map".to_string(),
            build_program: "mvn".to_string(),
            build_phases: vec!["clean".to_string(), "test".to_string()],
            build_timeout_secs: 600,
            verbose_build: false,
        }
    }
}

impl InstrumenterOptions {
    pub fn new(project_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn production_path(&self) -> PathBuf {
        if self.production_dir.is_absolute() {
            self.production_dir.clone()
        } else {
            self.project_dir.join(&self.production_dir)
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        match &self.pom {
            Some(pom) => pom.clone(),
            None => self.production_path().join("pom.xml"),
        }
    }

    pub fn source_root(&self, source_dir: &Path) -> PathBuf {
        self.project_dir.join(source_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_dir.join("log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = InstrumenterOptions::new("/work/shop", "/work/out");
        assert!(options.use_classpath);
        assert!(!options.file_by_file);
        assert!(options.auto_imports);
        assert_eq!(options.compliance_level, 8);
        assert_eq!(options.build_phases, vec!["clean", "test"]);
        assert_eq!(options.log_dir(), PathBuf::from("/work/out/log"));
    }

    #[test]
    fn test_descriptor_path() {
        let mut options = InstrumenterOptions::new("/work/shop", "/work/out");
        assert_eq!(options.descriptor_path(), PathBuf::from("/work/shop/./pom.xml"));

        options.production_dir = PathBuf::from("app");
        assert_eq!(options.descriptor_path(), PathBuf::from("/work/shop/app/pom.xml"));

        options.production_dir = PathBuf::from("/elsewhere");
        assert_eq!(options.descriptor_path(), PathBuf::from("/elsewhere/pom.xml"));

        options.pom = Some(PathBuf::from("/custom/pom.xml"));
        assert_eq!(options.descriptor_path(), PathBuf::from("/custom/pom.xml"));
    }

    #[test]
    fn test_deserialize_partial() {
        let options: InstrumenterOptions =
            serde_json::from_str(r#"{"project_dir": "/p", "file_by_file": true}"#).unwrap();
        assert_eq!(options.project_dir, PathBuf::from("/p"));
        assert!(options.file_by_file);
        assert!(options.use_classpath);
    }
}
