//! The instrumentation driver.
//!
//! [`Instrumenter::instrument`] prepares the output directory, resolves the
//! classpath, wires detectors to listeners and then runs the injection
//! routine either once over the whole source root (batch mode) or once per
//! file. In file-by-file mode files that fail with the resolved classpath are
//! collected and retried in a second pass without classpath constraints.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use crate::build::{BuildOutcome, BuildRunner};
use crate::dependencies::{Classpath, DependencyResolver, MavenResolver};
use crate::error::{InjectorError, Result};
use crate::languages::LanguageRegistry;
use crate::model::{
    ClasspathIndex, ClasspathMode, FileWalker, ModelBuilder, ModelSettings, SourcePrinter,
    SourceUnit, TreeSitterModelBuilder,
};

use super::config::{Configuration, LoggerProperties};
use super::{IdMap, InstrumenterOptions};

/// Outcome of one run of the injection routine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Injection {
    pub units: usize,
    pub detected: usize,
    /// Files written to the output directory.
    pub written: usize,
}

/// Summary of an [`Instrumenter::instrument`] run.
#[derive(Debug, Clone, Default)]
pub struct InstrumentReport {
    pub units: usize,
    pub detected: usize,
    pub written: usize,
    /// Files that succeeded only in the no-classpath retry pass.
    pub retried: Vec<PathBuf>,
    /// Files that failed in every pass.
    pub failed: Vec<PathBuf>,
    pub id_file: Option<PathBuf>,
}

impl InstrumentReport {
    fn add(&mut self, injection: Injection) {
        self.units += injection.units;
        self.detected += injection.detected;
        self.written += injection.written;
    }
}

pub struct Instrumenter {
    options: InstrumenterOptions,
    id_map: IdMap,
    failed_units: BTreeSet<PathBuf>,
    model_builder: Box<dyn ModelBuilder>,
    resolver: Box<dyn DependencyResolver>,
    walker: FileWalker,
    classpath: ClasspathIndex,
    output_ready: bool,
    progress: Option<ProgressBar>,
}

impl Instrumenter {
    pub fn new(options: InstrumenterOptions) -> Self {
        let resolver = match &options.maven_repo {
            Some(repo) => MavenResolver::with_repository(repo),
            None => MavenResolver::new(),
        };
        Self {
            options,
            id_map: IdMap::new(),
            failed_units: BTreeSet::new(),
            model_builder: Box::new(TreeSitterModelBuilder::new()),
            resolver: Box::new(resolver),
            walker: FileWalker::new(LanguageRegistry::new()),
            classpath: ClasspathIndex::new(),
            output_ready: false,
            progress: None,
        }
    }

    pub fn with_model_builder(mut self, model_builder: Box<dyn ModelBuilder>) -> Self {
        self.model_builder = model_builder;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Reports per-file progress in file-by-file mode.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &InstrumenterOptions {
        &self.options
    }

    pub fn id_map(&self) -> &IdMap {
        &self.id_map
    }

    /// Files whose last processing attempt failed in the current or most
    /// recent run.
    pub fn failed_units(&self) -> &BTreeSet<PathBuf> {
        &self.failed_units
    }

    pub fn classpath(&self) -> &ClasspathIndex {
        &self.classpath
    }

    pub fn instrument(&mut self, config: &mut Configuration) -> Result<InstrumentReport> {
        self.failed_units.clear();
        self.prepare_output(config)?;

        if self.options.use_classpath || self.options.file_by_file {
            self.resolve_classpath()?;
        }

        let source_root = absolute(&self.options.source_root(config.source_dir()))?;
        self.wire(config);

        let mode = if self.options.use_classpath || self.options.file_by_file {
            ClasspathMode::Strict
        } else {
            ClasspathMode::NoClasspath
        };

        let mut report = InstrumentReport::default();
        if self.options.file_by_file {
            tracing::info!("Instrumenting {} file by file", source_root.display());
            report.add(self.walk(config, &source_root, mode, None)?);

            if !self.failed_units.is_empty() {
                let retry = self.failed_units.clone();
                tracing::info!("Retrying {} files without classpath", retry.len());
                report.add(self.walk(config, &source_root, ClasspathMode::NoClasspath, Some(&retry))?);
                report.retried = retry.difference(&self.failed_units).cloned().collect();
            }
        } else {
            tracing::info!("Instrumenting {}", source_root.display());
            report.add(self.launch_injection(config, &[SourceUnit::root(&source_root)], mode)?);
        }
        report.failed = self.failed_units.iter().cloned().collect();

        report.id_file = Some(self.write_id_file(&self.options.id_file)?);
        if let Some(properties) = config.logger_properties() {
            self.write_logger_properties(properties)?;
        }

        tracing::info!(
            "Instrumented {} units: {} elements detected, {} files written, {} failed",
            report.units,
            report.detected,
            report.written,
            report.failed.len()
        );
        Ok(report)
    }

    /// Builds a model for `units`, runs every detector over it and prints it
    /// when anything was detected. On failure the first unit is recorded as
    /// failed before the error is returned. Detectors are reset either way.
    pub fn launch_injection(
        &mut self,
        config: &mut Configuration,
        units: &[SourceUnit],
        mode: ClasspathMode,
    ) -> Result<Injection> {
        let result = self.inject(config, units, mode);
        for detector in config.detectors_mut() {
            detector.reset();
        }

        match result {
            Ok(injection) => {
                if let Some(unit) = units.first() {
                    self.failed_units.remove(&unit.path);
                }
                Ok(injection)
            }
            Err(e) => {
                if let Some(unit) = units.first() {
                    tracing::warn!("Failed to instrument {}: {}", unit.path.display(), e);
                    self.failed_units.insert(unit.path.clone());
                }
                Err(e)
            }
        }
    }

    fn inject(
        &self,
        config: &mut Configuration,
        units: &[SourceUnit],
        mode: ClasspathMode,
    ) -> Result<Injection> {
        let settings = ModelSettings {
            mode,
            classpath: &self.classpath,
            auto_imports: self.options.auto_imports,
            compliance_level: self.options.compliance_level,
        };
        let mut model = self.model_builder.build(units, &settings)?;

        for index in 0..model.len() {
            let Some((unit, edits)) = model.unit_mut(index) else {
                continue;
            };
            for detector in config.detectors_mut() {
                detector.process(unit, edits)?;
            }
        }

        let detected: usize = config.detectors().iter().map(|d| d.detected_count()).sum();
        let written = if detected > 0 {
            let printer = SourcePrinter::new(self.options.output_dir.join(config.source_dir()));
            printer.print(&model)?
        } else {
            0
        };

        tracing::debug!(
            "{} units, {} detected, {} written",
            model.len(),
            detected,
            written
        );
        Ok(Injection {
            units: model.len(),
            detected,
            written,
        })
    }

    /// Runs the injection routine once per file below `root`. With `only`,
    /// files outside that set are skipped. Per-file failures are recorded
    /// and do not stop the walk.
    fn walk(
        &mut self,
        config: &mut Configuration,
        root: &Path,
        mode: ClasspathMode,
        only: Option<&BTreeSet<PathBuf>>,
    ) -> Result<Injection> {
        let files: Vec<PathBuf> = self
            .walker
            .walk(root)?
            .into_iter()
            .filter(|path| only.map_or(true, |only| only.contains(path)))
            .collect();

        if let Some(progress) = &self.progress {
            progress.set_length(files.len() as u64);
            progress.set_position(0);
        }

        let mut total = Injection::default();
        for path in files {
            if let Some(progress) = &self.progress {
                progress.set_message(relative_display(&path, root));
            }
            let unit = SourceUnit::file(root, &path);
            match self.launch_injection(config, std::slice::from_ref(&unit), mode) {
                Ok(injection) => {
                    total.units += injection.units;
                    total.detected += injection.detected;
                    total.written += injection.written;
                }
                Err(_) if mode == ClasspathMode::Strict => {}
                Err(e) => tracing::warn!("Giving up on {}: {}", path.display(), e),
            }
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        Ok(total)
    }

    /// Hands the id map to every detector and routes each emitted event kind
    /// to its configured listeners.
    fn wire(&self, config: &mut Configuration) {
        let (detectors, routes) = config.detectors_and_routes();
        for detector in detectors.iter_mut() {
            detector.set_id_map(self.id_map.clone());
            let kinds = detector.emits().to_vec();
            for kind in kinds {
                for listener in routes.listeners_for(&kind) {
                    detector.add_listener(kind.clone(), listener.clone());
                }
            }
        }
    }

    fn resolve_classpath(&mut self) -> Result<()> {
        let descriptor = self.options.descriptor_path();
        if !descriptor.is_file() {
            return Err(InjectorError::Resolution(format!(
                "Build descriptor not found: {}",
                descriptor.display()
            )));
        }

        let classpath: Classpath = self
            .resolver
            .resolve_classpath(&descriptor, &self.options.classpath)?;
        tracing::info!(
            "Resolved {} classpath entries from {}",
            classpath.len(),
            descriptor.display()
        );
        self.classpath = ClasspathIndex::build(&classpath);
        Ok(())
    }

    /// Creates the output directory on first use and copies the configured
    /// logger files into it.
    pub fn prepare_output(&mut self, config: &Configuration) -> Result<()> {
        if !self.output_ready {
            fs::create_dir_all(&self.options.output_dir)?;
            if self.options.copy_project {
                let copied = self.copy_project()?;
                tracing::info!(
                    "Copied {} project files to {}",
                    copied,
                    self.options.output_dir.display()
                );
            }
            self.output_ready = true;
        }

        for logger_file in config.logger_files() {
            let target = logger_file.copy_to(&self.options.output_dir)?;
            tracing::debug!("Copied {} to {}", logger_file.source.display(), target.display());
        }
        Ok(())
    }

    fn copy_project(&self) -> Result<usize> {
        let project = absolute(&self.options.project_dir)?;
        let output = absolute(&self.options.output_dir)?;

        let walker = ignore::WalkBuilder::new(&project)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .filter_entry(move |entry| !entry.path().starts_with(&output))
            .build();

        let mut copied = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", project.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&project) else {
                continue;
            };
            let target = self.options.output_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Writes the id map to `<output>/log/<name>`.
    pub fn write_id_file(&self, name: &str) -> Result<PathBuf> {
        let path = self.options.log_dir().join(name);
        self.id_map.write(&path)?;
        tracing::debug!("Wrote {} ids to {}", self.id_map.len(), path.display());
        Ok(path)
    }

    /// Writes logger properties to `<output>/log/<file>`. Nothing is written
    /// for an empty file name.
    pub fn write_logger_properties(&self, properties: &LoggerProperties) -> Result<Option<PathBuf>> {
        if properties.file.trim().is_empty() {
            return Ok(None);
        }
        let log_dir = self.options.log_dir();
        fs::create_dir_all(&log_dir)?;
        let path = log_dir.join(&properties.file);
        fs::write(&path, properties.render())?;
        Ok(Some(path))
    }

    /// Compiles and tests the output directory with the configured build tool.
    pub async fn run_tests(&self) -> Result<BuildOutcome> {
        let runner = BuildRunner::new(&self.options.build_program)
            .phases(self.options.build_phases.iter().cloned())
            .timeout_secs(self.options.build_timeout_secs)
            .verbose(self.options.verbose_build);

        match runner.run(&self.options.output_dir).await {
            Ok(outcome) => {
                tracing::info!("Build succeeded in {:.1}s", outcome.elapsed.as_secs_f64());
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Err(e.into())
            }
        }
    }

    /// Forgets the prepared output directory, so the next run prepares it
    /// again. Assigned ids are kept.
    pub fn clean(&mut self) {
        self.output_ready = false;
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
