use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use code_injector::dependencies::{DependencyResolver, MavenResolver};
use code_injector::detect::DetectorCatalog;
use code_injector::error::Result;
use code_injector::instrument::{Configuration, Instrumenter, InstrumenterOptions};

#[derive(Parser)]
#[command(name = "code-injector")]
#[command(about = "CLI tool for tree-sitter based Java source instrumentation")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Instrument a Maven project in batch mode
    code-injector instrument ./shop --output ./shop-instrumented --config tracing.toml

    # Instrument file by file, retrying failures without classpath
    code-injector instrument ./shop -o ./out -c tracing.toml --file-by-file

    # Instrument, then compile and test the output
    code-injector instrument ./shop -o ./out -c tracing.toml --copy-project --run-tests

    # Print the resolved compile classpath
    code-injector classpath ./shop --format json

    # List available detectors and listeners
    code-injector detectors
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Instrument a project's sources
    Instrument(InstrumentArgs),

    /// Print the resolved compile classpath of a project
    Classpath {
        /// Project directory
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Build descriptor (defaults to <project>/pom.xml)
        #[arg(long)]
        pom: Option<PathBuf>,

        /// Local Maven repository
        #[arg(long)]
        maven_repo: Option<PathBuf>,

        /// Extra classpath entries appended after the resolved ones
        #[arg(long = "classpath")]
        classpath: Vec<PathBuf>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List available detector and listener types
    Detectors,
}

#[derive(Args)]
pub struct InstrumentArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Injector configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory holding the build descriptor, relative to the project
    #[arg(long)]
    pub production_dir: Option<PathBuf>,

    /// Source directory relative to the project (overrides the configuration)
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Process each file separately, retrying failures without classpath
    #[arg(long)]
    pub file_by_file: bool,

    /// Do not resolve the classpath; unresolved imports are tolerated
    #[arg(long)]
    pub no_classpath: bool,

    /// Build descriptor override
    #[arg(long)]
    pub pom: Option<PathBuf>,

    /// Extra classpath entries (repeatable)
    #[arg(long = "classpath")]
    pub classpath: Vec<PathBuf>,

    /// Local Maven repository
    #[arg(long)]
    pub maven_repo: Option<PathBuf>,

    /// Target language level
    #[arg(long, default_value = "8")]
    pub compliance: u32,

    /// Write fully qualified names instead of adding imports
    #[arg(long)]
    pub no_auto_imports: bool,

    /// Name of the id map file written below <output>/log
    #[arg(long, default_value = "id.map")]
    pub id_file: String,

    /// Copy the whole project into the output directory first
    #[arg(long)]
    pub copy_project: bool,

    /// Compile and test the output after instrumenting
    #[arg(long)]
    pub run_tests: bool,

    /// Build tool executable
    #[arg(long, default_value = "mvn")]
    pub build_program: String,

    /// Build phases (comma separated)
    #[arg(long, default_value = "clean,test", value_delimiter = ',')]
    pub phases: Vec<String>,

    /// Build timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "600")]
    pub build_timeout: u64,

    /// Print build tool output
    #[arg(long)]
    pub verbose_build: bool,
}

impl InstrumentArgs {
    fn options(&self) -> InstrumenterOptions {
        let mut options = InstrumenterOptions::new(&self.project, &self.output);
        if let Some(production_dir) = &self.production_dir {
            options.production_dir = production_dir.clone();
        }
        options.pom = self.pom.clone();
        options.classpath = self.classpath.clone();
        options.maven_repo = self.maven_repo.clone();
        options.use_classpath = !self.no_classpath;
        options.file_by_file = self.file_by_file;
        options.compliance_level = self.compliance;
        options.auto_imports = !self.no_auto_imports;
        options.copy_project = self.copy_project;
        options.id_file = self.id_file.clone();
        options.build_program = self.build_program.clone();
        options.build_phases = self.phases.clone();
        options.build_timeout_secs = self.build_timeout;
        options.verbose_build = self.verbose_build;
        options
    }
}

pub async fn instrument(args: &InstrumentArgs) -> Result<()> {
    let catalog = DetectorCatalog::with_defaults();
    let mut config = Configuration::from_file(&args.config, &catalog)?;
    if let Some(source_dir) = &args.source_dir {
        config = config.with_source_dir(source_dir);
    }
    if !config.description().is_empty() {
        println!("{}", config.description());
    }

    let mut instrumenter = Instrumenter::new(args.options());
    let progress = if args.file_by_file {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}") {
            bar.set_style(style);
        }
        instrumenter = instrumenter.with_progress(bar.clone());
        Some(bar)
    } else {
        None
    };

    let result = instrumenter.instrument(&mut config);
    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }
    let report = result?;

    println!(
        "Instrumented {} files: {} elements detected, {} files written",
        report.units, report.detected, report.written
    );
    if !report.retried.is_empty() {
        println!("Succeeded without classpath ({}):", report.retried.len());
        for path in &report.retried {
            println!("  {}", path.display());
        }
    }
    if !report.failed.is_empty() {
        println!("Failed ({}):", report.failed.len());
        for path in &report.failed {
            println!("  {}", path.display());
        }
    }
    if let Some(id_file) = &report.id_file {
        println!("Id map: {}", id_file.display());
    }

    if args.run_tests {
        let outcome = instrumenter.run_tests().await?;
        println!("Build succeeded in {:.1}s", outcome.elapsed.as_secs_f64());
    }

    Ok(())
}

pub fn show_classpath(
    project: &Path,
    pom: Option<PathBuf>,
    maven_repo: Option<PathBuf>,
    manual: &[PathBuf],
    format: &str,
) -> Result<()> {
    let resolver = match maven_repo {
        Some(repo) => MavenResolver::with_repository(repo),
        None => MavenResolver::new(),
    };
    let descriptor = pom.unwrap_or_else(|| project.join("pom.xml"));
    let classpath = resolver.resolve_classpath(&descriptor, manual)?;

    if format == "json" {
        let output = serde_json::to_string_pretty(classpath.entries()).unwrap_or_default();
        println!("{}", output);
    } else {
        if classpath.is_empty() {
            println!("No classpath entries resolved");
            return Ok(());
        }
        for entry in classpath.iter() {
            println!("{}", entry.display());
        }
    }

    Ok(())
}

pub fn list_detectors() {
    let catalog = DetectorCatalog::with_defaults();

    println!("Detectors:");
    for (name, description) in catalog.detectors() {
        println!("  {:<14} {}", name, description);
    }
    println!();
    println!("Listeners:");
    for (name, description) in catalog.listeners() {
        println!("  {:<14} {}", name, description);
    }
}
