//! Per-run instrumentation configuration.
//!
//! A [`Configuration`] is built either programmatically through
//! [`ConfigurationBuilder`] or from a TOML file:
//!
//! ```toml
//! description = "entry tracing"
//! source_dir = "src/main/java"
//!
//! [[detectors]]
//! type = "method"
//! constructors = true
//!
//! [[listeners]]
//! event = ["method_entry", "constructor_entry"]
//! type = "entry_logger"
//! class = "org.trace.Trace"
//!
//! [[logger_files]]
//! source = "logger/Trace.java"
//! target = "src/main/java/org/trace/Trace.java"
//!
//! [logger_properties]
//! file = "trace.properties"
//! values = { "trace.output" = "trace.log" }
//! ```
//!
//! Routing is validated when the configuration is built: every routed event
//! kind must be emitted by at least one configured detector.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::detect::{Detector, DetectorCatalog, EventKind, ListenerHandle, ListenerTable};
use crate::error::Result;

pub const DEFAULT_SOURCE_DIR: &str = "src/main/java";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No configured detector emits event `{kind}`{hint}")]
    UnknownEventKind { kind: String, hint: String },

    #[error("Unknown detector type `{name}`{hint}")]
    UnknownDetector { name: String, hint: String },

    #[error("Unknown listener type `{name}`{hint}")]
    UnknownListener { name: String, hint: String },

    #[error("`{component}` requires parameter `{param}`")]
    MissingParameter { component: String, param: String },

    #[error("Invalid parameter `{param}` for `{component}`: {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },
}

/// ` (did you mean `x`?)` for the closest candidate, or an empty string.
pub(crate) fn hint<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> String {
    candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| format!(" (did you mean `{}`?)", candidate))
        .unwrap_or_default()
}

/// A logger support file copied into the output directory before instrumenting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggerFile {
    pub source: PathBuf,
    /// Destination relative to the output directory.
    pub target: PathBuf,
}

impl LoggerFile {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn copy_to(&self, output_dir: &Path) -> Result<PathBuf> {
        let destination = output_dir.join(&self.target);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&self.source, &destination)?;
        Ok(destination)
    }
}

/// Properties persisted next to the id map for the runtime logger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggerProperties {
    pub file: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl LoggerProperties {
    /// Java properties syntax, one sorted `key=value` line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(&escape_property(key, true));
            out.push('=');
            out.push_str(&escape_property(value, false));
            out.push('\n');
        }
        out
    }
}

fn escape_property(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

/// Read-only descriptor of one instrumentation run.
pub struct Configuration {
    description: String,
    source_dir: PathBuf,
    detectors: Vec<Box<dyn Detector>>,
    routes: ListenerTable,
    logger_files: Vec<LoggerFile>,
    logger_properties: Option<LoggerProperties>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn from_file(path: &Path, catalog: &DetectorCatalog) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir, catalog)
    }

    /// Parses a TOML configuration. Relative logger file sources are taken
    /// relative to `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: &Path, catalog: &DetectorCatalog) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;

        let mut builder = Configuration::builder().description(file.description);
        if let Some(source_dir) = file.source_dir {
            builder = builder.source_dir(source_dir);
        }
        for spec in &file.detectors {
            builder = builder.detector(catalog.create_detector(&spec.kind, &spec.params)?);
        }
        for spec in &file.listeners {
            let listener = catalog.create_listener(&spec.kind, &spec.params)?;
            for event in spec.event.iter() {
                builder = builder.route(EventKind::new(event), listener.clone());
            }
        }
        for logger_file in file.logger_files {
            let source = if logger_file.source.is_absolute() {
                logger_file.source
            } else {
                base_dir.join(logger_file.source)
            };
            builder = builder.logger_file(LoggerFile::new(source, logger_file.target));
        }
        if let Some(properties) = file.logger_properties {
            builder = builder.logger_properties(properties);
        }

        Ok(builder.build()?)
    }

    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn detectors(&self) -> &[Box<dyn Detector>] {
        &self.detectors
    }

    pub fn detectors_mut(&mut self) -> &mut [Box<dyn Detector>] {
        &mut self.detectors
    }

    pub fn routes(&self) -> &ListenerTable {
        &self.routes
    }

    /// Detectors together with the routing table, for wiring.
    pub(crate) fn detectors_and_routes(&mut self) -> (&mut [Box<dyn Detector>], &ListenerTable) {
        (&mut self.detectors, &self.routes)
    }

    pub fn logger_files(&self) -> &[LoggerFile] {
        &self.logger_files
    }

    pub fn logger_properties(&self) -> Option<&LoggerProperties> {
        self.logger_properties.as_ref()
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("description", &self.description)
            .field("source_dir", &self.source_dir)
            .field(
                "detectors",
                &self.detectors.iter().map(|d| d.name().to_string()).collect::<Vec<_>>(),
            )
            .field("routes", &self.routes.len())
            .field("logger_files", &self.logger_files)
            .finish()
    }
}

pub struct ConfigurationBuilder {
    description: String,
    source_dir: PathBuf,
    detectors: Vec<Box<dyn Detector>>,
    routes: ListenerTable,
    logger_files: Vec<LoggerFile>,
    logger_properties: Option<LoggerProperties>,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self {
            description: String::new(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            detectors: Vec::new(),
            routes: ListenerTable::new(),
            logger_files: Vec::new(),
            logger_properties: None,
        }
    }
}

impl ConfigurationBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = source_dir.into();
        self
    }

    pub fn detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn route(mut self, kind: EventKind, listener: ListenerHandle) -> Self {
        self.routes.add(kind, listener);
        self
    }

    pub fn logger_file(mut self, logger_file: LoggerFile) -> Self {
        self.logger_files.push(logger_file);
        self
    }

    pub fn logger_properties(mut self, properties: LoggerProperties) -> Self {
        self.logger_properties = Some(properties);
        self
    }

    pub fn build(self) -> std::result::Result<Configuration, ConfigError> {
        let emitted: Vec<&EventKind> = self.detectors.iter().flat_map(|d| d.emits()).collect();
        for kind in self.routes.kinds() {
            if !emitted.contains(&kind) {
                return Err(ConfigError::UnknownEventKind {
                    kind: kind.to_string(),
                    hint: hint(kind.as_str(), emitted.iter().map(|k| k.as_str())),
                });
            }
        }

        Ok(Configuration {
            description: self.description,
            source_dir: self.source_dir,
            detectors: self.detectors,
            routes: self.routes,
            logger_files: self.logger_files,
            logger_properties: self.logger_properties,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    description: String,
    source_dir: Option<PathBuf>,
    #[serde(default)]
    detectors: Vec<ComponentSpec>,
    #[serde(default)]
    listeners: Vec<RouteSpec>,
    #[serde(default)]
    logger_files: Vec<LoggerFile>,
    logger_properties: Option<LoggerProperties>,
}

#[derive(Debug, Deserialize)]
struct ComponentSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    params: toml::Table,
}

#[derive(Debug, Deserialize)]
struct RouteSpec {
    event: OneOrMany,
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    params: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            OneOrMany::One(one) => std::slice::from_ref(one),
            OneOrMany::Many(many) => many,
        };
        items.iter().map(String::as_str)
    }
}
