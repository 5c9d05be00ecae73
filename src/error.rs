use std::path::PathBuf;

use thiserror::Error;

use crate::build::BuildError;
use crate::instrument::config::ConfigError;

#[derive(Error, Debug)]
pub enum InjectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Dependency resolution error: {0}")]
    Resolution(String),

    #[error("Parse error in {path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Unresolved import `{import}` in {path}")]
    UnresolvedImport { path: PathBuf, import: String },

    #[error("{path}: {feature} requires compliance level {required}, target is {level}")]
    Compliance {
        path: PathBuf,
        feature: &'static str,
        required: u32,
        level: u32,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Detector `{detector}` failed: {message}")]
    Detector { detector: String, message: String },

    #[error("Listener `{listener}` failed: {message}")]
    Listener { listener: String, message: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("XML error in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, InjectorError>;
