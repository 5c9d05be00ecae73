//! Named detector and listener factories.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::instrument::config::{hint, ConfigError};

use super::{Detector, EntryLoggerListener, ListenerHandle, MethodDetector};

pub type DetectorFactory = fn(&toml::Table) -> Result<Box<dyn Detector>>;
pub type ListenerFactory = fn(&toml::Table) -> Result<ListenerHandle>;

struct Entry<F> {
    factory: F,
    description: &'static str,
}

/// Registry used to build detectors and listeners from configuration files.
pub struct DetectorCatalog {
    detectors: BTreeMap<String, Entry<DetectorFactory>>,
    listeners: BTreeMap<String, Entry<ListenerFactory>>,
}

impl DetectorCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self {
            detectors: BTreeMap::new(),
            listeners: BTreeMap::new(),
        }
    }

    /// Creates a catalog with all built-in detectors and listeners.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register_detector(
            "method",
            "Method bodies (and constructors with `constructors = true`)",
            |params| Ok(Box::new(MethodDetector::from_params(params)?)),
        );
        catalog.register_listener(
            "entry_logger",
            "Inserts `<class>.<method>(<id>);` at element entry",
            |params| Ok(Arc::new(EntryLoggerListener::from_params(params)?)),
        );
        catalog
    }

    pub fn register_detector(
        &mut self,
        name: impl Into<String>,
        description: &'static str,
        factory: DetectorFactory,
    ) {
        self.detectors.insert(name.into(), Entry { factory, description });
    }

    pub fn register_listener(
        &mut self,
        name: impl Into<String>,
        description: &'static str,
        factory: ListenerFactory,
    ) {
        self.listeners.insert(name.into(), Entry { factory, description });
    }

    pub fn create_detector(&self, name: &str, params: &toml::Table) -> Result<Box<dyn Detector>> {
        match self.detectors.get(name) {
            Some(entry) => (entry.factory)(params),
            None => Err(ConfigError::UnknownDetector {
                name: name.to_string(),
                hint: hint(name, self.detectors.keys().map(String::as_str)),
            }
            .into()),
        }
    }

    pub fn create_listener(&self, name: &str, params: &toml::Table) -> Result<ListenerHandle> {
        match self.listeners.get(name) {
            Some(entry) => (entry.factory)(params),
            None => Err(ConfigError::UnknownListener {
                name: name.to_string(),
                hint: hint(name, self.listeners.keys().map(String::as_str)),
            }
            .into()),
        }
    }

    /// `(name, description)` of every registered detector, sorted by name.
    pub fn detectors(&self) -> Vec<(&str, &'static str)> {
        self.detectors
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.description))
            .collect()
    }

    pub fn listeners(&self) -> Vec<(&str, &'static str)> {
        self.listeners
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.description))
            .collect()
    }
}

impl Default for DetectorCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InjectorError;

    #[test]
    fn test_catalog_with_defaults() {
        let catalog = DetectorCatalog::with_defaults();
        assert_eq!(catalog.detectors().len(), 1);
        assert_eq!(catalog.listeners()[0].0, "entry_logger");

        let detector = catalog.create_detector("method", &toml::Table::new()).unwrap();
        assert_eq!(detector.name(), "method");
    }

    #[test]
    fn test_unknown_detector_suggests_name() {
        let catalog = DetectorCatalog::with_defaults();
        let err = catalog.create_detector("methd", &toml::Table::new()).err().unwrap();
        match err {
            InjectorError::Config(ConfigError::UnknownDetector { name, hint }) => {
                assert_eq!(name, "methd");
                assert!(hint.contains("method"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = DetectorCatalog::new();
        assert!(catalog.detectors().is_empty());
        assert!(catalog.create_listener("entry_logger", &toml::Table::new()).is_err());
    }
}
