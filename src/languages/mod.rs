pub mod java;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::Query;

pub trait LanguageGrammar: Send + Sync {
    fn name(&self) -> &'static str;
    fn file_extensions(&self) -> &[&'static str];
    fn language(&self) -> tree_sitter::Language;

    /// Query matching method-like declarations that own a body.
    fn methods_query(&self) -> &str;
    fn types_query(&self) -> &str;
    fn imports_query(&self) -> &str;

    /// Get cached methods query (compiled once)
    fn cached_methods_query(&self) -> Option<&'static Query> {
        None
    }

    /// Get cached types query (compiled once)
    fn cached_types_query(&self) -> Option<&'static Query> {
        None
    }

    /// Get cached imports query (compiled once)
    fn cached_imports_query(&self) -> Option<&'static Query> {
        None
    }

    /// Node kinds gated by a minimum language level: `(node kind, label, level)`.
    fn feature_levels(&self) -> &[(&'static str, &'static str, u32)] {
        &[]
    }

    /// Package prefixes provided by the platform and never looked up on the classpath.
    fn platform_packages(&self) -> &[&'static str] {
        &[]
    }
}

pub struct LanguageRegistry {
    languages: HashMap<String, Arc<dyn LanguageGrammar>>,
    extension_map: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            languages: HashMap::new(),
            extension_map: HashMap::new(),
        };

        registry.register(Arc::new(java::JavaGrammar));

        registry
    }

    pub fn register(&mut self, grammar: Arc<dyn LanguageGrammar>) {
        let name = grammar.name().to_string();
        for ext in grammar.file_extensions() {
            self.extension_map.insert(ext.to_string(), name.clone());
        }
        self.languages.insert(name, grammar);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn LanguageGrammar>> {
        self.languages.get(name).cloned()
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn LanguageGrammar>> {
        self.extension_map
            .get(ext)
            .and_then(|name| self.languages.get(name))
            .cloned()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn LanguageGrammar>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get_by_extension(ext))
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.extension_map.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
