/// Text inserted at a byte offset of the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub offset: usize,
    pub text: String,
}

/// Pending mutations of one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct UnitEdits {
    edits: Vec<TextEdit>,
    imports: Vec<String>,
    auto_imports: bool,
}

impl UnitEdits {
    pub fn new(auto_imports: bool) -> Self {
        Self {
            edits: Vec::new(),
            imports: Vec::new(),
            auto_imports,
        }
    }

    pub fn insert(&mut self, offset: usize, text: impl Into<String>) {
        self.edits.push(TextEdit {
            offset,
            text: text.into(),
        });
    }

    /// Returns the name a listener should write to reference `qualified_name`.
    ///
    /// With automatic imports the simple name is returned and an import is
    /// recorded for the printer; otherwise the qualified name is used as is.
    pub fn reference_type(&mut self, qualified_name: &str) -> String {
        if !self.auto_imports {
            return qualified_name.to_string();
        }
        if !self.imports.iter().any(|i| i == qualified_name) {
            self.imports.push(qualified_name.to_string());
        }
        qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(qualified_name)
            .to_string()
    }

    pub fn edits(&self) -> &[TextEdit] {
        &self.edits
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn auto_imports(&self) -> bool {
        self.auto_imports
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.imports.is_empty()
    }

    pub fn clear(&mut self) {
        self.edits.clear();
        self.imports.clear();
    }
}

/// Applies `edits` to `source`. Insertions sharing an offset keep the order
/// in which they were recorded.
pub fn apply_edits(source: &str, edits: &[TextEdit]) -> String {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| e.offset);

    let extra: usize = ordered.iter().map(|e| e.text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut position = 0;
    for edit in ordered {
        let offset = edit.offset.min(source.len());
        if offset > position {
            out.push_str(&source[position..offset]);
            position = offset;
        }
        out.push_str(&edit.text);
    }
    out.push_str(&source[position..]);
    out
}
