use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// Stable identifiers for detected elements.
///
/// Identifiers are handed out in first-encounter order starting at 1 and are
/// never reused within a run. Clones share the same underlying map, so every
/// detector wired to an instrumenter writes into one sequence.
#[derive(Clone, Default)]
pub struct IdMap {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    ids: HashMap<String, u32>,
    order: Vec<String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_or_create(&self, key: &str) -> u32 {
        let mut inner = self.lock();
        if let Some(id) = inner.ids.get(key) {
            return *id;
        }
        inner.order.push(key.to_string());
        let id = inner.order.len() as u32;
        inner.ids.insert(key.to_string(), id);
        id
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.lock().ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `(id, key)` pairs in assignment order.
    pub fn entries(&self) -> Vec<(u32, String)> {
        self.lock()
            .order
            .iter()
            .enumerate()
            .map(|(i, key)| (i as u32 + 1, key.clone()))
            .collect()
    }

    /// Writes one `"<id> <key>"` line per entry, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for (id, key) in self.entries() {
            writeln!(writer, "{} {}", id, key)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.ids.clear();
        inner.order.clear();
    }
}

impl std::fmt::Debug for IdMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdMap").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ids_are_stable_and_distinct() {
        let ids = IdMap::new();
        let a = ids.get_or_create("com.A.run()");
        let b = ids.get_or_create("com.B.run()");
        assert_ne!(a, b);
        assert_eq!(ids.get_or_create("com.A.run()"), a);
        assert_eq!(ids.get("com.B.run()"), Some(b));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_first_encounter_order() {
        let ids = IdMap::new();
        for key in ["z", "a", "m", "a", "z"] {
            ids.get_or_create(key);
        }
        assert_eq!(
            ids.entries(),
            vec![(1, "z".to_string()), (2, "a".to_string()), (3, "m".to_string())]
        );
    }

    #[test]
    fn test_clones_share_state() {
        let ids = IdMap::new();
        let shared = ids.clone();
        shared.get_or_create("x");
        assert_eq!(ids.get("x"), Some(1));
    }

    #[test]
    fn test_write_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let ids = IdMap::new();
        ids.get_or_create("com.A.m(int)");
        ids.get_or_create("com.A.n()");

        let path = temp_dir.path().join("log/id.map");
        ids.write(&path).unwrap();

        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "1 com.A.m(int)\n2 com.A.n()\n"
        );
    }

    #[test]
    fn test_reset() {
        let ids = IdMap::new();
        ids.get_or_create("a");
        ids.reset();
        assert!(ids.is_empty());
        assert_eq!(ids.get_or_create("b"), 1);
    }
}
