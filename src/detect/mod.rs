//! Detection and listener protocol.
//!
//! A [`Detector`] inspects compilation units and raises events of a given
//! [`EventKind`]. Every [`DetectionListener`] routed to that kind receives the
//! event and may record edits against the unit. Detectors never edit sources
//! themselves, which keeps "what to find" apart from "what to do when found".

pub mod catalog;
pub mod listeners;
pub mod method;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::instrument::IdMap;
use crate::model::{CompilationUnit, UnitEdits};

pub use catalog::DetectorCatalog;
pub use listeners::EntryLoggerListener;
pub use method::MethodDetector;

/// Name of an event raised by a detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(Cow<'static, str>);

impl EventKind {
    pub const METHOD_ENTRY: EventKind = EventKind(Cow::Borrowed("method_entry"));
    pub const CONSTRUCTOR_ENTRY: EventKind = EventKind(Cow::Borrowed("constructor_entry"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A match raised by a detector.
pub struct DetectionEvent<'a> {
    pub kind: &'a EventKind,
    pub unit: &'a CompilationUnit,
    pub node: tree_sitter::Node<'a>,
    /// Stable key of the detected element, as recorded in the id map.
    pub key: &'a str,
    pub id: u32,
    /// Byte offset where code entering the element may be inserted.
    pub insertion_offset: usize,
    /// Indentation for statements inserted at `insertion_offset`.
    pub indent: &'a str,
}

/// Reacts to detection events by recording edits.
pub trait DetectionListener: Send + Sync {
    fn name(&self) -> &str;
    fn on_event(&self, event: &DetectionEvent<'_>, edits: &mut UnitEdits) -> Result<()>;
}

pub type ListenerHandle = Arc<dyn DetectionListener>;

/// Inspects compilation units and fires events to its listeners.
pub trait Detector: Send {
    fn name(&self) -> &str;

    /// Event kinds this detector can raise.
    fn emits(&self) -> &[EventKind];

    fn set_id_map(&mut self, ids: IdMap);

    /// Routes `kind` events to `listener`. Adding the same handle twice is a no-op.
    fn add_listener(&mut self, kind: EventKind, listener: ListenerHandle);

    fn process(&mut self, unit: &CompilationUnit, edits: &mut UnitEdits) -> Result<()>;

    /// Elements detected since the last [`Detector::reset`].
    fn detected_count(&self) -> usize;

    fn reset(&mut self);
}

/// Ordered listeners per event kind, shared by detector implementations.
#[derive(Default, Clone)]
pub struct ListenerTable {
    routes: Vec<(EventKind, Vec<ListenerHandle>)>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: EventKind, listener: ListenerHandle) -> bool {
        let position = match self.routes.iter().position(|(k, _)| *k == kind) {
            Some(position) => position,
            None => {
                self.routes.push((kind, Vec::new()));
                self.routes.len() - 1
            }
        };
        let listeners = &mut self.routes[position].1;
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn listeners_for(&self, kind: &EventKind) -> &[ListenerHandle] {
        self.routes
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, listeners)| listeners.as_slice())
            .unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.routes.iter().map(|(kind, _)| kind)
    }

    /// Delivers `event` to every listener of its kind, in registration order.
    pub fn dispatch(&self, event: &DetectionEvent<'_>, edits: &mut UnitEdits) -> Result<usize> {
        let listeners = self.listeners_for(event.kind);
        for listener in listeners {
            listener.on_event(event, edits)?;
        }
        Ok(listeners.len())
    }

    pub fn len(&self) -> usize {
        self.routes.iter().map(|(_, l)| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::languages::LanguageRegistry;
    use crate::model::Parser;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl DetectionListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_event(&self, event: &DetectionEvent<'_>, edits: &mut UnitEdits) -> Result<()> {
            self.seen.lock().unwrap().push(event.key.to_string());
            edits.insert(event.insertion_offset, "/*hit*/");
            Ok(())
        }
    }

    #[test]
    fn test_event_kind_constants() {
        assert_eq!(EventKind::METHOD_ENTRY, EventKind::from("method_entry"));
        assert_eq!(EventKind::CONSTRUCTOR_ENTRY.to_string(), "constructor_entry");
    }

    #[test]
    fn test_listener_table_dedups_handles() {
        let listener: ListenerHandle = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut table = ListenerTable::new();
        assert!(table.add(EventKind::METHOD_ENTRY, listener.clone()));
        assert!(!table.add(EventKind::METHOD_ENTRY, listener.clone()));
        assert!(table.add(EventKind::CONSTRUCTOR_ENTRY, listener));

        assert_eq!(table.len(), 2);
        assert_eq!(table.listeners_for(&EventKind::METHOD_ENTRY).len(), 1);
        assert!(table.listeners_for(&EventKind::new("other")).is_empty());
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut table = ListenerTable::new();
        table.add(EventKind::METHOD_ENTRY, recorder.clone());

        let parser = Parser::new(LanguageRegistry::new());
        let grammar = LanguageRegistry::new().get_by_name("java").unwrap();
        let parsed = parser.parse_source("class A {}", grammar).unwrap();
        let unit = CompilationUnit::new("A.java".into(), "A.java".into(), parsed);
        let mut edits = UnitEdits::new(false);

        let event = DetectionEvent {
            kind: &EventKind::METHOD_ENTRY,
            unit: &unit,
            node: unit.parsed.root_node(),
            key: "A",
            id: 1,
            insertion_offset: 9,
            indent: "",
        };
        assert_eq!(table.dispatch(&event, &mut edits).unwrap(), 1);

        let other = DetectionEvent {
            kind: &EventKind::CONSTRUCTOR_ENTRY,
            ..event
        };
        assert_eq!(table.dispatch(&other, &mut edits).unwrap(), 0);

        assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["A".to_string()]);
        assert_eq!(edits.edits().len(), 1);
    }
}
