//! Compiled stylesheets keyed by source file.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{CssSource, priority};

/// A compiled stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetEntry {
    pub code: Arc<str>,
    pub source_map: Option<String>,
    pub priority: u8,
}

/// Process-wide map from a component or stylesheet path to its CSS.
#[derive(Debug, Default)]
pub struct StylesheetCache {
    entries: RwLock<FxHashMap<String, StylesheetEntry>>,
}

impl StylesheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the stylesheet compiled from `id`, replacing any earlier one.
    pub fn insert(&self, id: impl Into<String>, code: impl Into<Arc<str>>, source_map: Option<String>) {
        let id = id.into();
        let entry = StylesheetEntry {
            code: code.into(),
            source_map,
            priority: priority(&id),
        };
        tracing::trace!(id = id.as_str(), priority = entry.priority, "stylesheet cached");
        self.entries.write().insert(id, entry);
    }

    pub fn get(&self, id: &str) -> Option<StylesheetEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<StylesheetEntry> {
        self.entries.write().remove(id)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached stylesheets for `ids`, ordered by ascending priority.
    ///
    /// Ids without an entry are skipped. The sort is stable, so ids of equal
    /// priority keep their dependency order.
    pub fn ordered_sources<S: AsRef<str>>(&self, ids: &[S]) -> CssSource {
        let entries = self.entries.read();
        let mut found: Vec<(u8, Arc<str>)> = ids
            .iter()
            .filter_map(|id| entries.get(id.as_ref()))
            .map(|entry| (entry.priority, entry.code.clone()))
            .collect();
        found.sort_by_key(|(priority, _)| *priority);
        CssSource::list(
            found
                .into_iter()
                .map(|(_, code)| CssSource::Literal(code))
                .collect::<Vec<_>>(),
        )
    }
}
