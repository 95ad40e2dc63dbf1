//! Flattening of nested stylesheet structures into one string.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::CssSource;

/// Flattens [`CssSource`] trees, deduplicating repeated fragments.
///
/// Literals are deduplicated by value, lists and getters by identity. Results
/// are memoized per top-level input; the memo keeps the input alive so its
/// address cannot be reused while cached.
#[derive(Default)]
pub struct CssAggregator {
    memo: Mutex<FxHashMap<usize, (CssSource, String)>>,
}

impl CssAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate every distinct literal reachable from `source`, in
    /// traversal order, with no separator.
    pub fn collect(&self, source: &CssSource) -> String {
        let key = source.identity();
        if let Some((_, cached)) = self.memo.lock().get(&key) {
            return cached.clone();
        }

        let flattened = flatten(source);
        self.memo
            .lock()
            .insert(key, (source.clone(), flattened.clone()));
        flattened
    }

    /// Drop every memoized result.
    pub fn clear(&self) {
        self.memo.lock().clear();
    }

    pub fn memoized(&self) -> usize {
        self.memo.lock().len()
    }
}

impl std::fmt::Debug for CssAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CssAggregator")
            .field("memoized", &self.memoized())
            .finish()
    }
}

#[derive(Default)]
struct Visited {
    literals: FxHashSet<std::sync::Arc<str>>,
    nodes: FxHashSet<usize>,
}

/// Flatten `source` without consulting or filling any memo.
pub fn flatten(source: &CssSource) -> String {
    let mut out = String::new();
    let mut visited = Visited::default();
    walk(source, &mut visited, &mut out);
    out
}

fn walk(source: &CssSource, visited: &mut Visited, out: &mut String) {
    match source {
        CssSource::Literal(text) => {
            if visited.literals.insert(text.clone()) {
                out.push_str(text);
            }
        }
        CssSource::List(items) => {
            if !visited.nodes.insert(source.identity()) {
                return;
            }
            for item in items.iter() {
                walk(item, visited, out);
            }
        }
        CssSource::Thunk(getter) => {
            if !visited.nodes.insert(source.identity()) {
                return;
            }
            let value = getter();
            walk(&value, visited, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn duplicates_are_emitted_once() {
        let aggregator = CssAggregator::new();
        let source = CssSource::list(vec![
            CssSource::literal(".a{}"),
            CssSource::list(vec![CssSource::literal(".b{}"), CssSource::literal(".a{}")]),
        ]);
        assert_eq!(aggregator.collect(&source), ".a{}.b{}");
    }

    #[test]
    fn thunks_are_evaluated_in_place() {
        let aggregator = CssAggregator::new();
        let button = CssSource::thunk(|| CssSource::list(vec![CssSource::literal(".btn{}")]));
        let source = CssSource::list(vec![
            CssSource::literal(".page{}"),
            button.clone(),
            button,
        ]);
        assert_eq!(aggregator.collect(&source), ".page{}.btn{}");
    }

    #[test]
    fn shared_lists_are_walked_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = CssSource::thunk(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            CssSource::literal(".x{}")
        });
        let shared = CssSource::list(vec![inner]);
        let source = CssSource::list(vec![shared.clone(), shared]);

        assert_eq!(CssAggregator::new().collect(&source), ".x{}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn results_are_memoized_by_identity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = CssSource::thunk(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            CssSource::literal(".y{}")
        });

        let aggregator = CssAggregator::new();
        assert_eq!(aggregator.collect(&source), ".y{}");
        assert_eq!(aggregator.collect(&source), ".y{}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        aggregator.clear();
        assert_eq!(aggregator.collect(&source), ".y{}");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_structure_yields_empty_string() {
        assert_eq!(CssAggregator::new().collect(&CssSource::list(vec![])), "");
    }
}
