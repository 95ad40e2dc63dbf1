//! Process-wide build state shared by both backends and the builder.

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::css::{CssAggregator, CssSource, StylesheetCache};
use crate::graph::{DependencyGraph, ResolutionPolicy, strip_query};

/// The dependency graph, stylesheet cache and aggregation memo for one
/// process.
///
/// Created once at startup and handed to every backend by `Arc`. The
/// `reset` and `invalidate` methods are the only ways to remove data; the
/// backends add to it while loading and transforming modules.
#[derive(Debug, Default)]
pub struct BuildState {
    pub graph: DependencyGraph,
    pub stylesheets: StylesheetCache,
    pub aggregator: CssAggregator,
    /// Last ordered stylesheet list per entry set. Handing the aggregator
    /// the same node while the fragments are unchanged lets it hit its memo.
    sources: Mutex<FxHashMap<Vec<String>, CssSource>>,
}

impl BuildState {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self {
            graph: DependencyGraph::new(policy),
            stylesheets: StylesheetCache::new(),
            aggregator: CssAggregator::new(),
            sources: Mutex::default(),
        }
    }

    pub fn shared(policy: ResolutionPolicy) -> Arc<Self> {
        Arc::new(Self::new(policy))
    }

    /// Start of a build pass: aggregation results never outlive a pass.
    pub fn begin_pass(&self) {
        self.forget_aggregates();
    }

    /// Forget everything, as on a configuration change.
    pub fn reset(&self) {
        tracing::debug!("resetting dependency graph and stylesheet cache");
        self.graph.reset();
        self.stylesheets.clear();
        self.forget_aggregates();
    }

    /// Forget what a changed file imports and the stylesheets compiled from
    /// it. Edges pointing at the file are kept.
    pub fn invalidate(&self, file: &str) {
        let file = strip_query(file);
        self.graph.invalidate(file);
        self.stylesheets.remove(file);
        self.stylesheets.remove(&format!("{file}.css"));
        self.forget_aggregates();
    }

    /// Every stylesheet reachable from `entry`, flattened in precedence order.
    pub fn component_css(&self, entry: &str) -> String {
        self.stylesheet_for(&[entry])
    }

    /// The global stylesheet: everything reachable from any of `entries`.
    pub fn global_stylesheet<S: AsRef<str>>(&self, entries: &[S]) -> String {
        self.stylesheet_for(entries)
    }

    fn stylesheet_for<S: AsRef<str>>(&self, entries: &[S]) -> String {
        let ids: IndexSet<String> = entries
            .iter()
            .flat_map(|entry| self.graph.get_dependencies(entry.as_ref()))
            .collect();
        let ids: Vec<String> = ids.into_iter().collect();
        let fresh = self.stylesheets.ordered_sources(&ids);

        let key: Vec<String> = entries.iter().map(|entry| entry.as_ref().to_string()).collect();
        let source = {
            let mut sources = self.sources.lock();
            match sources.get(&key) {
                Some(cached) if same_fragments(cached, &fresh) => cached.clone(),
                _ => {
                    sources.insert(key, fresh.clone());
                    fresh
                }
            }
        };
        self.aggregator.collect(&source)
    }

    fn forget_aggregates(&self) {
        self.sources.lock().clear();
        self.aggregator.clear();
    }
}

/// Both lists hold the same stylesheet allocations in the same order.
fn same_fragments(a: &CssSource, b: &CssSource) -> bool {
    let (CssSource::List(a), CssSource::List(b)) = (a, b) else {
        return false;
    };
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|pair| match pair {
            (CssSource::Literal(a), CssSource::Literal(b)) => Arc::ptr_eq(a, b),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> BuildState {
        let state = BuildState::default();
        let home = "/p/src/routes/Home.svelte";
        let card = "/p/src/components/Card.svelte";
        state.graph.record(home, format!("{home}.css"));
        state.graph.record(home, card.to_string());
        state.graph.record(card, format!("{card}.css"));
        state.stylesheets.insert(format!("{home}.css"), ".home{}", None);
        state.stylesheets.insert(format!("{card}.css"), ".card{}", None);
        state
    }

    #[test]
    fn component_css_orders_components_before_routes() {
        let state = seeded();
        assert_eq!(state.component_css("/p/src/routes/Home.svelte"), ".card{}.home{}");
        assert_eq!(state.component_css("/p/src/components/Card.svelte"), ".card{}");
    }

    #[test]
    fn global_stylesheet_deduplicates_across_entries() {
        let state = seeded();
        let css = state.global_stylesheet(&[
            "/p/src/components/Card.svelte",
            "/p/src/routes/Home.svelte",
        ]);
        assert_eq!(css, ".card{}.home{}");
    }

    #[test]
    fn invalidate_drops_own_stylesheet() {
        let state = seeded();
        state.invalidate("/p/src/components/Card.svelte");
        assert_eq!(state.component_css("/p/src/routes/Home.svelte"), ".home{}");

        state.reset();
        assert_eq!(state.aggregator.memoized(), 0);
        assert!(state.graph.is_empty());
        assert!(state.stylesheets.is_empty());
    }

    #[test]
    fn repeated_lookups_reuse_the_memo() {
        let state = seeded();
        let home = "/p/src/routes/Home.svelte";
        for _ in 0..3 {
            assert_eq!(state.component_css(home), ".card{}.home{}");
        }
        assert_eq!(state.aggregator.memoized(), 1);

        state.component_css("/p/src/components/Card.svelte");
        assert_eq!(state.aggregator.memoized(), 2);

        state.begin_pass();
        assert_eq!(state.aggregator.memoized(), 0);
    }

    #[test]
    fn recompiled_stylesheets_are_picked_up() {
        let state = seeded();
        let home = "/p/src/routes/Home.svelte";
        assert_eq!(state.component_css(home), ".card{}.home{}");

        state
            .stylesheets
            .insert("/p/src/routes/Home.svelte.css", ".home{color:red}", None);
        assert_eq!(state.component_css(home), ".card{}.home{color:red}");
    }
}
