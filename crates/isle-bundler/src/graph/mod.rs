//! Cross-file dependency table.
//!
//! Maps every importer to the ordered set of canonical identifiers it pulls
//! in. The table is populated while modules are loaded and transformed, and
//! queried once per pass to order stylesheets.

pub mod policy;

use indexmap::IndexSet;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

pub use policy::{ResolutionPolicy, is_stylesheet, strip_query};

/// Process-wide importer → importees table.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: RwLock<FxHashMap<String, IndexSet<String>>>,
    policy: ResolutionPolicy,
}

impl DependencyGraph {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self {
            edges: RwLock::new(FxHashMap::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Record that `importer` depends on `importee`.
    ///
    /// Without an importer (entry points) nothing is recorded.
    pub fn log_dependency(&self, importee: &str, importer: Option<&str>) {
        let Some(importer) = importer else {
            return;
        };
        let Some(resolved) = self.policy.resolve(importee, importer) else {
            return;
        };
        self.record(importer, resolved);
    }

    /// Insert an already canonical edge.
    pub fn record(&self, importer: &str, importee: String) {
        let importer = strip_query(importer);
        tracing::trace!(importer, importee = importee.as_str(), "dependency");
        self.edges
            .write()
            .entry(importer.to_string())
            .or_default()
            .insert(importee);
    }

    /// The file itself followed by a depth-first, pre-order expansion of
    /// everything it depends on. Each identifier appears once, cycles end the
    /// walk, and self-edges are ignored.
    pub fn get_dependencies(&self, file: &str) -> Vec<String> {
        let file = strip_query(file);
        let edges = self.edges.read();

        let mut order = vec![file.to_string()];
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        visited.insert(file);

        // explicit stack of (importer, next child index)
        let mut stack: Vec<(&str, usize)> = vec![(file, 0)];
        while let Some((node, index)) = stack.last_mut() {
            let children = edges.get(*node);
            let next = children.and_then(|set| set.get_index(*index));
            match next {
                Some(child) => {
                    *index += 1;
                    if visited.insert(child.as_str()) {
                        order.push(child.clone());
                        stack.push((child.as_str(), 0));
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }

        order
    }

    /// Direct dependencies recorded for `file`, in insertion order.
    pub fn dependencies_of(&self, file: &str) -> Vec<String> {
        self.edges
            .read()
            .get(strip_query(file))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget what `file` imports. Its appearances as somebody else's
    /// dependency are kept.
    pub fn invalidate(&self, file: &str) {
        if let Some(set) = self.edges.write().get_mut(strip_query(file)) {
            set.clear();
        }
    }

    /// Clear the whole table.
    pub fn reset(&self) {
        self.edges.write().clear();
    }

    /// Number of importers with recorded edges.
    pub fn len(&self) -> usize {
        self.edges.read().values().filter(|set| !set.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_expanded_deepest_last() {
        let graph = DependencyGraph::default();
        graph.log_dependency("b.js", Some("c.js"));
        graph.log_dependency("a.js", Some("b.js"));

        assert_eq!(graph.get_dependencies("c.js"), vec!["c.js", "b.js", "a.js"]);
    }

    #[test]
    fn cycles_terminate_without_duplicates() {
        let graph = DependencyGraph::default();
        graph.log_dependency("b.js", Some("c.js"));
        graph.log_dependency("a.js", Some("b.js"));
        graph.log_dependency("b.js", Some("a.js"));

        assert_eq!(graph.get_dependencies("c.js"), vec!["c.js", "b.js", "a.js"]);
        assert_eq!(graph.get_dependencies("a.js"), vec!["a.js", "b.js"]);
    }

    #[test]
    fn self_edges_are_ignored() {
        let graph = DependencyGraph::default();
        graph.log_dependency("a.js", Some("a.js"));
        assert_eq!(graph.get_dependencies("a.js"), vec!["a.js"]);
    }

    #[test]
    fn expansion_is_pre_order() {
        let graph = DependencyGraph::default();
        graph.log_dependency("left.js", Some("root.js"));
        graph.log_dependency("right.js", Some("root.js"));
        graph.log_dependency("deep.js", Some("left.js"));

        assert_eq!(
            graph.get_dependencies("root.js"),
            vec!["root.js", "left.js", "deep.js", "right.js"]
        );
    }

    #[test]
    fn missing_importer_records_nothing() {
        let graph = DependencyGraph::default();
        graph.log_dependency("a.js", None);
        assert!(graph.is_empty());
    }

    #[test]
    fn invalidate_clears_only_the_file_set() {
        let graph = DependencyGraph::default();
        graph.log_dependency("b.js", Some("c.js"));
        graph.log_dependency("a.js", Some("b.js"));

        graph.invalidate("b.js");

        assert!(graph.dependencies_of("b.js").is_empty());
        assert_eq!(graph.dependencies_of("c.js"), vec!["b.js"]);
        assert_eq!(graph.get_dependencies("c.js"), vec!["c.js", "b.js"]);

        graph.reset();
        assert!(graph.is_empty());
    }

    #[test]
    fn queries_are_stripped_from_importers() {
        let graph = DependencyGraph::default();
        graph.record("/p/src/A.svelte?isle_entry", "/p/src/B.svelte".to_string());
        assert_eq!(
            graph.get_dependencies("/p/src/A.svelte"),
            vec!["/p/src/A.svelte", "/p/src/B.svelte"]
        );
    }
}
