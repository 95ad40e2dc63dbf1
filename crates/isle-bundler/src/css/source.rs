//! Nested, lazily evaluated stylesheet structures.

use std::fmt;
use std::sync::Arc;

/// A stylesheet fragment as exposed by compiled modules.
///
/// Server modules export a `_css` accessor returning their own style plus the
/// accessors of everything they import, so the structure is a tree of
/// literals, ordered lists, and deferred getters. Lists and thunks are shared
/// through `Arc`, which gives every node a stable identity.
#[derive(Clone)]
pub enum CssSource {
    /// Stylesheet text.
    Literal(Arc<str>),
    /// An ordered collection of fragments.
    List(Arc<[CssSource]>),
    /// A zero-argument getter evaluated when flattened.
    Thunk(Arc<dyn Fn() -> CssSource + Send + Sync>),
}

impl CssSource {
    pub fn literal(text: impl Into<Arc<str>>) -> Self {
        CssSource::Literal(text.into())
    }

    pub fn list(items: impl Into<Vec<CssSource>>) -> Self {
        CssSource::List(Arc::from(items.into()))
    }

    pub fn thunk<F>(getter: F) -> Self
    where
        F: Fn() -> CssSource + Send + Sync + 'static,
    {
        CssSource::Thunk(Arc::new(getter))
    }

    /// Address of the shared allocation behind this node.
    pub(crate) fn identity(&self) -> usize {
        match self {
            CssSource::Literal(text) => Arc::as_ptr(text) as *const u8 as usize,
            CssSource::List(items) => Arc::as_ptr(items) as *const CssSource as usize,
            CssSource::Thunk(getter) => Arc::as_ptr(getter) as *const () as usize,
        }
    }
}

impl fmt::Debug for CssSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CssSource::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            CssSource::List(items) => f.debug_tuple("List").field(items).finish(),
            CssSource::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl From<&str> for CssSource {
    fn from(text: &str) -> Self {
        CssSource::literal(text)
    }
}

impl From<String> for CssSource {
    fn from(text: String) -> Self {
        CssSource::literal(text)
    }
}

impl From<Vec<CssSource>> for CssSource {
    fn from(items: Vec<CssSource>) -> Self {
        CssSource::list(items)
    }
}
