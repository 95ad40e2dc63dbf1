//! Canonicalization of import edges.
//!
//! Both backends report raw `(importee, importer)` pairs; this module decides
//! which identifier ends up in the dependency table. Keeping it in one pure
//! function is what makes the two backends record identical edges.

use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

const PACKAGE_DIR: &str = "node_modules";

/// Rules for turning a raw import into a canonical dependency identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// The framework's own runtime modules; never recorded.
    pub runtime_modules: Vec<String>,
    /// Component file extensions, e.g. `.svelte`.
    pub extensions: Vec<String>,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            runtime_modules: vec!["svelte".to_string(), "svelte/internal".to_string()],
            extensions: vec![".svelte".to_string()],
        }
    }
}

impl ResolutionPolicy {
    pub fn new(runtime_modules: Vec<String>, extensions: Vec<String>) -> Self {
        Self {
            runtime_modules,
            extensions,
        }
    }

    /// Resolve against the real filesystem.
    pub fn resolve(&self, importee: &str, importer: &str) -> Option<String> {
        self.resolve_with(importee, importer, &|path: &Path| path.exists())
    }

    /// Resolve an import edge, probing the filesystem through `exists`.
    ///
    /// Returns `None` when the importee is a framework runtime module.
    /// Otherwise, the first matching rule wins:
    ///
    /// 1. importee already points inside `node_modules`: verbatim
    /// 2. importer lives inside `node_modules`: relative importees resolve
    ///    against the importer's directory, bare ones stay verbatim
    /// 3. component importee with a matching package directory under the
    ///    project's `node_modules`: that directory path
    /// 4. stylesheet importee, or component importee from a component
    ///    importer: resolved against the importer's directory
    /// 5. anything else: verbatim
    pub fn resolve_with(
        &self,
        importee: &str,
        importer: &str,
        exists: &dyn Fn(&Path) -> bool,
    ) -> Option<String> {
        if self.runtime_modules.iter().any(|m| m == importee) {
            return None;
        }

        let importer_path = Path::new(strip_query(importer));
        let importer_dir = importer_path.parent().unwrap_or_else(|| Path::new(""));

        if importee.contains(PACKAGE_DIR) {
            return Some(importee.to_string());
        }

        if importer.contains(PACKAGE_DIR) {
            if is_path_like(importee) {
                return Some(join_clean(importer_dir, importee));
            }
            return Some(importee.to_string());
        }

        if self.is_component(importee) {
            let external = project_root(importer_path)
                .join(PACKAGE_DIR)
                .join(importee)
                .clean();
            if exists(&external) {
                return Some(external.to_string_lossy().into_owned());
            }
        }

        let importer_is_component = self.is_component(importer_path.to_string_lossy().as_ref());
        if is_stylesheet(importee) || (importer_is_component && self.is_component(importee)) {
            return Some(join_clean(importer_dir, importee));
        }

        Some(importee.to_string())
    }

    /// Whether `id` names a component file (query suffixes are ignored).
    pub fn is_component(&self, id: &str) -> bool {
        let id = strip_query(id);
        self.extensions.iter().any(|ext| id.ends_with(ext.as_str()))
    }
}

/// Whether `id` names a stylesheet.
pub fn is_stylesheet(id: &str) -> bool {
    strip_query(id).ends_with(".css")
}

/// Drop a `?query` suffix from a module id.
pub fn strip_query(id: &str) -> &str {
    match id.find('?') {
        Some(index) => &id[..index],
        None => id,
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/') || Path::new(specifier).is_absolute()
}

fn join_clean(dir: &Path, importee: &str) -> String {
    dir.join(importee).clean().to_string_lossy().into_owned()
}

/// Project root for an importer: everything before its last `src` component.
fn project_root(importer: &Path) -> PathBuf {
    let components: Vec<Component<'_>> = importer.components().collect();
    match components.iter().rposition(|c| c.as_os_str() == "src") {
        Some(index) => components[..index].iter().collect(),
        None => importer
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}
