//! Mapping from component names to their emitted artifacts.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use crate::hydration::{ComponentLookup, ComponentPaths};
use crate::layout::{BuildType, CLIENT_COMPONENTS_DIR, ProjectLayout, component_name};

/// Artifacts of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub ssr: PathBuf,
    /// Public URL of the hydration bundle; components outside
    /// `src/components` have none.
    pub client: Option<String>,
}

/// Component name → artifacts, built from the emitted output trees.
#[derive(Debug, Clone, Default)]
pub struct ComponentManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl ComponentManifest {
    /// Scan the output trees of a finished build.
    ///
    /// Server modules are found at `<ssr_dir>/<entry>.js`. Client bundles
    /// carry a content hash (`<entry>.<hash>.js`), so the client tree is
    /// walked and matched back to entry names. When two components share a
    /// name the first in source order wins.
    pub fn scan(layout: &ProjectLayout, extensions: &[String]) -> Self {
        let client = client_bundles(layout);
        let mut entries = BTreeMap::new();

        for source in layout.entries(BuildType::Ssr, extensions) {
            let entry_name = layout.entry_name(&source);
            let ssr = layout.ssr_dir.join(format!("{entry_name}.js"));
            if !ssr.is_file() {
                tracing::debug!(path = %ssr.display(), "server module missing");
                continue;
            }
            let name = component_name(&entry_name, extensions);
            if entries.contains_key(&name) {
                tracing::warn!(component = name.as_str(), "duplicate component name");
                continue;
            }
            entries.insert(
                name,
                ManifestEntry {
                    ssr,
                    client: client.get(&entry_name).cloned(),
                },
            );
        }

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ComponentLookup for ComponentManifest {
    fn lookup(&self, name: &str) -> Option<ComponentPaths> {
        let entry = self.entries.get(name)?;
        Some(ComponentPaths {
            ssr: entry.ssr.clone(),
            client: entry.client.clone().unwrap_or_default(),
        })
    }
}

/// Entry name → public URL of its hashed client bundle.
fn client_bundles(layout: &ProjectLayout) -> FxHashMap<String, String> {
    let root = layout.client_components_dir();
    let public_root = layout
        .client_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut bundles = FxHashMap::default();
    for entry in WalkDir::new(&root).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = slash_path(entry.path().strip_prefix(&root).unwrap_or(entry.path()));
        let Some(stem) = relative.strip_suffix(".js") else {
            continue;
        };
        let Some((entry_name, _hash)) = stem.rsplit_once('.') else {
            continue;
        };
        if entry_name.starts_with("chunks/") {
            continue;
        }
        bundles.insert(
            entry_name.to_string(),
            format!("/{public_root}/{CLIENT_COMPONENTS_DIR}/{relative}"),
        );
    }
    bundles
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: PathBuf) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn maps_components_to_both_trees() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::new(temp.path(), "src", ".isle/compiled", "public/_isle");
        let svelte = vec![".svelte".to_string()];

        touch(layout.src.join("components/Clock.svelte"));
        touch(layout.src.join("routes/Home.svelte"));
        touch(layout.ssr_dir.join("components/Clock.js"));
        touch(layout.ssr_dir.join("routes/Home.js"));
        touch(layout.client_components_dir().join("components/Clock.1a2b3c4d.js"));
        touch(layout.client_components_dir().join("chunks/shared.99999999.js"));

        let manifest = ComponentManifest::scan(&layout, &svelte);
        assert_eq!(manifest.names().collect::<Vec<_>>(), vec!["Clock", "Home"]);

        let clock = manifest.lookup("Clock").unwrap();
        assert_eq!(clock.ssr, layout.ssr_dir.join("components/Clock.js"));
        assert_eq!(clock.client, "/_isle/islands/components/Clock.1a2b3c4d.js");

        assert_eq!(manifest.get("Home").unwrap().client, None);
        assert!(manifest.lookup("Missing").is_none());
    }

    #[test]
    fn unbuilt_components_are_skipped() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::new(temp.path(), "src", "out", "public");
        touch(layout.src.join("components/Clock.svelte"));

        let manifest = ComponentManifest::scan(&layout, &[".svelte".to_string()]);
        assert!(manifest.is_empty());
    }
}
