//! Project layout: where sources live and where each build type writes.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Relative path of the global stylesheet inside both output trees.
pub const GLOBAL_STYLESHEET: &str = "assets/style.css";

/// Directory (inside the client tree) holding hydration bundles.
pub const CLIENT_COMPONENTS_DIR: &str = "islands";

/// Suffix appended to every emitted file's source map.
pub const SOURCE_MAP_SUFFIX: &str = ".map";

/// The two artifact sets produced from the same component sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    /// Server-rendering bundle, required by the page renderer.
    Ssr,
    /// Client-hydration bundle, loaded by the browser runtime.
    Client,
}

impl BuildType {
    /// Both build types, server first.
    pub const ALL: [BuildType; 2] = [BuildType::Ssr, BuildType::Client];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::Ssr => "ssr",
            BuildType::Client => "client",
        }
    }

    /// Value substituted for `process.env.componentType`.
    pub fn component_type(self) -> &'static str {
        match self {
            BuildType::Ssr => "server",
            BuildType::Client => "client",
        }
    }

    pub fn is_ssr(self) -> bool {
        matches!(self, BuildType::Ssr)
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute locations of a project's sources and output trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub src: PathBuf,
    pub ssr_dir: PathBuf,
    pub client_dir: PathBuf,
}

impl ProjectLayout {
    /// Create a layout. Relative `src`, `ssr_dir` and `client_dir` are
    /// resolved against `root`; a relative `root` against the current dir.
    pub fn new(
        root: impl AsRef<Path>,
        src: impl AsRef<Path>,
        ssr_dir: impl AsRef<Path>,
        client_dir: impl AsRef<Path>,
    ) -> Self {
        let root = absolutize(root.as_ref());
        Self {
            src: root.join(src.as_ref()).clean(),
            ssr_dir: root.join(ssr_dir.as_ref()).clean(),
            client_dir: root.join(client_dir.as_ref()).clean(),
            root,
        }
    }

    /// Directory a build type emits its modules into.
    pub fn out_dir(&self, build_type: BuildType) -> PathBuf {
        match build_type {
            BuildType::Ssr => self.ssr_dir.clone(),
            BuildType::Client => self.client_components_dir(),
        }
    }

    pub fn client_components_dir(&self) -> PathBuf {
        self.client_dir.join(CLIENT_COMPONENTS_DIR)
    }

    /// The global stylesheet, duplicated into the server and client trees.
    pub fn global_stylesheets(&self) -> [PathBuf; 2] {
        [
            self.ssr_dir.join(GLOBAL_STYLESHEET),
            self.client_dir.join(GLOBAL_STYLESHEET),
        ]
    }

    /// Outputs deleted when a pass of `build_type` starts.
    pub fn stale_outputs(&self, build_type: BuildType) -> Vec<PathBuf> {
        match build_type {
            BuildType::Ssr => vec![
                self.ssr_dir.clone(),
                self.client_dir.join("assets"),
                self.client_dir.join("props"),
            ],
            BuildType::Client => vec![self.client_components_dir()],
        }
    }

    /// Component entry points for a build type.
    ///
    /// Every file under `src` carrying one of `extensions` is an entry for the
    /// server build; the client build only hydrates `src/components`. The
    /// result is sorted so repeated builds see the same order.
    pub fn entries(&self, build_type: BuildType, extensions: &[String]) -> Vec<PathBuf> {
        let components = self.src.join("components");
        let mut entries: Vec<PathBuf> = WalkDir::new(&self.src)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_extension(path, extensions))
            .filter(|path| !path.components().any(|c| c.as_os_str() == "node_modules"))
            .filter(|path| build_type.is_ssr() || path.starts_with(&components))
            .collect();
        entries.sort();
        entries
    }

    /// Output name (without extension) for an entry: its path relative to
    /// `src` with the extension removed, always using `/` separators.
    pub fn entry_name(&self, entry: &Path) -> String {
        let relative = entry.strip_prefix(&self.src).unwrap_or(entry);
        let stem = relative.with_extension("");
        stem.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Whether `path` ends with one of the framework `extensions` (".svelte").
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let name = path.to_string_lossy();
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}

/// Name of a component derived from a source or output path.
///
/// Strips the framework extension and `.js`, then keeps the last `/` segment:
/// `src/components/Clock.svelte` and `components/Clock.js` both yield `Clock`.
pub fn component_name(path: &str, extensions: &[String]) -> String {
    let mut out = path.replace('\\', "/");
    for ext in extensions {
        out = out.replacen(ext.as_str(), "", 1);
    }
    out = out.replacen(".js", "", 1);
    match out.rsplit_once('/') {
        Some((_, last)) => last.to_string(),
        None => out,
    }
}

/// Short content hash used in client file names.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    hash.to_hex()[..8].to_string()
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf().clean()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
            .clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn svelte() -> Vec<String> {
        vec![".svelte".to_string()]
    }

    #[test]
    fn component_name_strips_extension_and_directories() {
        assert_eq!(component_name("src/components/Clock.svelte", &svelte()), "Clock");
        assert_eq!(component_name("components/Clock.js", &svelte()), "Clock");
        assert_eq!(component_name("Clock", &svelte()), "Clock");
    }

    #[test]
    fn layout_resolves_relative_dirs_against_root() {
        let layout = ProjectLayout::new("/site", "src", ".isle/compiled", "public/_isle");
        assert_eq!(layout.src, PathBuf::from("/site/src"));
        assert_eq!(layout.ssr_dir, PathBuf::from("/site/.isle/compiled"));
        assert_eq!(
            layout.global_stylesheets(),
            [
                PathBuf::from("/site/.isle/compiled/assets/style.css"),
                PathBuf::from("/site/public/_isle/assets/style.css"),
            ]
        );
        assert_eq!(
            layout.out_dir(BuildType::Client),
            PathBuf::from("/site/public/_isle/islands")
        );
    }

    #[test]
    fn client_entries_are_limited_to_components() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        for rel in [
            "components/Clock.svelte",
            "components/nested/Menu.svelte",
            "routes/home/Home.svelte",
            "layouts/Layout.svelte",
            "routes/home/data.js",
        ] {
            let path = src.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "").unwrap();
        }

        let layout = ProjectLayout::new(temp.path(), "src", "out", "public");
        let ssr = layout.entries(BuildType::Ssr, &svelte());
        let client = layout.entries(BuildType::Client, &svelte());

        assert_eq!(ssr.len(), 4);
        assert_eq!(client.len(), 2);
        assert!(client.iter().all(|p| p.starts_with(src.join("components"))));
        assert_eq!(layout.entry_name(&client[0]), "components/Clock");
        assert_eq!(layout.entry_name(&client[1]), "components/nested/Menu");
    }

    #[test]
    fn content_hash_is_short_and_stable() {
        let a = content_hash(b"export default 1;");
        assert_eq!(a.len(), 8);
        assert_eq!(a, content_hash(b"export default 1;"));
        assert_ne!(a, content_hash(b"export default 2;"));
    }
}
