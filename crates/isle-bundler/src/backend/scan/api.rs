//! Plugin registration API of the scan engine.
//!
//! Plugins receive a [`PluginBuild`] once per pass and register callbacks
//! filtered by a path regex and an optional namespace. Callbacks run in
//! registration order; the first resolve or load callback returning `Some`
//! wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use serde::Serialize;

/// Namespace of modules backed by real files.
pub const FILE_NAMESPACE: &str = "file";

pub type HookResult<T> = std::result::Result<T, PluginError>;

/// Error raised by a plugin callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{plugin}] {hook}: {message}")]
pub struct PluginError {
    pub plugin: String,
    pub hook: &'static str,
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl fmt::Display) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.to_string(),
        }
    }
}

/// How the contents of a module are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    /// Collected into a stylesheet emitted next to each entry.
    Css,
    Json,
    Text,
}

impl Loader {
    /// Default loader for a file extension.
    pub fn for_path(path: &str) -> Loader {
        match path.rsplit_once('.').map(|(_, ext)| ext) {
            Some("css") => Loader::Css,
            Some("json") => Loader::Json,
            Some("js" | "mjs" | "cjs") => Loader::Js,
            _ => Loader::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Unresolvable bare imports stay external.
    Node,
    Browser,
}

/// An entry module and the name its output is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Output name without extension, e.g. `components/Clock`. Derived from
    /// the path when absent.
    pub name: Option<String>,
    pub import: String,
}

impl EntryPoint {
    pub fn new(name: Option<String>, import: impl Into<String>) -> Self {
        Self {
            name,
            import: import.into(),
        }
    }
}

/// Options of one engine run. Plugins may edit them during setup.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub entry_points: Vec<EntryPoint>,
    pub working_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Base directory for `[dir]`.
    pub outbase: PathBuf,
    /// Entry output pattern (`[dir]`, `[name]`, `[hash]`), without `.js`.
    pub entry_names: String,
    /// Pattern for every other module (`[dir]`, `[name]`, `[ext]`, `[hash]`).
    pub chunk_names: String,
    pub platform: Platform,
    pub sourcemap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    EntryPoint,
    Import,
}

#[derive(Debug, Clone)]
pub struct OnResolveOptions {
    pub filter: Regex,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OnLoadOptions {
    pub filter: Regex,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveArgs {
    pub path: String,
    pub importer: Option<String>,
    pub namespace: String,
    pub resolve_dir: PathBuf,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    pub path: String,
    pub namespace: Option<String>,
    pub external: bool,
}

impl ResolveResult {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: None,
            external: false,
        }
    }

    pub fn namespaced(path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: Some(namespace.into()),
            external: false,
        }
    }

    pub fn external(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: None,
            external: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadArgs {
    pub path: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub contents: String,
    pub loader: Loader,
    pub resolve_dir: Option<PathBuf>,
}

impl LoadResult {
    pub fn js(contents: impl Into<String>, resolve_dir: Option<PathBuf>) -> Self {
        Self {
            contents: contents.into(),
            loader: Loader::Js,
            resolve_dir,
        }
    }
}

/// Per-output metadata reported after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metafile {
    /// Keyed by output path relative to the working directory.
    pub outputs: BTreeMap<String, MetafileOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetafileOutput {
    pub entry_point: Option<String>,
    pub inputs: Vec<String>,
    pub bytes: usize,
}

/// Passed to end callbacks once every output is on disk.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub metafile: Metafile,
    pub working_dir: PathBuf,
}

impl BuildResult {
    /// Absolute path of a metafile output key.
    pub fn output_path(&self, key: &str) -> PathBuf {
        self.working_dir.join(key)
    }
}

type StartCallback = Box<dyn Fn() -> HookResult<()> + Send + Sync>;
type ResolveCallback = Box<dyn Fn(&ResolveArgs) -> HookResult<Option<ResolveResult>> + Send + Sync>;
type LoadCallback = Box<dyn Fn(&LoadArgs) -> HookResult<Option<LoadResult>> + Send + Sync>;
type EndCallback = Box<dyn Fn(&BuildResult) -> HookResult<()> + Send + Sync>;

pub(crate) struct Registered<O, C> {
    pub plugin: String,
    pub options: O,
    pub callback: C,
}

/// Handed to [`ScanPlugin::setup`].
pub struct PluginBuild {
    pub initial_options: EngineOptions,
    plugin: String,
    pub(crate) start: Vec<Registered<(), StartCallback>>,
    pub(crate) resolvers: Vec<Registered<OnResolveOptions, ResolveCallback>>,
    pub(crate) loaders: Vec<Registered<OnLoadOptions, LoadCallback>>,
    pub(crate) end: Vec<Registered<(), EndCallback>>,
}

impl PluginBuild {
    pub(crate) fn new(initial_options: EngineOptions) -> Self {
        Self {
            initial_options,
            plugin: String::new(),
            start: Vec::new(),
            resolvers: Vec::new(),
            loaders: Vec::new(),
            end: Vec::new(),
        }
    }

    pub(crate) fn set_plugin(&mut self, name: &str) {
        self.plugin = name.to_string();
    }

    pub fn on_start<F>(&mut self, callback: F)
    where
        F: Fn() -> HookResult<()> + Send + Sync + 'static,
    {
        self.start.push(Registered {
            plugin: self.plugin.clone(),
            options: (),
            callback: Box::new(callback),
        });
    }

    pub fn on_resolve<F>(&mut self, options: OnResolveOptions, callback: F)
    where
        F: Fn(&ResolveArgs) -> HookResult<Option<ResolveResult>> + Send + Sync + 'static,
    {
        self.resolvers.push(Registered {
            plugin: self.plugin.clone(),
            options,
            callback: Box::new(callback),
        });
    }

    pub fn on_load<F>(&mut self, options: OnLoadOptions, callback: F)
    where
        F: Fn(&LoadArgs) -> HookResult<Option<LoadResult>> + Send + Sync + 'static,
    {
        self.loaders.push(Registered {
            plugin: self.plugin.clone(),
            options,
            callback: Box::new(callback),
        });
    }

    pub fn on_end<F>(&mut self, callback: F)
    where
        F: Fn(&BuildResult) -> HookResult<()> + Send + Sync + 'static,
    {
        self.end.push(Registered {
            plugin: self.plugin.clone(),
            options: (),
            callback: Box::new(callback),
        });
    }
}

impl fmt::Debug for PluginBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBuild")
            .field("initial_options", &self.initial_options)
            .field("resolvers", &self.resolvers.len())
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

pub(crate) fn matches(filter: &Regex, namespace: &Option<String>, path: &str, ns: &str) -> bool {
    namespace.as_deref().is_none_or(|wanted| wanted == ns) && filter.is_match(path)
}

/// A scan-engine plugin.
pub trait ScanPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn setup(&self, build: &mut PluginBuild) -> HookResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_errors_name_plugin_and_hook() {
        let err = PluginError::new("isle", "onLoad", "boom");
        assert_eq!(err.to_string(), "[isle] onLoad: boom");
    }

    #[test]
    fn default_loaders_follow_extensions() {
        assert_eq!(Loader::for_path("/p/a.css"), Loader::Css);
        assert_eq!(Loader::for_path("/p/a.mjs"), Loader::Js);
        assert_eq!(Loader::for_path("/p/data.json"), Loader::Json);
        assert_eq!(Loader::for_path("/p/README"), Loader::Text);
    }

    #[test]
    fn filters_respect_namespace() {
        let filter = Regex::new(r"\.svelte$").unwrap();
        let any = None;
        let file = Some(FILE_NAMESPACE.to_string());
        assert!(matches(&filter, &any, "/a.svelte", "isle-entry"));
        assert!(matches(&filter, &file, "/a.svelte", FILE_NAMESPACE));
        assert!(!matches(&filter, &file, "/a.svelte", "isle-entry"));
        assert!(!matches(&filter, &any, "/a.js", FILE_NAMESPACE));
    }
}
