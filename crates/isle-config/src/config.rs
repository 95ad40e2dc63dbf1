//! The project configuration model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use isle_bundler::dev::{DevOptions, ServerOptions};
use isle_bundler::{BackendKind, BuildInvocation, ExternalCompiler, Framework, ProjectLayout};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::dev::DevConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsleConfig {
    /// Project root; relative paths resolve against the directory the
    /// configuration was loaded from.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default = "default_src_dir")]
    pub src_dir: PathBuf,

    /// Server-rendering output, relative to the root.
    #[serde(default = "default_ssr_dir")]
    pub ssr_dir: PathBuf,

    /// Client output, relative to the root. Its last component is the public
    /// URL prefix of hydration bundles.
    #[serde(default = "default_client_dir")]
    pub client_dir: PathBuf,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub production: bool,

    /// Literal replacements applied to every module.
    #[serde(default)]
    pub replacements: IndexMap<String, String>,

    #[serde(default)]
    pub extra_entries: Vec<PathBuf>,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub framework: FrameworkConfig,

    #[serde(default)]
    pub dev: DevConfig,
}

/// External component compiler. Without a command the built-in block
/// compiler is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkConfig {
    #[serde(default = "default_framework_name")]
    pub name: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub adapter_path: Option<String>,
    #[serde(default = "default_package_field")]
    pub package_field: String,
    #[serde(default = "default_runtime_modules")]
    pub runtime_modules: Vec<String>,
}

impl Default for IsleConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            src_dir: default_src_dir(),
            ssr_dir: default_ssr_dir(),
            client_dir: default_client_dir(),
            backend: BackendKind::default(),
            production: false,
            replacements: IndexMap::new(),
            extra_entries: Vec::new(),
            compiler: CompilerConfig::default(),
            framework: FrameworkConfig::default(),
            dev: DevConfig::default(),
        }
    }
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            name: default_framework_name(),
            extensions: default_extensions(),
            adapter_path: None,
            package_field: default_package_field(),
            runtime_modules: default_runtime_modules(),
        }
    }
}

impl From<&FrameworkConfig> for Framework {
    fn from(config: &FrameworkConfig) -> Self {
        Framework {
            name: config.name.clone(),
            extensions: config.extensions.clone(),
            adapter_path: config.adapter_path.clone(),
            package_field: config.package_field.clone(),
            runtime_modules: config.runtime_modules.clone(),
        }
    }
}

impl IsleConfig {
    /// Make `root_dir` absolute against `base`.
    pub(crate) fn anchor(mut self, base: &Path) -> Self {
        self.root_dir = base.join(&self.root_dir).clean();
        self
    }

    /// Absolute locations of sources and outputs.
    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.root_dir, &self.src_dir, &self.ssr_dir, &self.client_dir)
    }

    /// The bundler invocation this configuration describes.
    pub fn invocation(&self, watch: bool) -> BuildInvocation {
        let layout = self.layout();
        let mut invocation = BuildInvocation::new(layout.clone())
            .with_watch(watch)
            .with_backend(self.backend);
        invocation.production = self.production;
        invocation.replacements = self.replacements.clone();
        invocation.framework = Framework::from(&self.framework);
        invocation.extra_entries = self
            .extra_entries
            .iter()
            .map(|entry| layout.root.join(entry).clean())
            .collect();
        invocation.ignore = self.dev.ignore.clone();
        invocation.debounce_ms = self.dev.debounce_ms;
        if let Some(command) = &self.compiler.command {
            invocation.compiler = Some(Arc::new(ExternalCompiler::new(
                command.clone(),
                self.compiler.args.clone(),
            )));
        }
        invocation
    }

    /// Options for the dev server child process.
    pub fn server_options(&self) -> ServerOptions {
        let layout = self.layout();
        let mut options = ServerOptions::new(
            self.dev.runtime.clone(),
            layout.src.join(&self.dev.server_entry).clean(),
            layout.root.clone(),
        );
        options.restart_delay = Duration::from_millis(self.dev.restart_delay_ms);
        options
    }

    /// Everything a dev session needs. `config_file` is watched for changes.
    pub fn dev_options(&self, config_file: Option<PathBuf>) -> DevOptions {
        let root = self.layout().root;
        DevOptions {
            invocation: self.invocation(true),
            server: self.server_options(),
            config_file,
            watch_paths: self
                .dev
                .watch_paths
                .iter()
                .map(|path| root.join(path).clean())
                .collect(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_ssr_dir() -> PathBuf {
    PathBuf::from(".isle/compiled")
}

fn default_client_dir() -> PathBuf {
    PathBuf::from("public/_isle")
}

fn default_framework_name() -> String {
    "svelte".into()
}

fn default_extensions() -> Vec<String> {
    vec![".svelte".into()]
}

fn default_package_field() -> String {
    "svelte".into()
}

fn default_runtime_modules() -> Vec<String> {
    vec!["svelte".into(), "svelte/internal".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bundler_framework() {
        let config = IsleConfig::default();
        assert_eq!(Framework::from(&config.framework), Framework::svelte());
        assert_eq!(config.backend, BackendKind::Rolldown);
    }

    #[test]
    fn layout_is_anchored_at_the_root() {
        let config = IsleConfig::default().anchor(Path::new("/site"));
        let layout = config.layout();
        assert_eq!(layout.src, PathBuf::from("/site/src"));
        assert_eq!(layout.ssr_dir, PathBuf::from("/site/.isle/compiled"));
        assert_eq!(layout.client_dir, PathBuf::from("/site/public/_isle"));
    }

    #[test]
    fn invocation_carries_compiler_and_entries() {
        let mut config = IsleConfig::default().anchor(Path::new("/site"));
        config.compiler.command = Some("svelte-compile".into());
        config.extra_entries = vec![PathBuf::from("lib/Widget.svelte")];
        config.replacements.insert("__VERSION__".into(), "\"1\"".into());

        let invocation = config.invocation(false);
        assert!(invocation.compiler.is_some());
        assert_eq!(invocation.extra_entries, vec![PathBuf::from("/site/lib/Widget.svelte")]);
        assert_eq!(invocation.replacements["__VERSION__"], "\"1\"");
        assert!(!invocation.watch);
    }

    #[test]
    fn server_entry_lives_under_src() {
        let config = IsleConfig::default().anchor(Path::new("/site"));
        let server = config.server_options();
        assert_eq!(server.entry, PathBuf::from("/site/src/server.js"));
        assert_eq!(server.cwd, PathBuf::from("/site"));
        assert_eq!(server.restart_delay, Duration::from_millis(10));
    }
}
