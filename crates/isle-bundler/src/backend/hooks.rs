//! Module hooks shared by both engines.
//!
//! The rolldown plugin and the scan plugin adapt their own hook shapes to
//! these methods, so resolution, dependency logging, compilation and import
//! rewriting happen identically regardless of the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;

use super::BackendContext;
use crate::graph::{is_stylesheet, strip_query};
use crate::layout::BuildType;
use crate::transform::{
    self, CSS_ENTRY_NAME, Defines, ENTRY_QUERY, entry_wrapper, rewrite_component_imports,
    stylesheet_module, with_stylesheet_import,
};
use crate::{Error, Result};

/// Id of the synthetic module importing every server entry.
pub const CSS_ENTRY_ID: &str = "\0isle:css";

/// What the shared resolver decided for an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A module only this crate can load.
    Virtual(String),
    /// A bare package import resolved through the framework package field.
    Package(String),
    /// Left to the runtime.
    External(String),
    /// Let the engine resolve it.
    Defer,
}

/// A module produced by [`ModuleHooks::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub code: String,
    /// Directory relative imports of the module resolve against.
    pub resolve_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModuleHooks {
    ctx: Arc<BackendContext>,
    build_type: BuildType,
    defines: Defines,
    entries: Vec<PathBuf>,
}

impl ModuleHooks {
    pub fn new(ctx: Arc<BackendContext>, build_type: BuildType, entries: Vec<PathBuf>) -> Self {
        let defines = Defines::for_build(build_type, ctx.production, &ctx.replacements);
        Self {
            ctx,
            build_type,
            defines,
            entries,
        }
    }

    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    pub fn context(&self) -> &BackendContext {
        &self.ctx
    }

    /// Record the edge, then decide who resolves the import.
    pub fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution {
        let state = &self.ctx.state;

        if specifier == CSS_ENTRY_NAME || specifier == CSS_ENTRY_ID {
            return Resolution::Virtual(CSS_ENTRY_ID.to_string());
        }
        if specifier.ends_with(ENTRY_QUERY) {
            let path = self.ctx.layout.root.join(strip_query(specifier)).clean();
            return Resolution::Virtual(format!("{}{ENTRY_QUERY}", path.display()));
        }

        state.graph.log_dependency(specifier, importer);

        if self.is_component_css(specifier) {
            return Resolution::Virtual(specifier.to_string());
        }
        if importer.is_none() || !is_bare(specifier) {
            return Resolution::Defer;
        }
        if let Some(resolved) = self.package_component(specifier) {
            tracing::debug!(specifier, resolved = resolved.as_str(), "package component");
            state.graph.log_dependency(&resolved, Some(specifier));
            return Resolution::Package(resolved);
        }
        if self.build_type.is_ssr() {
            return Resolution::External(specifier.to_string());
        }
        Resolution::Defer
    }

    /// Load virtual modules, components and server-side stylesheets.
    ///
    /// Returns `None` for modules the engine loads itself.
    pub fn load(&self, id: &str) -> Result<Option<LoadedModule>> {
        if id == CSS_ENTRY_ID {
            let entries: Vec<String> = self
                .entries
                .iter()
                .map(|entry| entry.display().to_string())
                .collect();
            return Ok(Some(LoadedModule {
                code: transform::css_entry(&entries),
                resolve_dir: Some(self.ctx.layout.root.clone()),
            }));
        }

        if let Some(path) = id.strip_suffix(ENTRY_QUERY) {
            let code = entry_wrapper(path, self.ctx.framework.adapter_path.as_deref());
            return Ok(Some(LoadedModule {
                code,
                resolve_dir: Path::new(path).parent().map(Path::to_path_buf),
            }));
        }

        if self.is_component_css(id) {
            let css = self
                .ctx
                .state
                .stylesheets
                .get(id)
                .map(|entry| entry.code.to_string())
                .unwrap_or_default();
            return Ok(Some(LoadedModule {
                code: stylesheet_module(&css),
                resolve_dir: None,
            }));
        }

        let path = Path::new(strip_query(id));
        if is_stylesheet(id) && self.build_type.is_ssr() {
            let css = std::fs::read_to_string(path)
                .map_err(|err| Error::io(format!("Failed to read stylesheet {id}"), err))?;
            self.ctx.state.stylesheets.insert(strip_query(id), css.as_str(), None);
            return Ok(Some(LoadedModule {
                code: stylesheet_module(&css),
                resolve_dir: path.parent().map(Path::to_path_buf),
            }));
        }

        if self.ctx.framework.is_component(id) {
            return self.load_component(path).map(Some);
        }

        Ok(None)
    }

    fn load_component(&self, path: &Path) -> Result<LoadedModule> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("Failed to read component {}", path.display()), err))?;
        let compiled = self.ctx.compiler.compile(&source, path, self.build_type)?;

        let mut code = compiled.code;
        if let Some(css) = compiled.css {
            let css_id = format!("{}.css", path.display());
            self.ctx
                .state
                .stylesheets
                .insert(css_id.as_str(), css.code.as_str(), css.map);
            code = with_stylesheet_import(&code, &css_id);
        }

        tracing::debug!(
            component = %path.display(),
            build_type = %self.build_type,
            "compiled component"
        );
        Ok(LoadedModule {
            code,
            resolve_dir: path.parent().map(Path::to_path_buf),
        })
    }

    /// Rewrite component imports and apply defines. `None` leaves the code
    /// untouched.
    pub fn transform(&self, id: &str, code: &str) -> Option<String> {
        if id.starts_with('\0') || id.ends_with(ENTRY_QUERY) || is_stylesheet(id) {
            return None;
        }

        let rewritten = self.ctx.framework.is_component(id).then(|| {
            rewrite_component_imports(code, self.build_type, &self.ctx.framework.extensions)
        });
        let current = rewritten.as_deref().unwrap_or(code);
        match self.defines.apply(current) {
            Some(defined) => Some(defined),
            None => rewritten,
        }
    }

    /// Whether `id` is the stylesheet compiled out of a component.
    pub fn is_component_css(&self, id: &str) -> bool {
        strip_query(id)
            .strip_suffix(".css")
            .is_some_and(|base| self.ctx.framework.is_component(base))
    }

    /// `node_modules/<name>/package.json` declaring the framework's package
    /// field, for a bare import without subpath.
    fn package_component(&self, specifier: &str) -> Option<String> {
        let (name, subpath) = split_package(specifier);
        if subpath.is_some() {
            return None;
        }

        let dir = self.ctx.layout.root.join("node_modules").join(name);
        let manifest = std::fs::read_to_string(dir.join("package.json")).ok()?;
        let manifest: serde_json::Value = match serde_json::from_str(&manifest) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(package = name, %err, "unreadable package.json");
                return None;
            }
        };
        let entry = manifest.get(&self.ctx.framework.package_field)?.as_str()?;
        Some(dir.join(entry).clean().display().to_string())
    }
}

/// Bare specifiers name packages: not relative, absolute or virtual.
pub fn is_bare(specifier: &str) -> bool {
    !(specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with('\0')
        || Path::new(specifier).is_absolute())
}

/// Split `@scope/pkg/sub` into `("@scope/pkg", Some("sub"))`.
pub fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let split_at = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(index, _)| index)
    } else {
        specifier.find('/')
    };
    match split_at {
        Some(index) => (&specifier[..index], Some(&specifier[index + 1..])),
        None => (specifier, None),
    }
}
