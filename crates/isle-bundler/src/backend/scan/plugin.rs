//! Scan-engine plugin adapting the shared module hooks.

use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use super::api::{
    BuildResult, EntryPoint, FILE_NAMESPACE, HookResult, LoadResult, Loader, OnLoadOptions,
    OnResolveOptions, PluginBuild, PluginError, ResolveResult, ScanPlugin,
};
use crate::backend::artifacts::{clean_stale_outputs, complete_pass, is_css_entry_output};
use crate::backend::hooks::{CSS_ENTRY_ID, ModuleHooks, Resolution};
use crate::backend::{BuildSummary, EmittedEntry};
use crate::graph::strip_query;
use crate::transform::{CSS_ENTRY_NAME, ENTRY_QUERY};

const PLUGIN_NAME: &str = "isle";
const ENTRY_NAMESPACE: &str = "isle-entry";
const CSS_NAMESPACE: &str = "isle-css";
const VIRTUAL_NAMESPACE: &str = "isle-virtual";

#[derive(Debug)]
pub struct IsleScanPlugin {
    hooks: Arc<ModuleHooks>,
    summary: Arc<Mutex<Option<BuildSummary>>>,
}

impl IsleScanPlugin {
    pub fn new(hooks: Arc<ModuleHooks>) -> Self {
        Self {
            hooks,
            summary: Arc::new(Mutex::new(None)),
        }
    }

    /// Summary recorded by the last successful end callback.
    pub fn take_summary(&self) -> Option<BuildSummary> {
        self.summary.lock().take()
    }
}

fn any() -> Regex {
    Regex::new(".*").expect("valid regex")
}

fn load_error(err: crate::Error) -> PluginError {
    PluginError::new(PLUGIN_NAME, "onLoad", err)
}

impl ScanPlugin for IsleScanPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn setup(&self, build: &mut PluginBuild) -> HookResult<()> {
        let build_type = self.hooks.build_type();
        if build_type.is_ssr() {
            build
                .initial_options
                .entry_points
                .push(EntryPoint::new(Some(CSS_ENTRY_NAME.to_string()), CSS_ENTRY_NAME));
        }

        let hooks = Arc::clone(&self.hooks);
        build.on_start(move || {
            let ctx = hooks.context();
            clean_stale_outputs(&ctx.layout, build_type);
            ctx.state.begin_pass();
            Ok(())
        });

        let hooks = Arc::clone(&self.hooks);
        build.on_resolve(
            OnResolveOptions {
                filter: any(),
                namespace: None,
            },
            move |args| {
                let result = match hooks.resolve(&args.path, args.importer.as_deref()) {
                    Resolution::Virtual(id) if id == CSS_ENTRY_ID => {
                        Some(ResolveResult::namespaced(id, CSS_NAMESPACE))
                    }
                    Resolution::Virtual(id) if id.ends_with(ENTRY_QUERY) => Some(
                        ResolveResult::namespaced(strip_query(&id), ENTRY_NAMESPACE),
                    ),
                    Resolution::Virtual(id) => Some(ResolveResult::namespaced(id, VIRTUAL_NAMESPACE)),
                    Resolution::Package(path) => Some(ResolveResult::file(path)),
                    Resolution::External(specifier) => Some(ResolveResult::external(specifier)),
                    Resolution::Defer => None,
                };
                Ok(result)
            },
        );

        for (namespace, virtual_id) in [
            (ENTRY_NAMESPACE, None),
            (CSS_NAMESPACE, Some(CSS_ENTRY_ID)),
            (VIRTUAL_NAMESPACE, None),
        ] {
            let hooks = Arc::clone(&self.hooks);
            build.on_load(
                OnLoadOptions {
                    filter: any(),
                    namespace: Some(namespace.to_string()),
                },
                move |args| {
                    let id = match (namespace, virtual_id) {
                        (_, Some(id)) => id.to_string(),
                        (ENTRY_NAMESPACE, None) => format!("{}{ENTRY_QUERY}", args.path),
                        _ => args.path.clone(),
                    };
                    let loaded = hooks.load(&id).map_err(load_error)?;
                    Ok(loaded.map(|module| LoadResult::js(module.code, module.resolve_dir)))
                },
            );
        }

        let hooks = Arc::clone(&self.hooks);
        build.on_load(
            OnLoadOptions {
                filter: any(),
                namespace: Some(FILE_NAMESPACE.to_string()),
            },
            move |args| {
                let path = args.path.as_str();
                let (code, resolve_dir) = match hooks.load(path).map_err(load_error)? {
                    Some(module) => (module.code, module.resolve_dir),
                    None if Loader::for_path(path) == Loader::Js => {
                        let code = fs::read_to_string(path).map_err(|err| {
                            PluginError::new(PLUGIN_NAME, "onLoad", format!("{path}: {err}"))
                        })?;
                        (code, None)
                    }
                    None => return Ok(None),
                };
                let code = hooks.transform(path, &code).unwrap_or(code);
                Ok(Some(LoadResult::js(code, resolve_dir)))
            },
        );

        let hooks = Arc::clone(&self.hooks);
        let summary = Arc::clone(&self.summary);
        build.on_end(move |result| {
            let recorded = summarize(&hooks, result);
            complete_pass(hooks.context(), &recorded);
            *summary.lock() = Some(recorded);
            Ok(())
        });

        Ok(())
    }
}

/// Turn the metafile into a pass summary, deleting the aggregated
/// stylesheet entry on the way.
fn summarize(hooks: &ModuleHooks, result: &BuildResult) -> BuildSummary {
    let mut entries = Vec::new();
    let mut files = Vec::new();
    for (key, output) in &result.metafile.outputs {
        let path = result.output_path(key);
        if is_css_entry_output(key) {
            if let Err(err) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), %err, "could not remove stylesheet entry");
            }
            continue;
        }
        if let Some(import) = output.entry_point.as_deref() {
            entries.push(EmittedEntry {
                source: strip_query(import).to_string(),
                output: path.clone(),
            });
        }
        files.push(path);
    }
    BuildSummary {
        build_type: hooks.build_type(),
        entries,
        files,
    }
}
