//! Rolldown plugin adapting the shared module hooks.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use rolldown_common::{ModuleType, Output, ResolvedExternal};
use rolldown_plugin::{
    HookGenerateBundleArgs, HookLoadArgs, HookLoadOutput, HookLoadReturn, HookNoopReturn,
    HookResolveIdArgs, HookResolveIdOutput, HookResolveIdReturn, HookTransformArgs,
    HookTransformOutput, HookTransformReturn, HookUsage, Plugin, PluginContext,
    SharedTransformPluginContext,
};

use crate::backend::artifacts::is_css_entry_output;
use crate::backend::hooks::{ModuleHooks, Resolution};
use crate::graph::strip_query;
use crate::transform::ENTRY_QUERY;

/// Entry chunk emitted for an entry source: `(source, filename)`.
pub type EntryChunk = (String, String);

#[derive(Debug)]
pub struct IslePlugin {
    hooks: Arc<ModuleHooks>,
    entries: Arc<Mutex<Vec<EntryChunk>>>,
}

impl IslePlugin {
    pub fn new(hooks: Arc<ModuleHooks>) -> Self {
        Self {
            hooks,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Entry chunks seen by the last `generate_bundle`.
    pub fn take_entries(&self) -> Vec<EntryChunk> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl Plugin for IslePlugin {
    fn name(&self) -> Cow<'static, str> {
        "isle".into()
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::ResolveId | HookUsage::Load | HookUsage::Transform | HookUsage::GenerateBundle
    }

    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs<'_>,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let hooks = Arc::clone(&self.hooks);
        let specifier = args.specifier.to_string();
        let importer = args.importer.map(|importer| importer.to_string());

        async move {
            let output = match hooks.resolve(&specifier, importer.as_deref()) {
                Resolution::Virtual(id) | Resolution::Package(id) => Some(HookResolveIdOutput {
                    id: id.into(),
                    external: Some(ResolvedExternal::Bool(false)),
                    ..Default::default()
                }),
                Resolution::External(id) => Some(HookResolveIdOutput {
                    id: id.into(),
                    external: Some(ResolvedExternal::Bool(true)),
                    ..Default::default()
                }),
                Resolution::Defer => None,
            };
            Ok(output)
        }
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let hooks = Arc::clone(&self.hooks);
        let id = args.id.to_string();

        async move {
            // Loading reads files and runs the component compiler.
            let loaded = tokio::task::spawn_blocking(move || {
                hooks
                    .load(&id)
                    .with_context(|| format!("Failed to load module: {}", id))
            })
            .await
            .context("module loader task failed")??;

            Ok(loaded.map(|module| HookLoadOutput {
                code: module.code.into(),
                module_type: Some(ModuleType::Js),
                ..Default::default()
            }))
        }
    }

    fn transform(
        &self,
        _ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let hooks = Arc::clone(&self.hooks);
        let id = args.id.to_string();
        let code = args.code.to_string();

        async move {
            Ok(hooks.transform(&id, &code).map(|code| HookTransformOutput {
                code: Some(code),
                map: None,
                side_effects: None,
                module_type: None,
            }))
        }
    }

    /// Record entry chunks and drop the aggregated stylesheet entry.
    fn generate_bundle(
        &self,
        _ctx: &PluginContext,
        args: &mut HookGenerateBundleArgs<'_>,
    ) -> impl std::future::Future<Output = HookNoopReturn> + Send {
        let entries = Arc::clone(&self.entries);

        async move {
            let mut seen = Vec::new();
            for output in args.bundle.iter() {
                let Output::Chunk(chunk) = output else {
                    continue;
                };
                if !chunk.is_entry {
                    continue;
                }
                let Some(facade) = &chunk.facade_module_id else {
                    continue;
                };
                let facade: &str = facade.as_ref();
                if facade.ends_with(ENTRY_QUERY) {
                    seen.push((strip_query(facade).to_string(), chunk.filename.to_string()));
                }
            }

            args.bundle.retain(|output| {
                let filename = match output {
                    Output::Chunk(chunk) => chunk.filename.as_str(),
                    Output::Asset(asset) => asset.filename.as_str(),
                };
                !is_css_entry_output(filename)
            });

            tracing::debug!(entries = seen.len(), "generated bundle");
            *entries.lock() = seen;
            Ok(())
        }
    }
}
