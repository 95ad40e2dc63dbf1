//! Backend running the built-in scan engine.
//!
//! The engine emits one output file per module and exposes an
//! onStart/onResolve/onLoad/onEnd plugin API; [`IsleScanPlugin`] adapts the
//! shared [`ModuleHooks`] to it.

pub mod api;
pub mod engine;
mod plugin;
pub mod resolver;

use std::sync::Arc;

use async_trait::async_trait;

pub use api::{
    BuildResult, EngineOptions, EntryPoint, HookResult, LoadArgs, LoadResult, Loader, Metafile,
    MetafileOutput, OnLoadOptions, OnResolveOptions, Platform, PluginBuild, PluginError,
    ResolveArgs, ResolveResult, ScanPlugin,
};
pub use engine::{EngineOutput, ScanEngine};
pub use plugin::IsleScanPlugin;

use super::artifacts::clean_stale_outputs;
use super::{BackendAdapter, BackendContext, BackendKind, BuildSummary, ModuleHooks};
use crate::layout::BuildType;
use crate::transform::ENTRY_QUERY;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct ScanBackend {
    ctx: Arc<BackendContext>,
}

impl ScanBackend {
    pub fn new(ctx: Arc<BackendContext>) -> Self {
        Self { ctx }
    }

    fn options(&self, build_type: BuildType, entry_points: Vec<EntryPoint>) -> EngineOptions {
        let layout = &self.ctx.layout;
        let (entry_names, chunk_names, platform) = match build_type {
            BuildType::Ssr => ("[dir]/[name]", "[dir]/[name].[ext]", Platform::Node),
            BuildType::Client => ("[dir]/[name].[hash]", "chunks/[name].[hash]", Platform::Browser),
        };
        EngineOptions {
            entry_points,
            working_dir: layout.root.clone(),
            out_dir: layout.out_dir(build_type),
            outbase: layout.src.clone(),
            entry_names: entry_names.to_string(),
            chunk_names: chunk_names.to_string(),
            platform,
            sourcemap: self.ctx.sourcemap(),
        }
    }
}

#[async_trait]
impl BackendAdapter for ScanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Scan
    }

    async fn build(&self, build_type: BuildType) -> Result<BuildSummary> {
        let ctx = &self.ctx;
        let entries = ctx.entries(build_type);
        if entries.is_empty() {
            clean_stale_outputs(&ctx.layout, build_type);
            ctx.state.begin_pass();
            tracing::info!(build_type = %build_type, "no entries to build");
            return Ok(BuildSummary {
                build_type,
                entries: Vec::new(),
                files: Vec::new(),
            });
        }

        let entry_points = entries
            .iter()
            .map(|entry| {
                EntryPoint::new(
                    Some(ctx.layout.entry_name(entry)),
                    format!("{}{ENTRY_QUERY}", entry.display()),
                )
            })
            .collect();
        let options = self.options(build_type, entry_points);

        let hooks = Arc::new(ModuleHooks::new(Arc::clone(ctx), build_type, entries));
        let plugin = Arc::new(IsleScanPlugin::new(hooks));
        let engine = ScanEngine::new(options).with_plugin(plugin.clone());

        tokio::task::spawn_blocking(move || engine.run())
            .await
            .map_err(|err| Error::Bundler(format!("scan engine task failed: {err}")))??;

        let summary = plugin
            .take_summary()
            .ok_or_else(|| Error::Bundler("scan pass finished without a summary".to_string()))?;

        tracing::info!(
            build_type = %build_type,
            files = summary.files.len(),
            "scan pass finished"
        );
        Ok(summary)
    }
}
