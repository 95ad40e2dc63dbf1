//! Backend driving the Rolldown bundler.

mod plugin;

use std::sync::Arc;

use async_trait::async_trait;
use rolldown::{BundlerBuilder, BundlerOptions, InputItem, OutputFormat, Platform, SourceMapType};
use rolldown_plugin::__inner::SharedPluginable;

pub use plugin::IslePlugin;

use super::artifacts::{clean_stale_outputs, complete_pass};
use super::writer::write_bundle_to;
use super::{BackendAdapter, BackendContext, BackendKind, BuildSummary, EmittedEntry, ModuleHooks};
use crate::layout::BuildType;
use crate::transform::{CSS_ENTRY_NAME, ENTRY_QUERY};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RolldownBackend {
    ctx: Arc<BackendContext>,
}

impl RolldownBackend {
    pub fn new(ctx: Arc<BackendContext>) -> Self {
        Self { ctx }
    }

    fn options(&self, build_type: BuildType, input: Vec<InputItem>) -> BundlerOptions {
        let entry_filenames = match build_type {
            BuildType::Ssr => "[name].js",
            BuildType::Client => "[name].[hash].js",
        };
        BundlerOptions {
            input: Some(input),
            cwd: Some(self.ctx.layout.root.clone()),
            format: Some(OutputFormat::Esm),
            platform: Some(match build_type {
                BuildType::Ssr => Platform::Node,
                BuildType::Client => Platform::Browser,
            }),
            sourcemap: self.ctx.sourcemap().then_some(SourceMapType::File),
            entry_filenames: Some(entry_filenames.to_string().into()),
            chunk_filenames: Some("chunks/[name].[hash].js".to_string().into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl BackendAdapter for RolldownBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rolldown
    }

    async fn build(&self, build_type: BuildType) -> Result<BuildSummary> {
        let ctx = &self.ctx;
        clean_stale_outputs(&ctx.layout, build_type);
        ctx.state.begin_pass();

        let entries = ctx.entries(build_type);
        let out_dir = ctx.layout.out_dir(build_type);
        if entries.is_empty() {
            tracing::info!(build_type = %build_type, "no entries to build");
            return Ok(BuildSummary {
                build_type,
                entries: Vec::new(),
                files: Vec::new(),
            });
        }

        let mut input: Vec<InputItem> = entries
            .iter()
            .map(|entry| InputItem {
                name: Some(ctx.layout.entry_name(entry)),
                import: format!("{}{ENTRY_QUERY}", entry.display()),
            })
            .collect();
        if build_type.is_ssr() {
            input.push(InputItem {
                name: Some(CSS_ENTRY_NAME.to_string()),
                import: CSS_ENTRY_NAME.to_string(),
            });
        }

        let hooks = Arc::new(ModuleHooks::new(Arc::clone(ctx), build_type, entries));
        let plugin = Arc::new(IslePlugin::new(hooks));
        let plugins: Vec<SharedPluginable> = vec![plugin.clone()];

        let mut bundler = BundlerBuilder::default()
            .with_options(self.options(build_type, input))
            .with_plugins(plugins)
            .build()
            .map_err(|e| Error::from_rolldown_batch(&e))?;

        let output = bundler
            .generate()
            .await
            .map_err(|e| Error::from_rolldown_batch(&e))?;

        let files = write_bundle_to(&output, &out_dir)?;
        let entries = plugin
            .take_entries()
            .into_iter()
            .map(|(source, filename)| EmittedEntry {
                source,
                output: out_dir.join(filename),
            })
            .collect();

        let summary = BuildSummary {
            build_type,
            entries,
            files,
        };
        complete_pass(ctx, &summary);

        tracing::info!(
            build_type = %build_type,
            files = summary.files.len(),
            "rolldown pass finished"
        );
        Ok(summary)
    }
}
