//! Bundler engines behind one build contract.
//!
//! Each backend runs one pass for one [`BuildType`]: it deletes stale
//! outputs, registers the entry wrappers (plus the aggregated stylesheet
//! entry for server builds), reports every import edge to the shared
//! [`DependencyGraph`](crate::graph::DependencyGraph) through [`ModuleHooks`],
//! writes its modules, and finally hands the emitted files to
//! [`artifacts::complete_pass`].

pub mod artifacts;
pub mod hooks;
pub mod rolldown;
pub mod scan;
pub mod writer;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::compiler::{BlockCompiler, ComponentCompiler, Framework};
use crate::layout::{BuildType, ProjectLayout};
use crate::state::BuildState;
use crate::{Error, Result};

pub use hooks::ModuleHooks;

/// The supported engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Rolldown,
    Scan,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Rolldown => "rolldown",
            BackendKind::Scan => "scan",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rolldown" => Ok(BackendKind::Rolldown),
            "scan" => Ok(BackendKind::Scan),
            other => Err(Error::InvalidConfig(format!(
                "unknown backend '{other}' (expected 'rolldown' or 'scan')"
            ))),
        }
    }
}

/// Everything a backend needs for a pass, shared by both build types.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub layout: ProjectLayout,
    pub framework: Framework,
    pub compiler: Arc<dyn ComponentCompiler>,
    pub state: Arc<BuildState>,
    /// Extra literal replacements applied to every module.
    pub replacements: IndexMap<String, String>,
    pub production: bool,
    /// Additional entry files built for both types.
    pub extra_entries: Vec<PathBuf>,
}

impl BackendContext {
    pub fn new(layout: ProjectLayout) -> Self {
        let framework = Framework::default();
        let state = BuildState::shared(framework.policy());
        Self {
            layout,
            framework,
            compiler: Arc::new(BlockCompiler),
            state,
            replacements: IndexMap::new(),
            production: false,
            extra_entries: Vec::new(),
        }
    }

    /// Entry files for a pass: discovered components, then extra entries.
    pub fn entries(&self, build_type: BuildType) -> Vec<PathBuf> {
        let mut entries = self.layout.entries(build_type, &self.framework.extensions);
        for extra in &self.extra_entries {
            let extra = self.layout.root.join(extra);
            if !entries.contains(&extra) {
                entries.push(extra);
            }
        }
        entries
    }

    pub fn sourcemap(&self) -> bool {
        !self.production
    }
}

/// An entry source and the file emitted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedEntry {
    pub source: String,
    pub output: PathBuf,
}

/// Result of one successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub build_type: BuildType,
    pub entries: Vec<EmittedEntry>,
    /// Every file written, absolute.
    pub files: Vec<PathBuf>,
}

/// One engine, able to run a pass for either build type.
#[async_trait]
pub trait BackendAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Run one full pass. Compile errors fail the pass; cleanup problems
    /// only log.
    async fn build(&self, build_type: BuildType) -> Result<BuildSummary>;
}

pub fn create_backend(kind: BackendKind, ctx: Arc<BackendContext>) -> Arc<dyn BackendAdapter> {
    match kind {
        BackendKind::Rolldown => Arc::new(rolldown::RolldownBackend::new(ctx)),
        BackendKind::Scan => Arc::new(scan::ScanBackend::new(ctx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses() {
        assert_eq!("scan".parse::<BackendKind>().unwrap(), BackendKind::Scan);
        assert_eq!(BackendKind::default().to_string(), "rolldown");
        assert!("webpack".parse::<BackendKind>().is_err());
    }
}
