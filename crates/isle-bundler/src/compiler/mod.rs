//! Component compilation boundary.
//!
//! The build pipeline never parses component syntax itself. A
//! [`ComponentCompiler`] turns component source into JavaScript plus an
//! optional stylesheet, and a [`Framework`] describes which files are
//! components and which imports belong to the framework runtime.

mod block;
mod external;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::graph::ResolutionPolicy;
use crate::layout::BuildType;

pub use block::BlockCompiler;
pub use external::ExternalCompiler;

/// Description of the component framework a project uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    /// Component file extensions, including the dot.
    pub extensions: Vec<String>,
    /// Module re-exported from every entry wrapper (framework adapter).
    pub adapter_path: Option<String>,
    /// `package.json` field naming a package's component entry.
    pub package_field: String,
    /// Runtime modules that are never recorded as dependencies.
    pub runtime_modules: Vec<String>,
}

impl Default for Framework {
    fn default() -> Self {
        Self::svelte()
    }
}

impl Framework {
    pub fn svelte() -> Self {
        Self {
            name: "svelte".to_string(),
            extensions: vec![".svelte".to_string()],
            adapter_path: None,
            package_field: "svelte".to_string(),
            runtime_modules: vec!["svelte".to_string(), "svelte/internal".to_string()],
        }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::new(self.runtime_modules.clone(), self.extensions.clone())
    }

    pub fn is_component(&self, id: &str) -> bool {
        self.policy().is_component(id)
    }
}

/// Output of compiling one component for one build type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CompiledComponent {
    pub code: String,
    #[serde(default)]
    pub css: Option<CompiledCss>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CompiledCss {
    pub code: String,
    #[serde(default)]
    pub map: Option<String>,
}

/// Compiles component sources.
pub trait ComponentCompiler: Send + Sync + std::fmt::Debug {
    fn compile(
        &self,
        source: &str,
        path: &Path,
        build_type: BuildType,
    ) -> Result<CompiledComponent, CompileError>;
}

/// A component failed to compile.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{}: {message}", .path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("{}: compiler `{command}` failed: {message}", .path.display())]
    Command {
        path: PathBuf,
        command: String,
        message: String,
    },

    #[error("{}: invalid compiler output: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// The component that failed.
    pub fn path(&self) -> &Path {
        match self {
            CompileError::Syntax { path, .. }
            | CompileError::Command { path, .. }
            | CompileError::Output { path, .. }
            | CompileError::Io { path, .. } => path,
        }
    }
}
