#![cfg_attr(docsrs, feature(doc_cfg))]

//! # isle-bundler
//!
//! Build orchestration for component-based sites with partial hydration.
//!
//! Every build produces two artifact sets from the same component sources:
//! a server-rendering bundle and a client-hydration bundle. Component styles
//! are tracked through a process-wide dependency graph, aggregated in a fixed
//! precedence order, and re-injected into the server modules so rendered pages
//! can inline exactly the CSS they use.
//!
//! ## Quick Start
//!
//! ```no_run
//! use isle_bundler::{BuildInvocation, ProjectLayout, build};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ProjectLayout::new("./site", "src", ".isle/compiled", "public/_isle");
//! let session = build(BuildInvocation::new(layout)).await?;
//! for outcome in session.outcomes() {
//!     println!("{}: {}", outcome.build_type, outcome.is_success());
//! }
//! # Ok(()) }
//! ```
//!
//! ## Hydrating rendered pages
//!
//! ```no_run
//! use isle_bundler::hydration::{PageHydration, mount_components_in_html};
//! # use isle_bundler::hydration::{ComponentLookup, ComponentRenderer};
//! # fn demo(lookup: &dyn ComponentLookup, renderer: &dyn ComponentRenderer) {
//! let mut page = PageHydration::new();
//! let html = mount_components_in_html("<div isle-mount='[\"Clock\",{},{}]'></div>", &mut page, lookup, renderer);
//! assert_eq!(page.components_to_hydrate.len(), 1);
//! # let _ = html;
//! # }
//! ```

pub mod backend;
pub mod builder;
pub mod compiler;
pub mod css;
pub mod dev;
pub mod graph;
pub mod hydration;
pub mod layout;
pub mod manifest;
pub mod state;
pub mod transform;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use backend::scan::PluginError;
pub use backend::{BackendAdapter, BackendKind, BuildSummary, EmittedEntry, create_backend};
pub use builder::{BuildEvent, BuildInvocation, BuildOutcome, BuildSession, Builder, build};
pub use compiler::{
    BlockCompiler, CompileError, CompiledComponent, CompiledCss, ComponentCompiler,
    ExternalCompiler, Framework,
};
pub use css::{CssAggregator, CssSource, StylesheetCache, StylesheetEntry, priority};
pub use dev::{DevServerCoordinator, RestartSignal, RestartState, ServerProcess};
pub use graph::DependencyGraph;
pub use layout::{BuildType, ProjectLayout, component_name};
pub use manifest::ComponentManifest;
pub use state::BuildState;

/// Error types for isle-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error reported by the Rolldown engine.
    #[error("Rolldown bundler error: {0}")]
    Bundler(String),

    /// A component failed to compile.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Error raised by a scan-engine plugin hook.
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// An import could not be resolved by the scan engine.
    #[error("Cannot resolve '{specifier}' from '{importer}'")]
    Resolve { specifier: String, importer: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with context message.
    #[error("{message}")]
    IoError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// File write operation failed.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// The dev server process could not be launched.
    #[error("Failed to start dev server: {0}")]
    Spawn(String),

    /// File watcher could not be created.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for isle-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a bundler error from a Rolldown diagnostic batch.
    pub fn from_rolldown_batch(error: &dyn std::fmt::Debug) -> Self {
        Error::Bundler(format!("{error:?}"))
    }

    /// Attach a message to an I/O error.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::IoError {
            message: message.into(),
            source,
        }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Bundler(_) => "BUNDLER_ERROR",
            Error::Compile(_) => "COMPILE_ERROR",
            Error::Plugin(_) => "PLUGIN_ERROR",
            Error::Resolve { .. } => "RESOLVE_ERROR",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) | Error::IoError { .. } => "IO_ERROR",
            Error::InvalidOutputPath(_) => "INVALID_OUTPUT_PATH",
            Error::WriteFailure(_) => "WRITE_FAILURE",
            Error::Spawn(_) => "SPAWN_FAILURE",
            Error::Watch(_) => "WATCH_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Compile(err) => Some(Box::new(format!(
                "Fix the component source and save again; watch mode keeps running.\nFile: {}",
                err.path().display()
            ))),
            Error::Resolve { specifier, .. } => Some(Box::new(format!(
                "Check that '{}' exists or is installed under node_modules.",
                specifier
            ))),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{}' is invalid. Ensure it's within the output directory and doesn't contain '..' components.",
                path
            ))),
            Error::WriteFailure(msg) => Some(Box::new(format!(
                "Failed to write file. Check disk space and permissions.\nError: {}",
                msg
            ))),
            Error::Spawn(_) => Some(Box::new(
                "Check that the server entry exists and the configured runtime is on PATH.",
            )),
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your isle configuration for mistakes.\nError: {}",
                msg
            ))),
            _ => None,
        }
    }
}
