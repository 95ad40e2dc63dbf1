//! Command implementations. Each exposes an `execute` function taking its
//! parsed arguments.

pub mod build;
pub mod dev;

use std::path::PathBuf;

use isle_config::{ConfigDiscovery, IsleConfig};

pub use build::execute as build_execute;
pub use dev::execute as dev_execute;

use crate::cli::ProjectArgs;
use crate::error::{CliError, Result};

/// A loaded and validated project configuration.
#[derive(Debug)]
pub(crate) struct Project {
    pub config: IsleConfig,
    /// The file the configuration came from, if any.
    pub file: Option<PathBuf>,
}

pub(crate) fn load_project(args: &ProjectArgs, production: Option<bool>) -> Result<Project> {
    if !args.root.is_dir() {
        return Err(CliError::FileNotFound(args.root.clone()));
    }
    let root = std::path::absolute(&args.root)?;

    let file = match &args.config {
        Some(path) if path.is_file() => Some(std::path::absolute(path)?),
        Some(path) => return Err(CliError::FileNotFound(path.clone())),
        None => ConfigDiscovery::new(&root).find(),
    };
    if let Some(file) = &file {
        tracing::debug!(path = %file.display(), "using config file");
    }

    let config = IsleConfig::load(&root, file.as_deref(), &args.overrides(production))?;
    config.validate()?;
    Ok(Project { config, file })
}
