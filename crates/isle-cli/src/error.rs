//! CLI errors.

use std::path::PathBuf;

use miette::Report;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] isle_config::ConfigError),

    #[error(transparent)]
    Bundler(#[from] isle_bundler::Error),

    /// First pass of one or more build types failed.
    #[error("Build failed: {}", .0.join(", "))]
    BuildFailed(Vec<String>),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Render a CLI error for the final report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        // keeps the bundler's code and help
        CliError::Bundler(err) => Report::new(err),
        CliError::Config(err) => miette::miette!(
            help = "Check isle.toml / isle.config.json and ISLE_* environment variables",
            "Configuration error: {}",
            err
        ),
        CliError::BuildFailed(failed) => miette::miette!(
            help = "Run with --verbose for per-module details",
            "Build failed: {}",
            failed.join("\n")
        ),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundler_errors_keep_their_diagnostic_code() {
        let report = cli_error_to_miette(CliError::Bundler(isle_bundler::Error::Spawn(
            "node".to_string(),
        )));
        let code = report.code().map(|code| code.to_string());
        assert_eq!(code.as_deref(), Some("SPAWN_FAILURE"));
    }

    #[test]
    fn build_failures_list_types() {
        let err = CliError::BuildFailed(vec!["ssr: boom".into(), "client: boom".into()]);
        assert_eq!(err.to_string(), "Build failed: ssr: boom, client: boom");
    }
}
