//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use isle_bundler::BackendKind;
use isle_config::ConfigOverrides;

/// isle - server-rendered components with partial hydration
#[derive(Parser, Debug)]
#[command(name = "isle", version, about = "Build islands-architecture sites")]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the server and client bundles
    Build(BuildArgs),

    /// Build, watch and run the dev server
    ///
    /// The server is restarted once both bundles of a rebuild are ready.
    Dev(DevArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Project root
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Configuration file (default: isle.toml or isle.config.json in the root)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bundling engine
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Source directory, relative to the root
    #[arg(long, value_name = "DIR")]
    pub src_dir: Option<PathBuf>,
}

impl ProjectArgs {
    pub fn overrides(&self, production: Option<bool>) -> ConfigOverrides {
        ConfigOverrides {
            backend: self.backend.map(Into::into),
            production,
            src_dir: self.src_dir.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Production build (`process.env.NODE_ENV` is "production")
    #[arg(long)]
    pub production: bool,

    /// Keep rebuilding when sources change
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DevArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Rolldown,
    Scan,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Rolldown => BackendKind::Rolldown,
            Backend::Scan => BackendKind::Scan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_flags() {
        let cli = Cli::try_parse_from(["isle", "build", "--backend", "scan", "--production", "-w"])
            .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.project.backend, Some(Backend::Scan));
        assert!(args.production);
        assert!(args.watch);
        assert_eq!(args.project.root, PathBuf::from("."));
    }

    #[test]
    fn only_given_flags_become_overrides() {
        let cli = Cli::try_parse_from(["isle", "dev", "--root", "site"]).unwrap();
        let Command::Dev(args) = cli.command else {
            panic!("expected dev");
        };
        let overrides = args.project.overrides(None);
        assert!(overrides.backend.is_none());
        assert!(overrides.production.is_none());
        assert_eq!(args.project.root, PathBuf::from("site"));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["isle", "-v", "-q", "build"]).is_err());
    }
}
