//! Configuration for isle projects.
//!
//! An [`IsleConfig`] is assembled from built-in defaults, an optional
//! `isle.toml` / `isle.config.json` in the project root, `ISLE_*`
//! environment variables and command line overrides, in that order.

pub mod config;
pub mod dev;
pub mod discovery;
pub mod error;
mod loading;
pub mod validation;

pub use config::{CompilerConfig, FrameworkConfig, IsleConfig};
pub use dev::DevConfig;
pub use discovery::{CONFIG_FILES, ConfigDiscovery};
pub use error::{ConfigError, Result};
pub use loading::ConfigOverrides;
