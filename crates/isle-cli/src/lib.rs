//! Command-line interface for isle.
//!
//! - [`cli`] - argument definitions
//! - [`commands`] - `isle build` and `isle dev`
//! - [`error`] - CLI errors and their miette rendering
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - colored status lines

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
