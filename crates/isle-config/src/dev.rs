//! Dev session configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevConfig {
    /// Server entry, relative to the source directory.
    #[serde(default = "default_server_entry")]
    pub server_entry: PathBuf,

    /// Program that runs the server entry.
    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Watched in addition to the source directory.
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,

    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            server_entry: default_server_entry(),
            runtime: default_runtime(),
            restart_delay_ms: default_restart_delay_ms(),
            debounce_ms: default_debounce_ms(),
            watch_paths: Vec::new(),
            ignore: default_ignore(),
        }
    }
}

fn default_server_entry() -> PathBuf {
    PathBuf::from("server.js")
}

fn default_runtime() -> String {
    "node".into()
}

fn default_restart_delay_ms() -> u64 {
    10
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_ignore() -> Vec<String> {
    vec!["node_modules".into(), "*.map".into()]
}
