//! Filesystem checks run before a build.

use crate::config::IsleConfig;
use crate::error::{ConfigError, Result};

impl IsleConfig {
    /// Reject configurations a build cannot run with.
    pub fn validate(&self) -> Result<()> {
        let layout = self.layout();
        if !layout.src.is_dir() {
            return Err(ConfigError::SourceDirNotFound(layout.src));
        }
        if layout.ssr_dir == layout.client_dir {
            return Err(ConfigError::OutputDirsOverlap(layout.ssr_dir));
        }
        if layout.ssr_dir == layout.src || layout.client_dir == layout.src {
            return Err(ConfigError::invalid(
                "ssr_dir",
                "output directories must not be the source directory",
            ));
        }

        let extensions = &self.framework.extensions;
        if extensions.is_empty() {
            return Err(ConfigError::invalid(
                "framework.extensions",
                "at least one component extension is required",
            ));
        }
        if let Some(bad) = extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(ConfigError::invalid(
                "framework.extensions",
                format!("'{bad}' must start with a dot, e.g. \".svelte\""),
            ));
        }
        if self.compiler.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::invalid("compiler.command", "command cannot be empty"));
        }
        Ok(())
    }
}
