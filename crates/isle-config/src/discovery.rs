//! Locating the configuration file of a project.

use std::path::{Path, PathBuf};

use crate::config::IsleConfig;
use crate::error::Result;
use crate::loading::ConfigOverrides;

/// Recognized file names, in lookup order.
pub const CONFIG_FILES: [&str; 2] = ["isle.toml", "isle.config.json"];

/// Configuration discovery rooted at a project directory.
///
/// ```no_run
/// use isle_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The first of [`CONFIG_FILES`] present in the root.
    pub fn find(&self) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file())
    }

    /// Load without command line overrides. A missing file is not an error.
    pub fn load(&self) -> Result<IsleConfig> {
        self.load_with(&ConfigOverrides::default())
    }

    pub fn load_with(&self, overrides: &ConfigOverrides) -> Result<IsleConfig> {
        let file = self.find();
        IsleConfig::load(&self.root, file.as_deref(), overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_without_config() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn toml_wins_over_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("isle.config.json"), "{}").unwrap();
        fs::write(dir.path().join("isle.toml"), "").unwrap();

        let found = ConfigDiscovery::new(dir.path()).find().unwrap();
        assert_eq!(found.file_name().unwrap(), "isle.toml");
    }
}
