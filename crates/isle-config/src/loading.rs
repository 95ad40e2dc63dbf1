use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format as _, Json, Serialized, Toml};
use isle_bundler::BackendKind;
use serde::Serialize;

use crate::config::IsleConfig;
use crate::error::{ConfigError, Result};

/// Values given on the command line. Only the fields that are set override
/// lower layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_dir: Option<std::path::PathBuf>,
}

impl IsleConfig {
    /// Load configuration from multiple sources.
    /// Priority: overrides > `ISLE_*` environment > config file > defaults
    ///
    /// `ISLE_DEV__RUNTIME=bun` sets `dev.runtime`.
    pub fn load(root: &Path, file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(IsleConfig::default()));

        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "loading config file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
            };
        }

        figment = figment
            .merge(Env::prefixed("ISLE_").split("__"))
            .merge(Serialized::defaults(overrides));

        let config: IsleConfig = figment.extract()?;
        Ok(config.anchor(root))
    }
}
