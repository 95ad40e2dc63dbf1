//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found")]
    NotFound,

    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("invalid config value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("source directory not found: {0}")]
    SourceDirNotFound(PathBuf),

    #[error("server and client output directories must differ: {0}")]
    OutputDirsOverlap(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
