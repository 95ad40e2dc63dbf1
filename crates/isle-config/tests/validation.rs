use std::fs;
use std::path::PathBuf;

use isle_config::{ConfigDiscovery, ConfigError};
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/components")).unwrap();
    dir
}

#[test]
fn default_project_is_valid() {
    let dir = project();
    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    config.validate().unwrap();
}

#[test]
fn missing_source_dir_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::SourceDirNotFound(path) if path == dir.path().join("src")));
}

#[test]
fn output_dirs_must_differ() {
    let dir = project();
    let mut config = ConfigDiscovery::new(dir.path()).load().unwrap();
    config.client_dir = PathBuf::from(".isle/compiled");
    assert!(matches!(config.validate(), Err(ConfigError::OutputDirsOverlap(_))));
}

#[test]
fn extensions_need_a_dot() {
    let dir = project();
    let mut config = ConfigDiscovery::new(dir.path()).load().unwrap();
    config.framework.extensions = vec!["svelte".into()];
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("framework.extensions"));
}
