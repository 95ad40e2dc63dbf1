//! Atomic, contained writes of emitted files.
//!
//! Every file of a pass is first written next to its target with a `.tmp`
//! extension; only when all writes succeeded are they renamed into place.
//! A failure removes the temporaries, so a pass never leaves half its output
//! behind.

use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use rolldown::BundleOutput;
use rolldown_common::Output;

use crate::{Error, Result};

/// A file to write, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub filename: String,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(filename: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            contents: contents.into(),
        }
    }
}

/// Write every chunk and asset of a rolldown bundle under `dir`.
pub fn write_bundle_to(output: &BundleOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    let files: Vec<OutputFile> = output
        .assets
        .iter()
        .map(|item| match item {
            Output::Chunk(chunk) => OutputFile::new(chunk.filename.as_str(), chunk.code.as_bytes()),
            Output::Asset(asset) => {
                OutputFile::new(asset.filename.as_str(), asset.source.as_bytes())
            }
        })
        .collect();
    write_files(dir, &files)
}

/// Write `files` under `dir` atomically. Returns the absolute paths written.
pub fn write_files(dir: &Path, files: &[OutputFile]) -> Result<Vec<PathBuf>> {
    let dir = normalize_dir(dir)?;
    fs::create_dir_all(&dir).map_err(|e| {
        Error::WriteFailure(format!(
            "Failed to create output directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let mut operations = Vec::with_capacity(files.len());
    for file in files {
        let target = validate_output_path(&dir, &file.filename)?;
        operations.push((target, file.contents.as_slice()));
    }

    write_files_atomic(&operations)?;
    Ok(operations.into_iter().map(|(path, _)| path).collect())
}

fn normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();
    if cleaned.is_absolute() {
        return Ok(cleaned);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| Error::InvalidOutputPath(format!("Failed to get current directory: {}", e)))?;
    Ok(cwd.join(cleaned).clean())
}

/// Join `filename` onto `base_dir`, refusing anything that escapes it.
pub fn validate_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    if filename.contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }

    let full_path = base_dir.join(Path::new(filename).clean()).clean();
    if !full_path.starts_with(base_dir) {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}' (resolved to '{}')",
            filename,
            base_dir.display(),
            full_path.display()
        )));
    }
    Ok(full_path)
}

fn write_files_atomic(operations: &[(PathBuf, &[u8])]) -> Result<()> {
    let mut temp_files: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(operations.len());

    for (target, content) in operations {
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                cleanup_temp_files(&temp_files);
                return Err(Error::WriteFailure(format!(
                    "Failed to create directory '{}': {}",
                    parent.display(),
                    e
                )));
            }
        }

        let temp = temp_path(target);
        if let Err(e) = fs::write(&temp, content) {
            cleanup_temp_files(&temp_files);
            return Err(Error::WriteFailure(format!(
                "Failed to write temporary file '{}': {}",
                temp.display(),
                e
            )));
        }
        temp_files.push((temp, target.clone()));
    }

    for (temp, target) in &temp_files {
        if let Err(e) = fs::rename(temp, target) {
            cleanup_temp_files(&temp_files);
            return Err(Error::WriteFailure(format!(
                "Failed to rename '{}' to '{}': {}",
                temp.display(),
                target.display(),
                e
            )));
        }
    }
    Ok(())
}

/// `style.css` → `style.css.tmp`; keeps `a.js` and `a.js.map` apart.
fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn cleanup_temp_files(temp_files: &[(PathBuf, PathBuf)]) {
    for (temp, _) in temp_files {
        if temp.exists() {
            if let Err(e) = fs::remove_file(temp) {
                tracing::warn!(path = %temp.display(), %e, "failed to clean up temporary file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_nested_files() {
        let temp = TempDir::new().unwrap();
        let written = write_files(
            temp.path(),
            &[
                OutputFile::new("components/Clock.js", "export default 1;"),
                OutputFile::new("components/Clock.js.map", "{}"),
            ],
        )
        .unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("components/Clock.js")).unwrap(),
            "export default 1;"
        );
        assert!(!temp.path().join("components/Clock.js.tmp").exists());
    }

    #[test]
    fn traversal_is_rejected_before_writing() {
        let temp = TempDir::new().unwrap();
        let err = write_files(
            temp.path(),
            &[
                OutputFile::new("ok.js", ""),
                OutputFile::new("../../escape.js", ""),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidOutputPath(_)));
        assert!(!temp.path().join("ok.js").exists());
    }
}
