//! Source watcher with per-path debouncing.
//!
//! Watches a directory recursively and forwards relevant changes through a
//! tokio channel, ignoring configured patterns, hidden files and anything
//! outside the watched root.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::{Error, Result};

const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    /// Whether the set of files changed, not just a file's contents.
    pub fn is_structural(&self) -> bool {
        !matches!(self, FileChange::Modified(_))
    }
}

/// Keeps the underlying watcher alive; dropping it stops the events.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher").field("roots", &self.roots).finish()
    }
}

impl SourceWatcher {
    /// Watch `root` recursively.
    pub fn new(
        root: PathBuf,
        ignore_patterns: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        Self::watch_all(vec![root], ignore_patterns, debounce_ms)
    }

    /// Watch several roots with one channel. Missing roots are an error.
    pub fn watch_all(
        roots: Vec<PathBuf>,
        ignore_patterns: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        for root in &roots {
            if !root.exists() {
                return Err(Error::io(
                    format!("Cannot watch {}", root.display()),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "path does not exist"),
                ));
            }
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let debounce = Duration::from_millis(debounce_ms);
        let mut last_seen: FxHashMap<PathBuf, Instant> = FxHashMap::default();
        let watched = roots.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(%err, "watch error");
                    return;
                }
            };
            for path in &event.paths {
                let Some(root) = watched.iter().find(|root| path.starts_with(root)) else {
                    continue;
                };
                if should_ignore(path, root, &ignore_patterns) {
                    continue;
                }

                let now = Instant::now();
                if let Some(previous) = last_seen.get(path) {
                    if now.duration_since(*previous) < debounce {
                        continue;
                    }
                }
                last_seen.insert(path.clone(), now);

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };
                let _ = tx.blocking_send(change);
            }
        })?;

        for root in &roots {
            let mode = if root.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(root, mode)?;
        }

        Ok((
            Self {
                _watcher: watcher,
                roots,
            },
            rx,
        ))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Patterns are either `*.ext` suffixes or path prefixes / directory names.
fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    let relative_str = relative.to_string_lossy().replace('\\', "/");

    for pattern in ignore_patterns {
        if let Some(ext) = pattern.strip_prefix('*') {
            if relative_str.ends_with(ext) {
                return true;
            }
        } else if relative_str.starts_with(pattern.as_str())
            || relative_str.contains(&format!("/{pattern}"))
        {
            return true;
        }
    }

    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_patterns_and_hidden_paths() {
        let root = PathBuf::from("/project");
        let patterns = vec!["node_modules".to_string(), "*.log".to_string()];

        assert!(should_ignore(Path::new("/project/node_modules/a/index.js"), &root, &patterns));
        assert!(should_ignore(Path::new("/project/src/debug.log"), &root, &patterns));
        assert!(should_ignore(Path::new("/project/.isle/compiled/a.js"), &root, &patterns));
        assert!(should_ignore(Path::new("/other/a.js"), &root, &patterns));
        assert!(!should_ignore(Path::new("/project/src/components/A.svelte"), &root, &patterns));
    }

    #[test]
    fn structural_changes() {
        let path = PathBuf::from("/p/src/A.svelte");
        assert!(FileChange::Created(path.clone()).is_structural());
        assert!(FileChange::Removed(path.clone()).is_structural());
        assert!(!FileChange::Modified(path.clone()).is_structural());
        assert_eq!(FileChange::Modified(path.clone()).path(), path.as_path());
    }

    #[test]
    fn missing_roots_are_rejected() {
        let result = SourceWatcher::new(PathBuf::from("/definitely/not/here"), Vec::new(), 10);
        assert!(result.is_err());
    }
}
