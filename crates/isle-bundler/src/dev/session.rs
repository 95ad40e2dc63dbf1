//! A running `dev` session.
//!
//! Wires builder events into the restart coordinator and reacts to source
//! changes: structural component changes and config edits force a full
//! rebuild, component and stylesheet edits re-run the watched passes, and
//! any other change restarts the server directly.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use super::process::{ServerOptions, ServerProcess};
use super::restart::{DevServerCoordinator, RestartSignal};
use super::watcher::{FileChange, SourceWatcher};
use crate::builder::{BuildInvocation, Builder};
use crate::graph::is_stylesheet;
use crate::Result;

#[derive(Debug, Clone)]
pub struct DevOptions {
    pub invocation: BuildInvocation,
    pub server: ServerOptions,
    /// Changes to this file reset all build state.
    pub config_file: Option<PathBuf>,
    /// Extra paths to watch besides the source directory.
    pub watch_paths: Vec<PathBuf>,
}

/// What a source change asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Drop all state and rebuild both types from scratch.
    FullRebuild,
    /// Re-run the watched passes for the changed file.
    Rebuild,
    /// Restart the server without rebuilding.
    Restart,
}

#[derive(Debug)]
pub struct DevSession {
    options: DevOptions,
    builder: Arc<Builder>,
    process: ServerProcess,
    coordinator: DevServerCoordinator<ServerProcess>,
}

impl DevSession {
    pub fn new(options: DevOptions) -> Self {
        let builder = Arc::new(Builder::new(&options.invocation));
        let process = ServerProcess::new(options.server.clone());
        let coordinator = DevServerCoordinator::new(process.clone());
        Self {
            options,
            builder,
            process,
            coordinator,
        }
    }

    pub fn builder(&self) -> &Arc<Builder> {
        &self.builder
    }

    /// Classify a change.
    pub fn action_for(&self, change: &FileChange) -> ChangeAction {
        let path = change.path();
        if self.options.config_file.as_deref() == Some(path) {
            return ChangeAction::FullRebuild;
        }
        let framework = &self.options.invocation.framework;
        let id = path.display().to_string();
        if framework.is_component(&id) {
            if change.is_structural() {
                return ChangeAction::FullRebuild;
            }
            return ChangeAction::Rebuild;
        }
        if is_stylesheet(&id) && path.starts_with(&self.options.invocation.layout.src) {
            return ChangeAction::Rebuild;
        }
        ChangeAction::Restart
    }

    fn handle_change(&self, change: FileChange) {
        let action = self.action_for(&change);
        tracing::info!(path = %change.path().display(), ?action, "source changed");
        match action {
            ChangeAction::FullRebuild => {
                self.coordinator.signal(RestartSignal::Reset);
                self.builder.restart_all(true);
            }
            ChangeAction::Rebuild => self.builder.rebuild(&[change.path().to_path_buf()]),
            ChangeAction::Restart => {
                self.coordinator.signal(RestartSignal::Start);
            }
        }
    }

    fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.options.invocation.layout.src.clone()];
        roots.extend(self.options.config_file.iter().cloned());
        for path in &self.options.watch_paths {
            let path = absolute(&self.options.invocation.layout.root, path);
            if !roots.iter().any(|root| path.starts_with(root)) {
                roots.push(path);
            }
        }
        roots.retain(|root| root.exists());
        roots
    }

    /// Boot the server, start both watched passes, and keep going until
    /// `shutdown` resolves or the server cannot be started. The server is
    /// launched right away and restarted once both halves of a build are
    /// ready, so a failing first pass does not keep it down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.builder.subscribe();
        let mut fatal = self.process.fatal_errors();
        let invocation = &self.options.invocation;
        let (_watcher, mut changes) = SourceWatcher::watch_all(
            self.watch_roots(),
            invocation.ignore.clone(),
            invocation.debounce_ms,
        )?;

        self.coordinator.signal(RestartSignal::Start);
        self.builder.start_all(false, true);
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        self.coordinator.on_event(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "missed build events");
                    }
                    Err(RecvError::Closed) => break Ok(()),
                },
                Some(change) = changes.recv() => self.handle_change(change),
                Some(err) = fatal.recv() => break Err(err),
                () = &mut shutdown => {
                    tracing::info!("shutting down dev session");
                    break Ok(());
                }
            }
        };

        self.builder.stop_all();
        self.process.stop().await;
        result
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
