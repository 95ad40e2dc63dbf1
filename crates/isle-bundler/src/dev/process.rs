//! The dev server child process.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::restart::RestartAction;
use crate::{Error, Result};

/// How to launch the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Program running the entry, e.g. `node`.
    pub runtime: String,
    pub entry: PathBuf,
    pub cwd: PathBuf,
    /// Delay before each (re)launch.
    pub restart_delay: Duration,
}

impl ServerOptions {
    pub fn new(runtime: impl Into<String>, entry: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            entry: entry.into(),
            cwd: cwd.into(),
            restart_delay: Duration::from_millis(10),
        }
    }
}

struct Inner {
    options: ServerOptions,
    booting: AtomicBool,
    child: Mutex<Option<Running>>,
    /// Status of the last child that exited on its own.
    last_exit: SyncMutex<Option<ExitStatus>>,
    fatal: SyncMutex<Option<mpsc::UnboundedSender<Error>>>,
}

/// A launched child, owned by its supervising task.
struct Running {
    pid: Option<u32>,
    kill: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    /// Ask the supervisor to kill the child and wait until it is gone.
    async fn terminate(self) {
        let _ = self.kill.send(());
        if let Err(err) = self.task.await {
            tracing::warn!(%err, "dev server supervisor failed");
        }
    }
}

/// Restartable server process. Clones share the same child.
#[derive(Clone)]
pub struct ServerProcess {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProcess")
            .field("options", &self.inner.options)
            .field("booting", &self.inner.booting.load(Ordering::Relaxed))
            .finish()
    }
}

impl ServerProcess {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                booting: AtomicBool::new(false),
                child: Mutex::new(None),
                last_exit: SyncMutex::new(None),
                fatal: SyncMutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Receiver for launch failures of triggered restarts.
    pub fn fatal_errors(&self) -> mpsc::UnboundedReceiver<Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.fatal.lock() = Some(tx);
        rx
    }

    /// Wait for the debounce delay, terminate the running child and launch
    /// a new one. A restart that is already booting is not re-entered.
    pub async fn restart(&self) -> Result<bool> {
        if self.inner.booting.swap(true, Ordering::SeqCst) {
            tracing::debug!("dev server already booting");
            return Ok(false);
        }
        tokio::time::sleep(self.inner.options.restart_delay).await;
        let result = self.relaunch().await;
        self.inner.booting.store(false, Ordering::SeqCst);
        result.map(|()| true)
    }

    async fn relaunch(&self) -> Result<()> {
        let mut slot = self.inner.child.lock().await;
        if let Some(previous) = slot.take() {
            previous.terminate().await;
        }

        let child = match self.spawn() {
            Ok(child) => child,
            Err(first) => {
                tracing::warn!(error = %first, "dev server failed to start, retrying");
                self.spawn().map_err(|second| {
                    Error::Spawn(format!(
                        "{} {}: {second}",
                        self.inner.options.runtime,
                        self.inner.options.entry.display()
                    ))
                })?
            }
        };
        let pid = child.id();
        tracing::info!(pid, entry = %self.inner.options.entry.display(), "dev server started");
        let (kill, killed) = oneshot::channel();
        let task = tokio::spawn(supervise(child, killed, Arc::clone(&self.inner)));
        *slot = Some(Running { pid, kill, task });
        Ok(())
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let options = &self.inner.options;
        Command::new(&options.runtime)
            .arg(&options.entry)
            .current_dir(&options.cwd)
            .kill_on_drop(true)
            .spawn()
    }

    /// Process id of the running child.
    pub async fn pid(&self) -> Option<u32> {
        self.inner.child.lock().await.as_ref().and_then(|running| running.pid)
    }

    /// Exit status of the last child that exited without being killed.
    pub fn last_exit(&self) -> Option<ExitStatus> {
        *self.inner.last_exit.lock()
    }

    /// Terminate the child, if any.
    pub async fn stop(&self) {
        if let Some(running) = self.inner.child.lock().await.take() {
            running.terminate().await;
        }
    }
}

/// Wait for the child to exit on its own, or kill it when asked to.
async fn supervise(mut child: Child, killed: oneshot::Receiver<()>, inner: Arc<Inner>) {
    let pid = child.id();
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                if status.success() {
                    tracing::info!(pid, "dev server exited");
                } else {
                    tracing::warn!(pid, code = status.code(), "dev server exited with {status}");
                }
                *inner.last_exit.lock() = Some(status);
            }
            Err(err) => tracing::warn!(pid, %err, "could not wait for dev server"),
        },
        _ = killed => {
            if let Err(err) = child.kill().await {
                tracing::warn!(pid, %err, "could not terminate dev server");
            }
        }
    }
}

impl RestartAction for ServerProcess {
    fn trigger(&self) {
        let process = self.clone();
        tokio::spawn(async move {
            if let Err(err) = process.restart().await {
                tracing::error!(error = %err, "dev server could not be started");
                if let Some(fatal) = process.inner.fatal.lock().as_ref() {
                    let _ = fatal.send(err);
                }
            }
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sleeper(dir: &TempDir) -> ServerOptions {
        let entry = dir.path().join("server.sh");
        fs::write(&entry, "sleep 30\n").unwrap();
        let mut options = ServerOptions::new("sh", entry, dir.path());
        options.restart_delay = Duration::from_millis(1);
        options
    }

    #[tokio::test]
    async fn restart_replaces_the_child() {
        let dir = TempDir::new().unwrap();
        let process = ServerProcess::new(sleeper(&dir));

        assert!(process.restart().await.unwrap());
        let first = process.pid().await.unwrap();
        assert!(process.restart().await.unwrap());
        let second = process.pid().await.unwrap();
        assert_ne!(first, second);

        process.stop().await;
        assert!(process.pid().await.is_none());
    }

    #[tokio::test]
    async fn overlapping_restarts_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut options = sleeper(&dir);
        options.restart_delay = Duration::from_millis(50);
        let process = ServerProcess::new(options);

        let (a, b) = tokio::join!(process.restart(), process.restart());
        assert_ne!(a.unwrap(), b.unwrap());
        process.stop().await;
    }

    #[tokio::test]
    async fn missing_runtime_fails_after_retry() {
        let dir = TempDir::new().unwrap();
        let mut options = sleeper(&dir);
        options.runtime = dir.path().join("no-such-runtime").display().to_string();
        let process = ServerProcess::new(options);

        let err = process.restart().await.unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
        assert!(!process.inner.booting.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn exit_status_of_the_child_is_recorded() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("server.sh");
        fs::write(&entry, "exit 3\n").unwrap();
        let mut options = ServerOptions::new("sh", entry, dir.path());
        options.restart_delay = Duration::from_millis(1);
        let process = ServerProcess::new(options);

        assert!(process.restart().await.unwrap());

        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(status) = process.last_exit() {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("child should exit");
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn killed_children_leave_no_exit_status() {
        let dir = TempDir::new().unwrap();
        let process = ServerProcess::new(sleeper(&dir));

        assert!(process.restart().await.unwrap());
        process.stop().await;
        assert!(process.last_exit().is_none());
    }
}
