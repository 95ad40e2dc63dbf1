//! Build handles for both build types and the build invocation surface.
//!
//! A [`Builder`] owns one task per [`BuildType`]. Starting a type that is
//! already running either does nothing or, when forced, aborts the old task
//! and broadcasts [`BuildEvent::Reset`] before the replacement starts. Every
//! finished pass is broadcast as [`BuildEvent::Finished`]; errors travel in
//! the event and are never returned to callers. A pass that panics still
//! reports a failed `Finished`, and a running pass that is aborted for a
//! rebuild is announced with `Reset`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::{BackendAdapter, BackendContext, BackendKind, create_backend};
use crate::compiler::{ComponentCompiler, Framework};
use crate::dev::watcher::SourceWatcher;
use crate::layout::{BuildType, ProjectLayout};
use crate::Result;

const EVENT_CAPACITY: usize = 64;

/// Notifications emitted by a [`Builder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BuildEvent {
    /// A pass finished; `error` is set when it failed.
    Finished {
        build_type: BuildType,
        error: Option<String>,
    },
    /// A running pass was aborted and replaced.
    Reset { build_type: BuildType },
}

/// What to build and how.
#[derive(Debug, Clone)]
pub struct BuildInvocation {
    pub layout: ProjectLayout,
    /// Keep watching sources after the first pass.
    pub watch: bool,
    /// Literal replacements applied to every module.
    pub replacements: IndexMap<String, String>,
    pub backend: BackendKind,
    pub production: bool,
    pub framework: Framework,
    /// Compiler override; the built-in block compiler otherwise.
    pub compiler: Option<Arc<dyn ComponentCompiler>>,
    pub extra_entries: Vec<PathBuf>,
    /// Patterns the source watcher ignores.
    pub ignore: Vec<String>,
    pub debounce_ms: u64,
}

impl BuildInvocation {
    pub fn new(layout: ProjectLayout) -> Self {
        Self {
            layout,
            watch: false,
            replacements: IndexMap::new(),
            backend: BackendKind::default(),
            production: false,
            framework: Framework::default(),
            compiler: None,
            extra_entries: Vec::new(),
            ignore: vec!["node_modules".to_string()],
            debounce_ms: 50,
        }
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_replacement(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.replacements.insert(from.into(), to.into());
        self
    }

    /// The shared context both build types run with.
    pub fn context(&self) -> BackendContext {
        let mut ctx = BackendContext::new(self.layout.clone());
        ctx.state = crate::state::BuildState::shared(self.framework.policy());
        ctx.framework = self.framework.clone();
        if let Some(compiler) = &self.compiler {
            ctx.compiler = Arc::clone(compiler);
        }
        ctx.replacements = self.replacements.clone();
        ctx.production = self.production;
        ctx.extra_entries = self.extra_entries.clone();
        ctx
    }
}

/// Result of the first pass of one build type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub build_type: BuildType,
    pub error: Option<String>,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct Pass {
    handle: JoinHandle<()>,
    watch: bool,
}

/// Running build handles for both types.
pub struct Builder {
    ctx: Arc<BackendContext>,
    backend: Arc<dyn BackendAdapter>,
    passes: Mutex<FxHashMap<BuildType, Pass>>,
    events: broadcast::Sender<BuildEvent>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("backend", &self.backend.kind())
            .field("passes", &self.passes.lock().len())
            .finish()
    }
}

impl Builder {
    pub fn new(invocation: &BuildInvocation) -> Self {
        let ctx = Arc::new(invocation.context());
        let backend = create_backend(invocation.backend, Arc::clone(&ctx));
        Self::with_backend(ctx, backend)
    }

    /// A builder running passes through an already constructed backend.
    pub fn with_backend(ctx: Arc<BackendContext>, backend: Arc<dyn BackendAdapter>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ctx,
            backend,
            passes: Mutex::new(FxHashMap::default()),
            events,
        }
    }

    pub fn context(&self) -> &Arc<BackendContext> {
        &self.ctx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    /// Start a pass of `build_type`.
    ///
    /// Returns `false` when a handle for the type exists and `force` is not
    /// set. A forced start aborts the existing handle and emits
    /// [`BuildEvent::Reset`] first.
    pub fn start(&self, build_type: BuildType, force: bool, watch: bool) -> bool {
        let mut passes = self.passes.lock();
        if let Some(existing) = passes.get(&build_type) {
            if !force {
                return false;
            }
            existing.handle.abort();
            tracing::debug!(build_type = %build_type, "replacing running build");
            let _ = self.events.send(BuildEvent::Reset { build_type });
        }
        let handle = self.spawn_pass(build_type);
        passes.insert(build_type, Pass { handle, watch });
        true
    }

    /// Start both types, server first.
    pub fn start_all(&self, force: bool, watch: bool) {
        for build_type in BuildType::ALL {
            self.start(build_type, force, watch);
        }
    }

    /// Invalidate `changed` files and re-run every watched pass.
    ///
    /// Passes still running are aborted and announced with
    /// [`BuildEvent::Reset`] before their replacement starts.
    pub fn rebuild(&self, changed: &[PathBuf]) {
        for path in changed {
            self.ctx.state.invalidate(&path.display().to_string());
        }
        let mut passes = self.passes.lock();
        for build_type in BuildType::ALL {
            let Some(pass) = passes.get_mut(&build_type) else {
                continue;
            };
            if !pass.watch {
                continue;
            }
            if !pass.handle.is_finished() {
                pass.handle.abort();
                tracing::debug!(build_type = %build_type, "aborting running build");
                let _ = self.events.send(BuildEvent::Reset { build_type });
            }
            pass.handle = self.spawn_pass(build_type);
        }
    }

    /// Forget all recorded dependencies and stylesheets, then force both
    /// types to rebuild from scratch.
    pub fn restart_all(&self, watch: bool) {
        self.ctx.state.reset();
        self.start_all(true, watch);
    }

    pub fn is_running(&self, build_type: BuildType) -> bool {
        self.passes
            .lock()
            .get(&build_type)
            .is_some_and(|pass| !pass.handle.is_finished())
    }

    pub fn stop_all(&self) {
        for (build_type, pass) in self.passes.lock().drain() {
            tracing::debug!(build_type = %build_type, "stopping build");
            pass.handle.abort();
        }
    }

    fn spawn_pass(&self, build_type: BuildType) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        // the inner task isolates backend panics; aborting the outer task
        // drops the guard and aborts the inner one with it
        tokio::spawn(async move {
            let started = Instant::now();
            let pass = AbortOnDrop(tokio::spawn(async move { backend.build(build_type).await }));
            let error = match pass.join().await {
                Ok(Ok(summary)) => {
                    tracing::info!(
                        build_type = %build_type,
                        entries = summary.entries.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "build finished"
                    );
                    None
                }
                Ok(Err(err)) => {
                    tracing::error!(build_type = %build_type, error = %err, "build failed");
                    Some(err.to_string())
                }
                Err(err) => {
                    tracing::error!(build_type = %build_type, error = %err, "build task failed");
                    Some(format!("build task failed: {err}"))
                }
            };
            let _ = events.send(BuildEvent::Finished { build_type, error });
        })
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> std::result::Result<T, tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// A started build: first-pass outcomes plus, in watch mode, the live
/// builder and its watcher.
#[derive(Debug)]
pub struct BuildSession {
    builder: Arc<Builder>,
    outcomes: Vec<BuildOutcome>,
    watch_task: Option<JoinHandle<()>>,
}

impl BuildSession {
    /// First-pass outcomes, server first.
    pub fn outcomes(&self) -> &[BuildOutcome] {
        &self.outcomes
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(BuildOutcome::is_success)
    }

    pub fn builder(&self) -> &Arc<Builder> {
        &self.builder
    }

    /// Later rebuilds are only reported here.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.builder.subscribe()
    }

    pub fn is_watching(&self) -> bool {
        self.watch_task.is_some()
    }

    /// Wait until the watcher stops (never, unless it fails).
    pub async fn wait(&mut self) {
        if let Some(task) = self.watch_task.as_mut() {
            let _ = task.await;
        }
    }

    pub fn stop(self) {
        if let Some(task) = &self.watch_task {
            task.abort();
        }
        self.builder.stop_all();
    }
}

/// Run the first pass of both build types and resolve once both finished.
///
/// Failed passes are logged and reported in the outcomes, never returned as
/// errors. With `watch`, source changes keep triggering rebuilds whose
/// results only reach [`BuildSession::subscribe`].
pub async fn build(invocation: BuildInvocation) -> Result<BuildSession> {
    let builder = Arc::new(Builder::new(&invocation));
    let mut events = builder.subscribe();
    builder.start_all(false, invocation.watch);

    let mut outcomes: Vec<BuildOutcome> = Vec::with_capacity(BuildType::ALL.len());
    while outcomes.len() < BuildType::ALL.len() {
        match events.recv().await {
            Ok(BuildEvent::Finished { build_type, error }) => {
                if !outcomes.iter().any(|o| o.build_type == build_type) {
                    outcomes.push(BuildOutcome { build_type, error });
                }
            }
            Ok(BuildEvent::Reset { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "missed build events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    outcomes.sort_by_key(|outcome| outcome.build_type);

    let watch_task = if invocation.watch {
        let (watcher, mut changes) = SourceWatcher::new(
            invocation.layout.src.clone(),
            invocation.ignore.clone(),
            invocation.debounce_ms,
        )?;
        let builder = Arc::clone(&builder);
        Some(tokio::spawn(async move {
            let _watcher = watcher;
            while let Some(change) = changes.recv().await {
                tracing::debug!(path = %change.path().display(), "source changed");
                builder.rebuild(&[change.path().to_path_buf()]);
            }
        }))
    } else {
        None
    };

    Ok(BuildSession {
        builder,
        outcomes,
        watch_task,
    })
}
