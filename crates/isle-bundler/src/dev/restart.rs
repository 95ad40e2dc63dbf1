//! Two-flag restart state machine.
//!
//! The dev server is restarted only once both the server and the client
//! bundle finished a rebuild, so it never runs a server bundle compiled
//! against stale client file names.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::builder::BuildEvent;
use crate::layout::BuildType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSignal {
    /// Launch the server now, regardless of the flags.
    Start,
    /// Clear both flags without restarting.
    Reset,
    /// One build type finished a successful pass.
    Rebuilt(BuildType),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartState {
    pub server_rebuilt: bool,
    pub client_rebuilt: bool,
}

impl RestartState {
    /// Apply a signal. Returns whether the restart action must fire.
    pub fn apply(&mut self, signal: RestartSignal) -> bool {
        match signal {
            RestartSignal::Start => true,
            RestartSignal::Reset => {
                *self = RestartState::default();
                false
            }
            RestartSignal::Rebuilt(build_type) => {
                match build_type {
                    BuildType::Ssr => self.server_rebuilt = true,
                    BuildType::Client => self.client_rebuilt = true,
                }
                if self.server_rebuilt && self.client_rebuilt {
                    *self = RestartState::default();
                    return true;
                }
                false
            }
        }
    }
}

/// What the coordinator runs when a restart is due.
pub trait RestartAction: Send + Sync {
    /// Kick off a restart without waiting for it.
    fn trigger(&self);
}

/// Owns the restart state and fires the action.
#[derive(Debug)]
pub struct DevServerCoordinator<A> {
    state: Mutex<RestartState>,
    action: A,
    fired: AtomicUsize,
}

impl<A: RestartAction> DevServerCoordinator<A> {
    pub fn new(action: A) -> Self {
        Self {
            state: Mutex::new(RestartState::default()),
            action,
            fired: AtomicUsize::new(0),
        }
    }

    /// Apply `signal` atomically; returns whether a restart fired.
    pub fn signal(&self, signal: RestartSignal) -> bool {
        let fire = self.state.lock().apply(signal);
        if fire {
            self.fired.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(?signal, "restarting dev server");
            self.action.trigger();
        }
        fire
    }

    /// Translate a builder event. Failed passes leave the flags alone.
    pub fn on_event(&self, event: &BuildEvent) -> bool {
        match event {
            BuildEvent::Finished {
                build_type,
                error: None,
            } => self.signal(RestartSignal::Rebuilt(*build_type)),
            BuildEvent::Finished {
                build_type,
                error: Some(error),
            } => {
                tracing::warn!(build_type = %build_type, error, "not restarting after failed build");
                false
            }
            BuildEvent::Reset { .. } => self.signal(RestartSignal::Reset),
        }
    }

    pub fn state(&self) -> RestartState {
        *self.state.lock()
    }

    /// Restarts fired so far.
    pub fn restarts(&self) -> usize {
        self.fired.load(Ordering::Relaxed)
    }

    pub fn action(&self) -> &A {
        &self.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Counter(Arc<AtomicUsize>);

    impl RestartAction for Counter {
        fn trigger(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator() -> (DevServerCoordinator<Counter>, Arc<AtomicUsize>) {
        let counter = Counter::default();
        let count = Arc::clone(&counter.0);
        (DevServerCoordinator::new(counter), count)
    }

    #[test]
    fn restart_waits_for_both_halves() {
        for order in [
            [BuildType::Ssr, BuildType::Client],
            [BuildType::Client, BuildType::Ssr],
        ] {
            let (coordinator, count) = coordinator();
            assert!(!coordinator.signal(RestartSignal::Rebuilt(order[0])));
            assert_eq!(count.load(Ordering::SeqCst), 0);
            assert!(coordinator.signal(RestartSignal::Rebuilt(order[1])));
            assert_eq!(count.load(Ordering::SeqCst), 1);
            assert_eq!(coordinator.state(), RestartState::default());
        }
    }

    #[test]
    fn repeated_halves_do_not_fire_twice() {
        let (coordinator, count) = coordinator();
        coordinator.signal(RestartSignal::Rebuilt(BuildType::Ssr));
        coordinator.signal(RestartSignal::Rebuilt(BuildType::Ssr));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        coordinator.signal(RestartSignal::Rebuilt(BuildType::Client));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_without_restarting() {
        let (coordinator, count) = coordinator();
        coordinator.signal(RestartSignal::Rebuilt(BuildType::Ssr));
        assert!(!coordinator.signal(RestartSignal::Reset));
        coordinator.signal(RestartSignal::Rebuilt(BuildType::Client));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(
            coordinator.state(),
            RestartState {
                server_rebuilt: false,
                client_rebuilt: true
            }
        );
    }

    #[test]
    fn start_ignores_flags() {
        let (coordinator, count) = coordinator();
        coordinator.signal(RestartSignal::Rebuilt(BuildType::Client));
        assert!(coordinator.signal(RestartSignal::Start));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(coordinator.state().client_rebuilt);
    }

    #[test]
    fn failed_passes_do_not_set_flags() {
        let (coordinator, _) = coordinator();
        coordinator.on_event(&BuildEvent::Finished {
            build_type: BuildType::Ssr,
            error: Some("boom".to_string()),
        });
        coordinator.on_event(&BuildEvent::Finished {
            build_type: BuildType::Client,
            error: None,
        });
        assert_eq!(coordinator.restarts(), 0);
        coordinator.on_event(&BuildEvent::Finished {
            build_type: BuildType::Ssr,
            error: None,
        });
        assert_eq!(coordinator.restarts(), 1);
    }

    #[test]
    fn reset_between_rebuilds_defers_restart() {
        let (coordinator, count) = coordinator();
        // client finished the previous cycle, then a rebuild aborted both passes
        coordinator.on_event(&BuildEvent::Finished {
            build_type: BuildType::Client,
            error: None,
        });
        coordinator.on_event(&BuildEvent::Reset {
            build_type: BuildType::Ssr,
        });

        coordinator.on_event(&BuildEvent::Finished {
            build_type: BuildType::Ssr,
            error: None,
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        coordinator.on_event(&BuildEvent::Finished {
            build_type: BuildType::Client,
            error: None,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
