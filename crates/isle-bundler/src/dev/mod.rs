//! Development mode: restart coordination, the server child process, the
//! source watcher and the session tying them to a [`Builder`](crate::Builder).

pub mod process;
pub mod restart;
pub mod session;
pub mod watcher;

pub use process::{ServerOptions, ServerProcess};
pub use restart::{DevServerCoordinator, RestartAction, RestartSignal, RestartState};
pub use session::{DevOptions, DevSession};
pub use watcher::{FileChange, SourceWatcher};
