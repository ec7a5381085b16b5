//! tabmux-pty: PTY session management for tabmux.
//!
//! Each session is a shell process in a pseudo-terminal, identified by a
//! caller-chosen id. Its output is sent to a delivery target (a window) that
//! can go away at any time without taking the process with it.
//!
//! # Architecture
//!
//! - [`Spawner`] / [`Process`]: start and drive a child process. [`NativeSpawner`]
//!   uses portable-pty.
//! - [`Session`]: one process bound to an id and a weak delivery target.
//! - [`SessionRegistry`]: the live sessions, keyed by id.
//! - [`SessionManager`]: create, write, resize, close and shutdown.

mod io_thread;
pub mod manager;
pub mod pty;
pub mod registry;
pub mod session;
pub mod target;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use manager::{ManagerConfig, SessionError, SessionManager, ShutdownReport};
pub use pty::{
    default_shell, resolve_cwd, NativeSpawner, Process, ProcessEvent, PtyError, PtyHandle,
    SpawnCommand, Spawner,
};
pub use registry::{RegistryError, SessionRegistry};
pub use session::{Session, SessionId, SessionInfo, SessionStatus};
pub use target::{DeliveryError, DeliveryTarget, SessionEvent};
