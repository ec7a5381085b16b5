use std::path::{Path, PathBuf};
use std::sync::Weak;

use parking_lot::Mutex;

use crate::pty::{EventSink, Process, PtyError};
use crate::target::{DeliveryTarget, SessionEvent};

/// Unique identifier for a terminal session. Chosen by the caller.
pub type SessionId = String;

/// Lifecycle of a session.
///
/// A `Running` session without a target is the "target invalidated" state:
/// its process keeps running but nothing is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Closing,
    Closed,
}

/// Identity of a live session as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub pid: u32,
}

struct Delivery {
    target: Option<Weak<dyn DeliveryTarget>>,
    status: SessionStatus,
}

/// One PTY process bound to a logical session id.
///
/// The process handle is fixed for the lifetime of the session. The delivery
/// target sits behind its own lock so retargeting and delivery never contend
/// with writes to the process.
pub struct Session {
    id: SessionId,
    generation: u64,
    cwd: PathBuf,
    pid: u32,
    process: Mutex<Box<dyn Process>>,
    delivery: Mutex<Delivery>,
}

impl Session {
    pub fn new(
        id: SessionId,
        generation: u64,
        cwd: PathBuf,
        process: Box<dyn Process>,
        target: Weak<dyn DeliveryTarget>,
    ) -> Self {
        let pid = process.pid();
        Self {
            id,
            generation,
            cwd,
            pid,
            process: Mutex::new(process),
            delivery: Mutex::new(Delivery {
                target: Some(target),
                status: SessionStatus::Running,
            }),
        }
    }

    /// Returns the session's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Distinguishes this incarnation from earlier sessions that used the same id.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            pid: self.pid,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.delivery.lock().status
    }

    /// Whether events would currently be delivered somewhere.
    pub fn has_target(&self) -> bool {
        self.delivery.lock().target.is_some()
    }

    /// Stop delivering events. The process is left alone.
    ///
    /// Returns `true` if a target was set. Once this returns, no further
    /// event reaches the previous target.
    pub fn invalidate_target(&self) -> bool {
        self.delivery.lock().target.take().is_some()
    }

    /// Send `event` to the current target, if there is one.
    ///
    /// The target lock is held across the send, which is what makes
    /// [`Session::invalidate_target`] a hard cut-off. A dropped, destroyed or
    /// failing target is cleared instead of reported.
    pub fn deliver(&self, event: SessionEvent) -> bool {
        let mut delivery = self.delivery.lock();
        let Some(weak) = delivery.target.as_ref() else {
            return false;
        };
        let Some(target) = weak.upgrade() else {
            log::debug!("delivery target for session {} is gone", self.id);
            delivery.target = None;
            return false;
        };
        if target.is_destroyed() {
            log::debug!("delivery target for session {} was destroyed", self.id);
            delivery.target = None;
            return false;
        }
        match target.deliver(event) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("dropping delivery target for session {}: {e}", self.id);
                delivery.target = None;
                false
            }
        }
    }

    /// Move from `Running` to `Closing`. Returns `false` if the session was
    /// already closing or closed.
    pub(crate) fn begin_closing(&self) -> bool {
        let mut delivery = self.delivery.lock();
        if delivery.status != SessionStatus::Running {
            return false;
        }
        delivery.status = SessionStatus::Closing;
        true
    }

    pub(crate) fn mark_closed(&self) {
        let mut delivery = self.delivery.lock();
        delivery.status = SessionStatus::Closed;
        delivery.target = None;
    }

    pub(crate) fn attach(&self, sink: EventSink) -> Result<(), PtyError> {
        self.process.lock().attach(sink)
    }

    /// Write user input to the process.
    pub fn write_input(&self, data: &[u8]) -> Result<(), PtyError> {
        self.process.lock().write(data)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.process.lock().resize(cols, rows)
    }

    pub fn terminate(&self) -> Result<(), PtyError> {
        self.process.lock().terminate()
    }

    pub fn kill(&self) -> Result<(), PtyError> {
        self.process.lock().kill()
    }

    pub fn has_exited(&self) -> bool {
        self.process.lock().has_exited()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("pid", &self.pid)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}
