//! Delivery targets: the UI surfaces that receive session events.
//!
//! Sessions only ever hold a [`std::sync::Weak`] reference to their target.
//! Dropping or invalidating a target stops delivery but never touches the
//! process behind the session.

use crate::session::SessionId;

/// An event a session sends to its current delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Output { id: SessionId, data: String },
    Exit { id: SessionId, exit_code: u32 },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Output { id, .. } | SessionEvent::Exit { id, .. } => id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery target is closed")]
    Closed,
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// A surface (usually a window) that session events are sent to.
///
/// Implementations must not block: `deliver` runs on the process I/O thread
/// while the session's target lock is held.
pub trait DeliveryTarget: Send + Sync {
    fn deliver(&self, event: SessionEvent) -> Result<(), DeliveryError>;

    /// Whether the surface has been torn down. Destroyed targets are dropped
    /// from the session on the next delivery attempt.
    fn is_destroyed(&self) -> bool {
        false
    }
}
