use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tabmux_pty::{DeliveryError, DeliveryTarget, SessionEvent};
use tokio::sync::mpsc;

use crate::ipc::Event;

/// The UI window on the other end of stdout, as a delivery target.
///
/// Sends never block: events go into the unbounded queue drained by the
/// event pump. `deliver` runs under the session's target lock, so a bounded
/// queue would let a slow reader stall closing the session. A backlog costs
/// memory until the pump catches up; it writes the backlog in batches with
/// each session's adjacent output merged.
pub struct WindowTarget {
    events: mpsc::UnboundedSender<Event>,
    destroyed: AtomicBool,
}

impl WindowTarget {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Arc<Self> {
        Arc::new(Self {
            events,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl DeliveryTarget for WindowTarget {
    fn deliver(&self, event: SessionEvent) -> Result<(), DeliveryError> {
        self.events
            .send(event.into())
            .map_err(|_| DeliveryError::Closed)
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}
