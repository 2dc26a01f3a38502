//! Session lifecycle fan-out
//!
//! Components holding session-derived state (camera addresses, cached
//! component pointers, committed write state) subscribe here and reset
//! themselves when the session or the process goes away.

use parking_lot::RwLock;
use periscope_common::SessionEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Receiver of session lifecycle events
pub trait SessionListener: Send + Sync {
    /// Name used in logs
    fn listener_name(&self) -> &str;

    /// Handle one event. Must be idempotent: the same teardown may arrive twice.
    fn on_session_event(&self, event: SessionEvent);
}

/// Synchronous fan-out of [`SessionEvent`]s to subscribed listeners
#[derive(Default)]
pub struct SessionHub {
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener; events are delivered in subscription order
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    /// Deliver `event` to every listener
    ///
    /// A panicking listener is logged and skipped; the rest still see the event.
    pub fn publish(&self, event: SessionEvent) {
        let listeners = self.listeners.read().clone();
        debug!(
            target: "periscope::session",
            event = %event,
            listeners = listeners.len(),
            "Publishing session event"
        );
        for listener in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_session_event(event)));
            if result.is_err() {
                error!(
                    target: "periscope::session",
                    listener = listener.listener_name(),
                    event = %event,
                    "Session listener panicked"
                );
            }
        }
    }

    /// Get subscriber count
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}
