//! Session lifecycle signals

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle events of the target process and of the observed game session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    ProcessStarted,
    ProcessStopped,
    SessionStarted,
    SessionStopped,
}

impl SessionEvent {
    /// Events after which derived state must be dropped
    pub fn is_teardown(&self) -> bool {
        matches!(self, SessionEvent::SessionStopped | SessionEvent::ProcessStopped)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::ProcessStarted => "process_started",
            SessionEvent::ProcessStopped => "process_stopped",
            SessionEvent::SessionStarted => "session_started",
            SessionEvent::SessionStopped => "session_stopped",
        };
        f.write_str(name)
    }
}
