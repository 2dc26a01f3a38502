//! Single-instance holder for the acquisition machine

use super::acquisition::CameraAcquisition;
use super::view::ViewState;
use crate::session::SessionListener;
use crate::traits::{GameSession, MemoryAccess};
use parking_lot::Mutex;
use periscope_common::{CameraConfig, CameraOffsets, CameraSet, Result, SessionEvent};
use std::sync::Arc;
use tracing::warn;

/// Owns at most one running [`CameraAcquisition`]
#[derive(Default)]
pub struct CameraRegistry {
    active: Mutex<Option<Arc<CameraAcquisition>>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a machine, or return the running one with a warning
    pub fn get_or_start(
        &self,
        mem: Arc<dyn MemoryAccess>,
        session: Arc<dyn GameSession>,
        view: Arc<ViewState>,
        config: CameraConfig,
        offsets: CameraOffsets,
    ) -> Result<Arc<CameraAcquisition>> {
        let mut active = self.active.lock();
        if let Some(existing) = active.as_ref().filter(|acq| acq.is_running()) {
            warn!(
                target: "periscope::camera",
                "Camera acquisition already running, returning existing instance"
            );
            return Ok(Arc::clone(existing));
        }

        let acquisition = Arc::new(CameraAcquisition::new(mem, session, view, config, offsets));
        acquisition.start()?;
        *active = Some(Arc::clone(&acquisition));
        Ok(acquisition)
    }

    /// The current machine, running or not
    pub fn current(&self) -> Option<Arc<CameraAcquisition>> {
        self.active.lock().clone()
    }

    /// Camera addresses of the current machine, empty when none
    pub fn cameras(&self) -> CameraSet {
        self.current()
            .map(|acq| acq.cameras())
            .unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some_and(|acq| acq.is_ready())
    }

    /// Stop and drop the current machine
    pub fn shutdown(&self) {
        let current = self.active.lock().take();
        if let Some(acquisition) = current {
            acquisition.shutdown();
        }
    }
}

impl SessionListener for CameraRegistry {
    fn listener_name(&self) -> &str {
        "camera_registry"
    }

    fn on_session_event(&self, event: SessionEvent) {
        if let Some(acquisition) = self.current() {
            acquisition.on_session_event(event);
        }
    }
}
