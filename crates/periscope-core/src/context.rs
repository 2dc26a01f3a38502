//! Periscope context
//!
//! Owns the session hub, camera registry, view state and write multiplexer
//! for one target. Callers drive the realtime and write ticks; the camera
//! machine runs on its own worker.

use crate::camera::{CameraAcquisition, CameraRegistry, ViewState};
use crate::feature::{FeatureGate, MemWriteFeature, WriteSwitches};
use crate::session::SessionHub;
use crate::traits::{GameSession, MemoryAccess};
use crate::writes::{TickReport, WriteMultiplexer};
use glam::{Vec2, Vec3};
use parking_lot::Mutex;
use periscope_common::{
    CameraDebugSnapshot, CameraSet, PeriscopeConfig, Result, ScreenCheck, SessionEvent,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct Periscope {
    config: PeriscopeConfig,
    mem: Arc<dyn MemoryAccess>,
    session: Arc<dyn GameSession>,
    hub: SessionHub,
    registry: Arc<CameraRegistry>,
    view: Arc<ViewState>,
    switches: Arc<WriteSwitches>,
    multiplexer: Arc<WriteMultiplexer>,
}

impl Periscope {
    pub fn new(
        config: PeriscopeConfig,
        mem: Arc<dyn MemoryAccess>,
        session: Arc<dyn GameSession>,
    ) -> Self {
        let view = Arc::new(ViewState::new(&config.view, config.offsets.camera.clone()));
        let switches = Arc::new(WriteSwitches::from_config(&config.writes));
        let multiplexer = Arc::new(WriteMultiplexer::new(switches.clone()));
        let registry = Arc::new(CameraRegistry::new());

        let hub = SessionHub::new();
        hub.subscribe(registry.clone());
        hub.subscribe(multiplexer.clone());

        info!(
            writes_enabled = config.writes.enabled,
            features = config.writes.features.len(),
            "Periscope initialized"
        );

        Self {
            config,
            mem,
            session,
            hub,
            registry,
            view,
            switches,
            multiplexer,
        }
    }

    pub fn config(&self) -> &PeriscopeConfig {
        &self.config
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }

    pub fn switches(&self) -> &Arc<WriteSwitches> {
        &self.switches
    }

    pub fn multiplexer(&self) -> &Arc<WriteMultiplexer> {
        &self.multiplexer
    }

    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    /// Start the camera worker (or get the running one)
    pub fn start_camera(&self) -> Result<Arc<CameraAcquisition>> {
        self.registry.get_or_start(
            self.mem.clone(),
            self.session.clone(),
            self.view.clone(),
            self.config.camera.clone(),
            self.config.offsets.camera.clone(),
        )
    }

    pub fn cameras(&self) -> CameraSet {
        self.registry.cameras()
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_ready()
    }

    pub fn register_feature(
        &self,
        feature: impl MemWriteFeature + 'static,
    ) -> Arc<Mutex<FeatureGate>> {
        self.multiplexer.register(feature)
    }

    /// Refresh the view state; `false` when there was nothing to read
    pub fn realtime_tick(&self) -> Result<bool> {
        if !self.session.in_session() {
            return Ok(false);
        }
        let Some(player) = self.session.local_player() else {
            return Ok(false);
        };
        let cameras = self.cameras();
        if !cameras.fps.is_valid() {
            return Ok(false);
        }
        self.view
            .refresh(self.mem.as_ref(), player.as_ref(), &cameras)
    }

    /// Run one write tick at `now`
    pub fn write_tick(&self, now: Instant) -> Result<TickReport> {
        self.multiplexer.tick(
            self.mem.as_ref(),
            self.session.as_ref(),
            self.cameras(),
            now,
        )
    }

    /// Deliver a lifecycle event to every component holding session state
    pub fn handle_session_event(&self, event: SessionEvent) {
        debug!(event = %event, "Session event");
        if event.is_teardown() {
            self.view.reset();
        }
        self.hub.publish(event);
    }

    pub fn world_to_screen(&self, pos: Vec3, check: ScreenCheck) -> Option<Vec2> {
        self.view.world_to_screen(pos, check)
    }

    pub fn debug_snapshot(&self) -> CameraDebugSnapshot {
        self.view.debug_snapshot(&self.cameras(), self.is_ready())
    }

    /// Stop the camera worker
    pub fn shutdown(&self) {
        self.registry.shutdown();
        info!("Periscope shut down");
    }
}

impl Drop for Periscope {
    fn drop(&mut self) {
        self.registry.shutdown();
    }
}
