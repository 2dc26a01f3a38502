//! State toggle write feature
//!
//! Drives a component on the first-person camera's game object between an
//! "on" and an "off" payload of field writes. The target component is resolved
//! by class name once and cached; writes are queued only when the desired state
//! differs from the last committed one.

use crate::feature::{FeatureContext, MemWriteFeature};
use crate::remote::find_component;
use crate::scatter::ScatterWriteHandle;
use crate::traits::MemoryAccessExt;
use parking_lot::Mutex;
use periscope_common::{CameraOffsets, ComponentOffsets, RemoteAddress, Result, SessionEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A single field value written into the component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    F32(f32),
    I32(i32),
}

/// Field writes for one toggle state, as (offset in component, value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TogglePayload {
    pub fields: Vec<(u64, FieldValue)>,
}

impl TogglePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, offset: u64, value: bool) -> Self {
        self.fields.push((offset, FieldValue::Bool(value)));
        self
    }

    pub fn with_f32(mut self, offset: u64, value: f32) -> Self {
        self.fields.push((offset, FieldValue::F32(value)));
        self
    }

    pub fn with_i32(mut self, offset: u64, value: i32) -> Self {
        self.fields.push((offset, FieldValue::I32(value)));
        self
    }

    fn queue(&self, component: RemoteAddress, batch: &mut ScatterWriteHandle) -> Result<()> {
        for (offset, value) in &self.fields {
            let addr = component.offset(*offset);
            match *value {
                FieldValue::Bool(v) => batch.add_write_bool(addr, v)?,
                FieldValue::F32(v) => batch.add_write(addr, v)?,
                FieldValue::I32(v) => batch.add_write(addr, v)?,
            }
        }
        Ok(())
    }
}

/// Generic on/off write feature bound to a component class
pub struct StateToggle {
    name: String,
    class_name: String,
    on: TogglePayload,
    off: TogglePayload,
    suppress_while_aiming: bool,
    min_interval: Duration,
    camera_offsets: CameraOffsets,
    component_offsets: ComponentOffsets,
    component: Option<RemoteAddress>,
    committed: Arc<Mutex<Option<bool>>>,
}

impl StateToggle {
    pub fn new(
        name: impl Into<String>,
        class_name: impl Into<String>,
        on: TogglePayload,
        off: TogglePayload,
    ) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            on,
            off,
            suppress_while_aiming: false,
            min_interval: Duration::ZERO,
            camera_offsets: CameraOffsets::default(),
            component_offsets: ComponentOffsets::default(),
            component: None,
            committed: Arc::new(Mutex::new(None)),
        }
    }

    /// Force the "off" state while the player aims down sights
    pub fn suppress_while_aiming(mut self, suppress: bool) -> Self {
        self.suppress_while_aiming = suppress;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_offsets(mut self, camera: CameraOffsets, component: ComponentOffsets) -> Self {
        self.camera_offsets = camera;
        self.component_offsets = component;
        self
    }

    /// Last state that reached the target, if any
    pub fn committed_state(&self) -> Option<bool> {
        *self.committed.lock()
    }

    pub fn cached_component(&self) -> Option<RemoteAddress> {
        self.component
    }

    fn resolve_component(&mut self, ctx: &FeatureContext<'_>) -> Result<Option<RemoteAddress>> {
        if let Some(component) = self.component {
            return Ok(Some(component));
        }
        let Some(fps) = ctx.cameras.fps.valid() else {
            return Ok(None);
        };
        let game_object = ctx.mem.read_valid_ptr(
            fps.offset(self.camera_offsets.component_game_object),
            false,
        )?;
        let found = find_component(
            ctx.mem,
            game_object,
            &self.class_name,
            &self.component_offsets,
        )?;
        if let Some(component) = found {
            debug!(
                target: "periscope::writes",
                feature = %self.name,
                class = %self.class_name,
                component = %component,
                "Resolved toggle component"
            );
        }
        self.component = found;
        Ok(found)
    }

    fn reset(&mut self) {
        self.component = None;
        *self.committed.lock() = None;
    }
}

impl MemWriteFeature for StateToggle {
    fn name(&self) -> &str {
        &self.name
    }

    fn needs_disable_cleanup(&self) -> bool {
        true
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn apply(
        &mut self,
        ctx: &FeatureContext<'_>,
        enabled: bool,
        batch: &mut ScatterWriteHandle,
    ) -> Result<()> {
        let aiming = ctx
            .player
            .as_ref()
            .is_some_and(|player| player.is_aiming());
        let desired = enabled && !(self.suppress_while_aiming && aiming);
        if self.committed_state() == Some(desired) {
            return Ok(());
        }

        let Some(component) = self.resolve_component(ctx)? else {
            trace!(
                target: "periscope::writes",
                feature = %self.name,
                class = %self.class_name,
                "Toggle component not found"
            );
            return Ok(());
        };

        let payload = if desired { &self.on } else { &self.off };
        payload.queue(component, batch)?;

        let committed = self.committed.clone();
        batch.on_committed(move || *committed.lock() = Some(desired))
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::SessionStarted
            | SessionEvent::SessionStopped
            | SessionEvent::ProcessStopped => self.reset(),
            SessionEvent::ProcessStarted => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimPlayer, SimScene};
    use periscope_common::{CameraSet, OffsetsConfig};

    struct Fixture {
        scene: SimScene,
        cameras: CameraSet,
        component: RemoteAddress,
        player: Arc<SimPlayer>,
    }

    fn fixture() -> Fixture {
        let scene = SimScene::new(OffsetsConfig::default());
        let fps = scene.add_camera("FPSCamera(Clone)");
        let game_object = scene.game_object(fps).unwrap();
        scene.add_component(game_object, "Transform");
        let component = scene.add_component(game_object, "ThermalVision");
        let player = scene.start_session();
        Fixture {
            cameras: CameraSet::new(fps, RemoteAddress::NULL),
            scene,
            component,
            player,
        }
    }

    fn thermal() -> StateToggle {
        StateToggle::new(
            "thermal",
            "ThermalVision",
            TogglePayload::new().with_bool(0x20, true).with_f32(0x24, 1.5),
            TogglePayload::new().with_bool(0x20, false).with_f32(0x24, 0.0),
        )
    }

    fn apply(f: &Fixture, toggle: &mut StateToggle, enabled: bool) -> usize {
        let ctx = FeatureContext {
            mem: &f.scene.target,
            player: Some(f.player.clone()),
            cameras: f.cameras,
        };
        let mut batch = ScatterWriteHandle::create(&f.scene.target).unwrap();
        toggle.apply(&ctx, enabled, &mut batch).unwrap();
        let writes = batch.pending_writes();
        batch.execute().unwrap();
        writes
    }

    #[test]
    fn test_writes_only_on_state_change() {
        let f = fixture();
        let mut toggle = thermal();
        assert_eq!(apply(&f, &mut toggle, true), 2);
        assert_eq!(toggle.committed_state(), Some(true));
        assert_eq!(f.scene.target.peek::<u8>(f.component.offset(0x20)), Some(1));
        assert_eq!(f.scene.target.peek::<f32>(f.component.offset(0x24)), Some(1.5));

        assert_eq!(apply(&f, &mut toggle, true), 0);

        assert_eq!(apply(&f, &mut toggle, false), 2);
        assert_eq!(toggle.committed_state(), Some(false));
        assert_eq!(f.scene.target.peek::<u8>(f.component.offset(0x20)), Some(0));
    }

    #[test]
    fn test_state_commits_only_after_execute() {
        let f = fixture();
        let mut toggle = thermal();
        let ctx = FeatureContext {
            mem: &f.scene.target,
            player: Some(f.player.clone()),
            cameras: f.cameras,
        };
        let mut batch = ScatterWriteHandle::create(&f.scene.target).unwrap();
        toggle.apply(&ctx, true, &mut batch).unwrap();
        assert_eq!(toggle.committed_state(), None);
        batch.dispose();
        assert_eq!(toggle.committed_state(), None);

        // not committed, so the next tick writes again
        assert_eq!(apply(&f, &mut toggle, true), 2);
    }

    #[test]
    fn test_component_is_cached() {
        let f = fixture();
        let mut toggle = thermal();
        apply(&f, &mut toggle, true);
        assert_eq!(toggle.cached_component(), Some(f.component));
    }

    #[test]
    fn test_suppressed_while_aiming() {
        let f = fixture();
        let mut toggle = thermal().suppress_while_aiming(true);
        apply(&f, &mut toggle, true);
        f.player.set_aiming(true);
        assert_eq!(apply(&f, &mut toggle, true), 2);
        assert_eq!(toggle.committed_state(), Some(false));
        f.player.set_aiming(false);
        assert_eq!(apply(&f, &mut toggle, true), 2);
        assert_eq!(toggle.committed_state(), Some(true));
    }

    #[test]
    fn test_session_reset_clears_cache() {
        let f = fixture();
        let mut toggle = thermal();
        apply(&f, &mut toggle, true);
        toggle.on_session_event(SessionEvent::SessionStopped);
        assert_eq!(toggle.cached_component(), None);
        assert_eq!(toggle.committed_state(), None);
        assert_eq!(apply(&f, &mut toggle, true), 2);
    }

    #[test]
    fn test_missing_camera_writes_nothing() {
        let f = fixture();
        let mut toggle = thermal();
        let ctx = FeatureContext {
            mem: &f.scene.target,
            player: Some(f.player.clone()),
            cameras: CameraSet::default(),
        };
        let mut batch = ScatterWriteHandle::create(&f.scene.target).unwrap();
        toggle.apply(&ctx, true, &mut batch).unwrap();
        assert_eq!(batch.pending_writes(), 0);
    }
}
