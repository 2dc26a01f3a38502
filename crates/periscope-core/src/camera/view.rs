//! View state and world-to-screen projection
//!
//! The realtime tick reads the active camera's view matrix plus the FPS
//! camera's lens in one scatter batch and publishes the result as a single
//! [`ViewSnapshot`]. Projection works on a copy of that snapshot, so readers
//! never see a matrix from one tick with flags from another.

use crate::scatter::{ReadBatch, ScatterResults};
use crate::traits::{LocalPlayer, MemoryAccess, MemoryAccessExt};
use glam::{Vec2, Vec3};
use parking_lot::RwLock;
use periscope_common::{
    CameraDebugSnapshot, CameraOffsets, CameraSet, RawMatrix, RemoteAddress, Result, ScreenCheck,
    ViewConfig, ViewMatrix, Viewport,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Points with a smaller homogeneous w are behind the camera
const MIN_W: f32 = 1e-4;
const MAX_ZOOM: f32 = 100.0;

/// Everything the projector needs, published atomically
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSnapshot {
    pub matrix: ViewMatrix,
    /// Vertical field of view in degrees, 0 until first read
    pub fov: f32,
    pub aspect: f32,
    pub zoom_level: f32,
    pub is_ads: bool,
    pub is_scoped: bool,
    pub active_camera: RemoteAddress,
    pub updated: Option<Instant>,
}

impl Default for ViewSnapshot {
    fn default() -> Self {
        Self {
            matrix: ViewMatrix::identity(),
            fov: 0.0,
            aspect: 0.0,
            zoom_level: 1.0,
            is_ads: false,
            is_scoped: false,
            active_camera: RemoteAddress::NULL,
            updated: None,
        }
    }
}

/// Project `pos` with `snapshot` onto `viewport`
///
/// Returns `None` for points behind the camera, non-finite results and,
/// depending on `check`, points off screen.
pub fn project(
    snapshot: &ViewSnapshot,
    viewport: &Viewport,
    pos: Vec3,
    check: ScreenCheck,
    tolerance: f32,
) -> Option<Vec2> {
    let vm = &snapshot.matrix;
    let w = vm.translation.dot(pos) + vm.m44;
    if w < MIN_W {
        return None;
    }

    let mut x = vm.right.dot(pos) + vm.m14;
    let mut y = vm.up.dot(pos) + vm.m24;

    if snapshot.is_scoped {
        let half = snapshot.fov.to_radians() * 0.5;
        let cot = half.cos() / half.sin();
        x /= cot * snapshot.aspect * 0.5;
        y /= cot * 0.5;
    }

    let center = viewport.center();
    let screen = Vec2::new(center.x * (1.0 + x / w), center.y * (1.0 - y / w));
    if !screen.is_finite() {
        return None;
    }

    let on_screen = match check {
        ScreenCheck::Off => true,
        ScreenCheck::Strict => viewport.contains(screen, 0.0),
        ScreenCheck::Tolerant => viewport.contains(screen, tolerance),
    };
    on_screen.then_some(screen)
}

/// Shared view state written by the realtime tick and read by projection callers
pub struct ViewState {
    snapshot: Arc<RwLock<ViewSnapshot>>,
    viewport: RwLock<Viewport>,
    tolerance: f32,
    offsets: CameraOffsets,
}

impl ViewState {
    pub fn new(config: &ViewConfig, offsets: CameraOffsets) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(ViewSnapshot::default())),
            viewport: RwLock::new(Viewport::from_resolution(
                config.viewport_width,
                config.viewport_height,
            )),
            tolerance: config.screen_tolerance,
            offsets,
        }
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> ViewSnapshot {
        *self.snapshot.read()
    }

    pub fn is_ads(&self) -> bool {
        self.snapshot.read().is_ads
    }

    pub fn is_scoped(&self) -> bool {
        self.snapshot.read().is_scoped
    }

    pub fn zoom_level(&self) -> f32 {
        self.snapshot.read().zoom_level
    }

    pub fn fov(&self) -> f32 {
        self.snapshot.read().fov
    }

    pub fn aspect(&self) -> f32 {
        self.snapshot.read().aspect
    }

    pub fn matrix(&self) -> ViewMatrix {
        self.snapshot.read().matrix
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.read()
    }

    /// Replace the viewport; sizes below 640x480 fall back to 1920x1080
    pub fn set_viewport(&self, width: u32, height: u32) {
        *self.viewport.write() = Viewport::from_resolution(width, height);
    }

    /// Publish a matrix that passed validation outside the realtime tick
    pub fn publish_matrix(&self, raw: &RawMatrix) {
        let mut snapshot = self.snapshot.write();
        snapshot.matrix = ViewMatrix::from_raw(raw);
        snapshot.updated = Some(Instant::now());
    }

    /// Back to identity matrix and default flags
    pub fn reset(&self) {
        *self.snapshot.write() = ViewSnapshot::default();
    }

    /// Resolve ADS/scoped state and queue this tick's reads on `batch`
    ///
    /// The lens is always read from the FPS camera, so the tick is skipped
    /// while the FPS camera is unresolved even if the optic one is. Returns
    /// `false` when nothing was queued. The flags are published together with
    /// the matrix once the batch completes; a failed batch leaves the previous
    /// snapshot untouched.
    pub fn prepare_realtime(
        &self,
        batch: &mut ReadBatch,
        mem: &dyn MemoryAccess,
        player: &dyn LocalPlayer,
        cameras: &CameraSet,
    ) -> Result<bool> {
        let is_ads = player.is_aiming();
        let (is_scoped, zoom_level) = if is_ads {
            self.scope_state(mem, player, cameras)
        } else {
            (false, 1.0)
        };

        let Some(active) = cameras.view_camera(is_scoped) else {
            trace!(target: "periscope::view", "No camera resolved, skipping realtime tick");
            return Ok(false);
        };
        let Some(fps) = cameras.fps.valid() else {
            trace!(target: "periscope::view", "FPS camera unresolved, skipping realtime tick");
            return Ok(false);
        };

        let reads = RealtimeReads {
            matrix: active.offset(self.offsets.view_matrix),
            fov: fps.offset(self.offsets.fov),
            aspect: fps.offset(self.offsets.aspect),
            active,
            is_ads,
            is_scoped,
            zoom_level,
        };
        batch.prepare_read_value::<RawMatrix>(reads.matrix)?;
        batch.prepare_read_value::<f32>(reads.fov)?;
        batch.prepare_read_value::<f32>(reads.aspect)?;

        let snapshot = Arc::clone(&self.snapshot);
        batch.on_completed(move |results| apply_realtime(&snapshot, results, &reads));
        Ok(true)
    }

    /// Run one realtime tick in its own batch
    pub fn refresh(
        &self,
        mem: &dyn MemoryAccess,
        player: &dyn LocalPlayer,
        cameras: &CameraSet,
    ) -> Result<bool> {
        let mut batch = ReadBatch::create(mem)?;
        if !self.prepare_realtime(&mut batch, mem, player, cameras)? {
            return Ok(false);
        }
        batch.execute()?;
        Ok(true)
    }

    fn scope_state(
        &self,
        mem: &dyn MemoryAccess,
        player: &dyn LocalPlayer,
        cameras: &CameraSet,
    ) -> (bool, f32) {
        let zoom = match player.optic_zoom() {
            Some(zoom) if zoom.is_finite() && zoom > 0.0 && zoom < MAX_ZOOM => zoom,
            other => {
                trace!(target: "periscope::view", zoom = ?other, "Optic zoom unavailable");
                return (false, 1.0);
            }
        };
        if zoom <= 1.0 || !self.optic_active(mem, cameras) {
            return (false, 1.0);
        }
        (true, zoom)
    }

    fn optic_active(&self, mem: &dyn MemoryAccess, cameras: &CameraSet) -> bool {
        let Some(optic) = cameras.optic.valid() else {
            return false;
        };
        match mem.read_value::<u8>(optic.offset(self.offsets.is_added), true) {
            Ok(flag) => flag != 0,
            Err(e) => {
                debug!(
                    target: "periscope::view",
                    address = %optic,
                    error = %e,
                    "Optic active flag unreadable"
                );
                false
            }
        }
    }

    /// Project a world position to screen coordinates
    pub fn world_to_screen(&self, pos: Vec3, check: ScreenCheck) -> Option<Vec2> {
        let snapshot = self.snapshot();
        let viewport = self.viewport();
        project(&snapshot, &viewport, pos, check, self.tolerance)
    }

    /// Distance of a screen point from the viewport center
    pub fn fov_magnitude(&self, point: Vec2) -> f32 {
        point.distance(self.viewport().center())
    }

    pub fn debug_snapshot(&self, cameras: &CameraSet, ready: bool) -> CameraDebugSnapshot {
        let snapshot = self.snapshot();
        let viewport = self.viewport();
        let vm = snapshot.matrix;
        CameraDebugSnapshot {
            ready,
            is_ads: snapshot.is_ads,
            is_scoped: snapshot.is_scoped,
            fps_camera: cameras.fps,
            optic_camera: cameras.optic,
            active_camera: snapshot.active_camera,
            fov: snapshot.fov,
            aspect: snapshot.aspect,
            zoom_level: snapshot.zoom_level,
            m14: vm.m14,
            m24: vm.m24,
            m44: vm.m44,
            right: normalize_clean(vm.right).to_array(),
            up: normalize_clean(vm.up).to_array(),
            translation: vm.translation.to_array(),
            viewport_width: viewport.width,
            viewport_height: viewport.height,
        }
    }
}

/// One realtime tick: where to read and the flags resolved before reading
#[derive(Debug, Clone, Copy)]
struct RealtimeReads {
    matrix: RemoteAddress,
    fov: RemoteAddress,
    aspect: RemoteAddress,
    active: RemoteAddress,
    is_ads: bool,
    is_scoped: bool,
    zoom_level: f32,
}

/// Flags only change together with an accepted matrix from `reads.active`
fn apply_realtime(snapshot: &RwLock<ViewSnapshot>, results: &ScatterResults, reads: &RealtimeReads) {
    let matrix = results
        .read_value::<RawMatrix>(reads.matrix)
        .filter(|m| m.m11.is_finite());
    let fov = results
        .read_value::<f32>(reads.fov)
        .filter(|fov| *fov > 1.0 && *fov < 180.0);
    let aspect = results
        .read_value::<f32>(reads.aspect)
        .filter(|aspect| *aspect > 0.1 && *aspect < 5.0);

    if matrix.is_none() {
        trace!(target: "periscope::view", address = %reads.matrix, "View matrix unavailable this tick");
    }

    let mut snapshot = snapshot.write();
    if let Some(raw) = matrix {
        snapshot.matrix = ViewMatrix::from_raw(&raw);
        snapshot.is_ads = reads.is_ads;
        snapshot.is_scoped = reads.is_scoped;
        snapshot.zoom_level = reads.zoom_level;
        snapshot.active_camera = reads.active;
        snapshot.updated = Some(Instant::now());
    }
    if let Some(fov) = fov {
        snapshot.fov = fov;
    }
    if let Some(aspect) = aspect {
        snapshot.aspect = aspect;
    }
}

/// Normalize for display, dropping near-zero vectors and tiny components
fn normalize_clean(v: Vec3) -> Vec3 {
    const MIN_LEN_SQ: f32 = 1e-4;
    const EPS: f32 = 1e-3;
    if v.length_squared() < MIN_LEN_SQ {
        return Vec3::ZERO;
    }
    let n = v.normalize();
    let clean = |c: f32| if c.abs() < EPS { 0.0 } else { c };
    Vec3::new(clean(n.x), clean(n.y), clean(n.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_snapshot() -> ViewSnapshot {
        ViewSnapshot::default()
    }

    #[test]
    fn test_identity_projects_to_center() {
        let viewport = Viewport::new(1920, 1080);
        let point = project(
            &identity_snapshot(),
            &viewport,
            Vec3::new(0.0, 0.0, 10.0),
            ScreenCheck::Strict,
            0.0,
        )
        .unwrap();
        assert_eq!(point, Vec2::new(960.0, 540.0));
    }

    #[test]
    fn test_behind_camera_fails() {
        let mut snapshot = identity_snapshot();
        snapshot.matrix.m44 = 0.00005;
        let viewport = Viewport::default();
        assert_eq!(
            project(&snapshot, &viewport, Vec3::ZERO, ScreenCheck::Off, 0.0),
            None
        );
        snapshot.matrix.m44 = 0.5;
        assert!(project(&snapshot, &viewport, Vec3::ZERO, ScreenCheck::Off, 0.0).is_some());
    }

    #[test]
    fn test_screen_checks() {
        let viewport = Viewport::new(1920, 1080);
        let snapshot = identity_snapshot();
        // x = 1.5 → sx = 960 * 2.5 = 2400, off screen but within 800 px
        let pos = Vec3::new(1.5, 0.0, 0.0);
        assert_eq!(
            project(&snapshot, &viewport, pos, ScreenCheck::Off, 800.0),
            Some(Vec2::new(2400.0, 540.0))
        );
        assert_eq!(
            project(&snapshot, &viewport, pos, ScreenCheck::Strict, 800.0),
            None
        );
        assert!(project(&snapshot, &viewport, pos, ScreenCheck::Tolerant, 800.0).is_some());
        assert_eq!(
            project(
                &snapshot,
                &viewport,
                Vec3::new(3.0, 0.0, 0.0),
                ScreenCheck::Tolerant,
                800.0
            ),
            None
        );
    }

    #[test]
    fn test_scoped_correction_only_when_scoped() {
        let viewport = Viewport::new(1920, 1080);
        let mut snapshot = identity_snapshot();
        snapshot.fov = 90.0;
        snapshot.aspect = 2.0;
        let pos = Vec3::new(0.25, 0.25, 0.0);

        let plain = project(&snapshot, &viewport, pos, ScreenCheck::Off, 0.0).unwrap();
        assert_eq!(plain, Vec2::new(960.0 * 1.25, 540.0 * 0.75));

        snapshot.is_scoped = true;
        let scoped = project(&snapshot, &viewport, pos, ScreenCheck::Off, 0.0).unwrap();
        // cot(45°) = 1: x /= 1.0, y /= 0.5
        assert!((scoped.x - 960.0 * 1.25).abs() < 1e-3);
        assert!((scoped.y - 540.0 * 0.5).abs() < 1e-3);
        assert_ne!(plain, scoped);
    }

    #[test]
    fn test_normalize_clean() {
        assert_eq!(normalize_clean(Vec3::new(0.001, 0.0, 0.0)), Vec3::ZERO);
        assert_eq!(
            normalize_clean(Vec3::new(2.0, 0.0001, 0.0)),
            Vec3::new(1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_fov_magnitude() {
        let view = ViewState::new(&ViewConfig::default(), CameraOffsets::default());
        assert_eq!(view.fov_magnitude(Vec2::new(960.0, 540.0)), 0.0);
        assert_eq!(view.fov_magnitude(Vec2::new(963.0, 544.0)), 5.0);
    }

    #[test]
    fn test_small_viewport_falls_back() {
        let view = ViewState::new(
            &ViewConfig {
                viewport_width: 320,
                viewport_height: 200,
                screen_tolerance: 800.0,
            },
            CameraOffsets::default(),
        );
        assert_eq!(view.viewport(), Viewport::new(1920, 1080));
        view.set_viewport(2560, 1440);
        assert_eq!(view.viewport().center(), Vec2::new(1280.0, 720.0));
    }

    #[test]
    fn test_apply_realtime_partial_acceptance() {
        let lock = RwLock::new(ViewSnapshot {
            fov: 75.0,
            aspect: 1.5,
            ..Default::default()
        });
        let mut results = ScatterResults::new();
        let fps = RemoteAddress(0x1000);
        let reads = RealtimeReads {
            matrix: RemoteAddress(0x1100),
            fov: RemoteAddress(0x2000),
            aspect: RemoteAddress(0x3000),
            active: fps,
            is_ads: true,
            is_scoped: false,
            zoom_level: 1.0,
        };
        let mut raw = RawMatrix::IDENTITY;
        raw.m41 = 7.0;
        results.insert(reads.matrix, bytemuck::bytes_of(&raw).to_vec());
        results.insert(reads.fov, 200.0f32.to_le_bytes().to_vec());
        results.insert(reads.aspect, 1.25f32.to_le_bytes().to_vec());

        apply_realtime(&lock, &results, &reads);
        let snapshot = *lock.read();
        assert_eq!(snapshot.matrix.m14, 7.0);
        assert_eq!(snapshot.fov, 75.0);
        assert_eq!(snapshot.aspect, 1.25);
        assert!(snapshot.is_ads);
        assert_eq!(snapshot.active_camera, fps);

        // a rejected matrix keeps the flags of the matrix still published
        let mut bad = RawMatrix::IDENTITY;
        bad.m11 = f32::NAN;
        let scoped = RealtimeReads {
            matrix: RemoteAddress(0x4100),
            active: RemoteAddress(0x4000),
            is_scoped: true,
            zoom_level: 4.0,
            ..reads
        };
        let mut results = ScatterResults::new();
        results.insert(scoped.matrix, bytemuck::bytes_of(&bad).to_vec());
        apply_realtime(&lock, &results, &scoped);
        let snapshot = *lock.read();
        assert_eq!(snapshot.matrix.m14, 7.0);
        assert!(!snapshot.is_scoped);
        assert_eq!(snapshot.zoom_level, 1.0);
        assert_eq!(snapshot.active_camera, fps);
    }
}
