//! View state integration tests
//!
//! Realtime ticks against the simulated scene and projection of world points.

use glam::{Vec2, Vec3};
use periscope_common::{CameraSet, RawMatrix, RemoteAddress, ScreenCheck, ViewConfig};
use periscope_core::sim::{look_forward_matrix, SimScene};
use periscope_core::ViewState;

const FOV: f32 = 75.0;
const ASPECT: f32 = 16.0 / 9.0;

struct Fixture {
    scene: SimScene,
    view: ViewState,
    cameras: CameraSet,
}

fn fixture() -> Fixture {
    let scene = SimScene::standard();
    // standard scene order: Main Camera, UI, FPS, Weapon Camera, optic
    let listed = scene.cameras();
    let mut cameras = CameraSet::new(listed[2], listed[4]);
    cameras.initialized = true;

    let view = ViewState::new(&ViewConfig::default(), scene.offsets.camera.clone());
    Fixture {
        scene,
        view,
        cameras,
    }
}

#[test]
fn test_realtime_tick_reads_matrix_and_lens() {
    let f = fixture();
    let player = f.scene.start_session();

    assert!(f
        .view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh"));
    let snapshot = f.view.snapshot();
    assert_eq!(snapshot.fov, FOV);
    assert_eq!(snapshot.aspect, ASPECT);
    assert_eq!(snapshot.active_camera, f.cameras.fps);
    assert!(!snapshot.is_ads);
    assert_eq!(snapshot.zoom_level, 1.0);
    assert!(snapshot.updated.is_some());

    // camera sits at (5, 2, -20) looking down +Z
    let center = f
        .view
        .world_to_screen(Vec3::new(5.0, 2.0, 30.0), ScreenCheck::Strict)
        .expect("visible");
    assert!((center - Vec2::new(960.0, 540.0)).length() < 1e-3);

    // behind the camera
    assert_eq!(
        f.view
            .world_to_screen(Vec3::new(5.0, 2.0, -25.0), ScreenCheck::Off),
        None
    );

    // right of the camera lands right of center, above lands above
    let right = f
        .view
        .world_to_screen(Vec3::new(8.0, 2.0, 0.0), ScreenCheck::Off)
        .expect("visible");
    assert!(right.x > 960.0);
    let above = f
        .view
        .world_to_screen(Vec3::new(5.0, 4.0, 0.0), ScreenCheck::Off)
        .expect("visible");
    assert!(above.y < 540.0);
}

#[test]
fn test_scoped_uses_optic_camera_and_correction() {
    let f = fixture();
    let player = f.scene.start_session();
    let optic_matrix = look_forward_matrix(Vec3::new(5.0, 2.0, -20.0), 15.0, ASPECT);
    f.scene.set_matrix(f.cameras.optic, &optic_matrix);
    f.scene.set_camera_active(f.cameras.optic, true);

    let point = Vec3::new(5.5, 2.0, 10.0);
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    let unscoped = f
        .view
        .world_to_screen(point, ScreenCheck::Off)
        .expect("visible");

    player.set_aiming(true);
    player.set_optic_zoom(Some(4.0));
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    assert!(f.view.is_ads());
    assert!(f.view.is_scoped());
    assert_eq!(f.view.zoom_level(), 4.0);
    assert_eq!(f.view.snapshot().active_camera, f.cameras.optic);

    let scoped = f
        .view
        .world_to_screen(point, ScreenCheck::Off)
        .expect("visible");
    assert!(scoped.x > unscoped.x);
}

#[test]
fn test_scope_requires_active_optic_and_sane_zoom() {
    let f = fixture();
    let player = f.scene.start_session();
    player.set_aiming(true);

    // optic not added
    player.set_optic_zoom(Some(4.0));
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    assert!(f.view.is_ads());
    assert!(!f.view.is_scoped());
    assert_eq!(f.view.snapshot().active_camera, f.cameras.fps);

    f.scene.set_camera_active(f.cameras.optic, true);
    for zoom in [Some(1.0), Some(0.0), Some(150.0), Some(f32::NAN), None] {
        player.set_optic_zoom(zoom);
        f.view
            .refresh(&f.scene.target, player.as_ref(), &f.cameras)
            .expect("refresh");
        assert!(!f.view.is_scoped(), "zoom {:?} must not scope", zoom);
        assert_eq!(f.view.zoom_level(), 1.0);
    }
}

#[test]
fn test_bad_reads_keep_previous_values() {
    let f = fixture();
    let player = f.scene.start_session();
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    let before = f.view.snapshot();

    let mut broken = RawMatrix::IDENTITY;
    broken.m11 = f32::INFINITY;
    f.scene.set_matrix(f.cameras.fps, &broken);
    f.scene.set_lens(f.cameras.fps, 0.5, 9.0);
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");

    let after = f.view.snapshot();
    assert_eq!(after.matrix, before.matrix);
    assert_eq!(after.fov, FOV);
    assert_eq!(after.aspect, ASPECT);
}

#[test]
fn test_failed_batch_keeps_flags_with_matrix() {
    let f = fixture();
    let player = f.scene.start_session();
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    let before = f.view.snapshot();

    player.set_aiming(true);
    player.set_optic_zoom(Some(4.0));
    f.scene.set_camera_active(f.cameras.optic, true);
    f.scene.target.fail_next_flush();
    assert!(f
        .view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .is_err());

    let after = f.view.snapshot();
    assert!(!after.is_scoped);
    assert!(!after.is_ads);
    assert_eq!(after.zoom_level, 1.0);
    assert_eq!(after.active_camera, f.cameras.fps);
    assert_eq!(after.matrix, before.matrix);
    assert_eq!(after.updated, before.updated);

    // the next good tick publishes flags and optic matrix together
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    assert!(f.view.is_scoped());
    assert_eq!(f.view.snapshot().active_camera, f.cameras.optic);
}

#[test]
fn test_unresolved_fps_skips_tick_while_scoped() {
    let f = fixture();
    let player = f.scene.start_session();
    player.set_aiming(true);
    player.set_optic_zoom(Some(4.0));
    f.scene.set_camera_active(f.cameras.optic, true);

    let mut optic_only = f.cameras;
    optic_only.fps = RemoteAddress::NULL;
    let flushes = f.scene.target.flush_count();
    assert!(!f
        .view
        .refresh(&f.scene.target, player.as_ref(), &optic_only)
        .expect("refresh"));
    assert_eq!(f.scene.target.flush_count(), flushes);
    assert!(!f.view.is_scoped());
    assert!(f.view.snapshot().updated.is_none());
}

#[test]
fn test_no_cameras_skips_tick() {
    let f = fixture();
    let player = f.scene.start_session();
    let flushes = f.scene.target.flush_count();
    assert!(!f
        .view
        .refresh(&f.scene.target, player.as_ref(), &CameraSet::default())
        .expect("refresh"));
    assert_eq!(f.scene.target.flush_count(), flushes);
}

#[test]
fn test_debug_snapshot_serializes() {
    let f = fixture();
    let player = f.scene.start_session();
    f.view
        .refresh(&f.scene.target, player.as_ref(), &f.cameras)
        .expect("refresh");
    let snapshot = f.view.debug_snapshot(&f.cameras, true);
    assert!(snapshot.ready);
    assert_eq!(snapshot.fps_camera, f.cameras.fps);
    assert_eq!(snapshot.right, [1.0, 0.0, 0.0]);
    assert_eq!(snapshot.viewport_width, 1920.0);

    let json = serde_json::to_value(&snapshot).expect("serialize");
    assert_eq!(json["fov"], serde_json::json!(FOV));
    assert_eq!(json["ready"], serde_json::json!(true));
}
