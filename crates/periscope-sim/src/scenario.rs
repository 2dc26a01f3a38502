//! Simulated session scenario
//!
//! Builds the standard scene, drives the realtime and write ticks on tokio
//! intervals and prints a projection report once per second.

use anyhow::{Context, Result};
use glam::Vec3;
use periscope_common::{PeriscopeConfig, ScreenCheck, SessionEvent};
use periscope_core::sim::SimScene;
use periscope_core::{Periscope, StateToggle, TogglePayload};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

const THERMAL_FEATURE: &str = "thermal";
const THERMAL_CLASS: &str = "ThermalVision";
const THERMAL_ON: u64 = 0x20;
const THERMAL_MODE: u64 = 0x24;

/// Points projected in every report
const POINTS: [(&str, Vec3); 3] = [
    ("ahead", Vec3::new(5.0, 2.0, 30.0)),
    ("right", Vec3::new(12.0, 2.0, 10.0)),
    ("behind", Vec3::new(5.0, 2.0, -40.0)),
];

#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub duration: Duration,
    pub realtime_interval: Duration,
    pub write_interval: Duration,
    /// Replaces `camera.settle_delay_ms` when set
    pub settle_delay_ms: Option<u64>,
    /// Start aiming through the optic this far into the run
    pub aim_at: Option<Duration>,
}

#[derive(Debug, Default, Serialize)]
pub struct ScenarioSummary {
    pub elapsed_ms: u64,
    pub interrupted: bool,
    pub ready: bool,
    pub realtime_ticks: u64,
    pub realtime_refreshes: u64,
    pub write_ticks: u64,
    pub writes: usize,
    pub cleanups: usize,
    pub failed_features: usize,
    pub flushes: u64,
    pub thermal_on: Option<u8>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    t_ms: u64,
    ready: bool,
    is_ads: bool,
    is_scoped: bool,
    zoom: f32,
    points: Vec<(&'a str, Option<[f32; 2]>)>,
}

pub async fn run(mut config: PeriscopeConfig, options: ScenarioOptions) -> Result<ScenarioSummary> {
    if let Some(settle) = options.settle_delay_ms {
        config.camera.settle_delay_ms = settle;
    }
    config.writes.enabled = true;
    config
        .writes
        .features
        .entry(THERMAL_FEATURE.to_string())
        .or_insert(true);

    let scene = SimScene::standard_with(config.offsets.clone());
    let listed = scene.cameras();
    let (fps, optic) = (listed[2], listed[4]);
    let game_object = scene
        .game_object(fps)
        .context("FPS camera has no game object")?;
    let thermal = scene.add_component(game_object, THERMAL_CLASS);

    let periscope = Periscope::new(
        config.clone(),
        Arc::new(scene.target.clone()),
        scene.session.clone(),
    );
    periscope.register_feature(
        StateToggle::new(
            THERMAL_FEATURE,
            THERMAL_CLASS,
            TogglePayload::new()
                .with_bool(THERMAL_ON, true)
                .with_i32(THERMAL_MODE, 1),
            TogglePayload::new()
                .with_bool(THERMAL_ON, false)
                .with_i32(THERMAL_MODE, 0),
        )
        .suppress_while_aiming(true)
        .with_offsets(config.offsets.camera.clone(), config.offsets.component.clone()),
    );

    let player = scene.start_session();
    periscope.handle_session_event(SessionEvent::SessionStarted);
    periscope.start_camera()?;
    info!(
        seconds = options.duration.as_secs(),
        settle_ms = config.camera.settle_delay_ms,
        "Scenario started"
    );

    let aim_at = options.aim_at.unwrap_or(options.duration / 2);
    let mut aiming = false;
    let mut summary = ScenarioSummary::default();

    let mut realtime = interval(options.realtime_interval);
    realtime.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut writes = interval(options.write_interval);
    writes.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);

    let started = Instant::now();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                summary.interrupted = true;
                break;
            }
            _ = realtime.tick() => {
                summary.realtime_ticks += 1;
                match periscope.realtime_tick() {
                    Ok(true) => summary.realtime_refreshes += 1,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Realtime tick failed"),
                }
            }
            _ = writes.tick() => {
                if !aiming && started.elapsed() >= aim_at {
                    info!("Player aiming through optic");
                    scene.set_camera_active(optic, true);
                    player.set_optic_zoom(Some(4.0));
                    player.set_aiming(true);
                    aiming = true;
                }
                summary.write_ticks += 1;
                match periscope.write_tick(Instant::now()) {
                    Ok(tick) => {
                        summary.writes += tick.writes;
                        summary.cleanups += tick.cleanups;
                        summary.failed_features += tick.failed.len();
                    }
                    Err(e) => warn!(error = %e, "Write tick failed"),
                }
            }
            _ = report.tick() => {
                let view = periscope.view();
                let line = Report {
                    t_ms: started.elapsed().as_millis() as u64,
                    ready: periscope.is_ready(),
                    is_ads: view.is_ads(),
                    is_scoped: view.is_scoped(),
                    zoom: view.zoom_level(),
                    points: POINTS
                        .iter()
                        .map(|(name, pos)| {
                            let screen = periscope
                                .world_to_screen(*pos, ScreenCheck::Tolerant)
                                .map(|p| [p.x, p.y]);
                            (*name, screen)
                        })
                        .collect(),
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        }
    }

    summary.ready = periscope.is_ready();
    summary.thermal_on = scene.target.peek::<u8>(thermal.offset(THERMAL_ON));
    summary.flushes = scene.target.flush_count();
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    scene.end_session();
    periscope.handle_session_event(SessionEvent::SessionStopped);
    periscope.shutdown();
    info!(
        writes = summary.writes,
        flushes = summary.flushes,
        "Scenario finished"
    );

    Ok(summary)
}
