//! Memory write features and their gating
//!
//! A feature contributes writes to the per-tick [`ScatterWriteHandle`]. The
//! [`FeatureGate`] wrapped around it decides whether it runs this tick:
//! global switch, player presence, per-feature enablement, the one owed
//! cleanup write after disabling, and the minimum run interval.

use crate::scatter::ScatterWriteHandle;
use crate::traits::{LocalPlayer, MemoryAccess};
use parking_lot::RwLock;
use periscope_common::{CameraSet, Result, SessionEvent, WritesConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Runtime write switches: one global flag plus per-feature enablement
///
/// Seeded from `[writes]` and mutable between ticks from any thread.
#[derive(Debug, Default)]
pub struct WriteSwitches {
    enabled: AtomicBool,
    features: RwLock<HashMap<String, bool>>,
}

impl WriteSwitches {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            features: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &WritesConfig) -> Self {
        let switches = Self::new(config.enabled);
        switches.features.write().extend(
            config
                .features
                .iter()
                .map(|(name, enabled)| (name.clone(), *enabled)),
        );
        switches
    }

    /// Global write subsystem switch
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Per-feature switch; unknown features are off
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features.read().get(name).copied().unwrap_or(false)
    }

    pub fn set_feature(&self, name: &str, enabled: bool) {
        self.features.write().insert(name.to_string(), enabled);
    }
}

/// What a feature sees while it runs
pub struct FeatureContext<'a> {
    pub mem: &'a dyn MemoryAccess,
    pub player: Option<Arc<dyn LocalPlayer>>,
    pub cameras: CameraSet,
}

/// A unit that contributes memory writes to a tick's batch
pub trait MemWriteFeature: Send {
    /// Name used for the enablement switch and in logs
    fn name(&self) -> &str;

    /// Whether one extra run is owed after the feature is switched off, so it
    /// can restore what it changed
    fn needs_disable_cleanup(&self) -> bool {
        false
    }

    /// Minimum time between runs; zero runs every tick
    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }

    /// Queue this tick's writes. `enabled` is false on the cleanup run.
    fn apply(
        &mut self,
        ctx: &FeatureContext<'_>,
        enabled: bool,
        batch: &mut ScatterWriteHandle,
    ) -> Result<()>;

    /// Drop session-derived state
    fn on_session_event(&mut self, _event: SessionEvent) {}
}

/// Why a gate did not run its feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    GlobalDisabled,
    NoPlayer,
    FeatureDisabled,
}

/// Result of one [`FeatureGate::apply_if_ready`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Skipped(SkipReason),
    /// Would have run, but the minimum interval has not elapsed
    Throttled,
    /// Ran while enabled
    Applied,
    /// Ran the owed cleanup after being disabled
    Cleanup,
}

impl GateOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, GateOutcome::Applied | GateOutcome::Cleanup)
    }
}

/// Enablement and throttle wrapper around one feature
pub struct FeatureGate {
    feature: Box<dyn MemWriteFeature>,
    switches: Arc<WriteSwitches>,
    last_run: Option<Instant>,
    was_enabled: bool,
    cleanup_owed: bool,
}

impl FeatureGate {
    pub fn new(feature: Box<dyn MemWriteFeature>, switches: Arc<WriteSwitches>) -> Self {
        Self {
            feature,
            switches,
            last_run: None,
            was_enabled: false,
            cleanup_owed: false,
        }
    }

    pub fn name(&self) -> &str {
        self.feature.name()
    }

    pub fn cleanup_owed(&self) -> bool {
        self.cleanup_owed
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    /// Run the feature against `batch` if everything allows it at `now`
    pub fn apply_if_ready(
        &mut self,
        ctx: &FeatureContext<'_>,
        batch: &mut ScatterWriteHandle,
        now: Instant,
    ) -> Result<GateOutcome> {
        if !self.switches.is_enabled() {
            return Ok(GateOutcome::Skipped(SkipReason::GlobalDisabled));
        }
        if ctx.player.is_none() {
            return Ok(GateOutcome::Skipped(SkipReason::NoPlayer));
        }

        let enabled = self.switches.feature_enabled(self.feature.name());
        if enabled {
            self.cleanup_owed = false;
        } else if self.was_enabled && self.feature.needs_disable_cleanup() {
            debug!(
                target: "periscope::writes",
                feature = self.feature.name(),
                "Feature disabled, cleanup owed"
            );
            self.cleanup_owed = true;
        }
        self.was_enabled = enabled;

        if !enabled && !self.cleanup_owed {
            return Ok(GateOutcome::Skipped(SkipReason::FeatureDisabled));
        }

        let interval = self.feature.min_interval();
        if !interval.is_zero() {
            if let Some(last) = self.last_run {
                if now.saturating_duration_since(last) < interval {
                    return Ok(GateOutcome::Throttled);
                }
            }
        }
        self.last_run = Some(now);

        let cleanup = !enabled;
        self.cleanup_owed = false;
        trace!(
            target: "periscope::writes",
            feature = self.feature.name(),
            cleanup,
            "Applying feature"
        );
        self.feature.apply(ctx, enabled, batch)?;

        Ok(if cleanup {
            GateOutcome::Cleanup
        } else {
            GateOutcome::Applied
        })
    }

    /// Forward a session event to the feature and forget the last run
    pub fn on_session_event(&mut self, event: SessionEvent) {
        if event.is_teardown() || event == SessionEvent::SessionStarted {
            self.last_run = None;
        }
        self.feature.on_session_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimPlayer, SimulatedTarget};
    use periscope_common::RemoteAddress;

    const FLAG: RemoteAddress = RemoteAddress(0x20_0000);

    struct Counter {
        name: &'static str,
        cleanup: bool,
        interval: Duration,
        runs: Vec<bool>,
    }

    impl Counter {
        fn new(cleanup: bool, interval: Duration) -> Self {
            Self {
                name: "counter",
                cleanup,
                interval,
                runs: Vec::new(),
            }
        }
    }

    impl MemWriteFeature for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn needs_disable_cleanup(&self) -> bool {
            self.cleanup
        }

        fn min_interval(&self) -> Duration {
            self.interval
        }

        fn apply(
            &mut self,
            _ctx: &FeatureContext<'_>,
            enabled: bool,
            batch: &mut ScatterWriteHandle,
        ) -> Result<()> {
            self.runs.push(enabled);
            batch.add_write_bool(FLAG, enabled)
        }
    }

    fn setup(feature: Counter) -> (SimulatedTarget, Arc<WriteSwitches>, FeatureGate) {
        let target = SimulatedTarget::new();
        target.map(FLAG, 0x10);
        let switches = Arc::new(WriteSwitches::new(true));
        let gate = FeatureGate::new(Box::new(feature), switches.clone());
        (target, switches, gate)
    }

    fn run(gate: &mut FeatureGate, target: &SimulatedTarget, now: Instant) -> GateOutcome {
        let ctx = FeatureContext {
            mem: target,
            player: Some(Arc::new(SimPlayer::new())),
            cameras: CameraSet::default(),
        };
        let mut batch = ScatterWriteHandle::create(target).unwrap();
        let outcome = gate.apply_if_ready(&ctx, &mut batch, now).unwrap();
        batch.execute().unwrap();
        outcome
    }

    #[test]
    fn test_switches_from_config() {
        let mut config = WritesConfig::default();
        config.enabled = true;
        config.features.insert("thermal".into(), true);
        let switches = WriteSwitches::from_config(&config);
        assert!(switches.is_enabled());
        assert!(switches.feature_enabled("thermal"));
        assert!(!switches.feature_enabled("unknown"));
    }

    #[test]
    fn test_global_switch_blocks_everything() {
        let (target, switches, mut gate) = setup(Counter::new(false, Duration::ZERO));
        switches.set_feature("counter", true);
        switches.set_enabled(false);
        assert_eq!(
            run(&mut gate, &target, Instant::now()),
            GateOutcome::Skipped(SkipReason::GlobalDisabled)
        );
    }

    #[test]
    fn test_missing_player_skips() {
        let (target, switches, mut gate) = setup(Counter::new(false, Duration::ZERO));
        switches.set_feature("counter", true);
        let ctx = FeatureContext {
            mem: &target,
            player: None,
            cameras: CameraSet::default(),
        };
        let mut batch = ScatterWriteHandle::create(&target).unwrap();
        assert_eq!(
            gate.apply_if_ready(&ctx, &mut batch, Instant::now()).unwrap(),
            GateOutcome::Skipped(SkipReason::NoPlayer)
        );
        assert_eq!(batch.pending_writes(), 0);
    }

    #[test]
    fn test_disable_cleanup_runs_exactly_once() {
        let (target, switches, mut gate) = setup(Counter::new(true, Duration::ZERO));
        let now = Instant::now();
        switches.set_feature("counter", true);
        assert_eq!(run(&mut gate, &target, now), GateOutcome::Applied);
        assert_eq!(run(&mut gate, &target, now), GateOutcome::Applied);

        switches.set_feature("counter", false);
        assert_eq!(run(&mut gate, &target, now), GateOutcome::Cleanup);
        assert!(!gate.cleanup_owed());
        for _ in 0..5 {
            assert_eq!(
                run(&mut gate, &target, now),
                GateOutcome::Skipped(SkipReason::FeatureDisabled)
            );
        }
        assert_eq!(target.peek::<u8>(FLAG), Some(0));

        switches.set_feature("counter", true);
        assert_eq!(run(&mut gate, &target, now), GateOutcome::Applied);
        assert_eq!(target.peek::<u8>(FLAG), Some(1));
    }

    #[test]
    fn test_no_cleanup_without_opt_in() {
        let (target, switches, mut gate) = setup(Counter::new(false, Duration::ZERO));
        let now = Instant::now();
        switches.set_feature("counter", true);
        run(&mut gate, &target, now);
        switches.set_feature("counter", false);
        assert_eq!(
            run(&mut gate, &target, now),
            GateOutcome::Skipped(SkipReason::FeatureDisabled)
        );
    }

    #[test]
    fn test_never_enabled_owes_no_cleanup() {
        let (target, _switches, mut gate) = setup(Counter::new(true, Duration::ZERO));
        assert_eq!(
            run(&mut gate, &target, Instant::now()),
            GateOutcome::Skipped(SkipReason::FeatureDisabled)
        );
        assert!(target.write_log().is_empty());
    }

    #[test]
    fn test_min_interval_throttles() {
        let interval = Duration::from_millis(100);
        let (target, switches, mut gate) = setup(Counter::new(false, interval));
        switches.set_feature("counter", true);
        let t0 = Instant::now();

        let offsets = [0u64, 40, 99, 100, 150, 199, 200, 350];
        let outcomes: Vec<_> = offsets
            .iter()
            .map(|ms| run(&mut gate, &target, t0 + Duration::from_millis(*ms)))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                GateOutcome::Applied,
                GateOutcome::Throttled,
                GateOutcome::Throttled,
                GateOutcome::Applied,
                GateOutcome::Throttled,
                GateOutcome::Throttled,
                GateOutcome::Applied,
                GateOutcome::Applied,
            ]
        );
        assert_eq!(gate.last_run(), Some(t0 + Duration::from_millis(350)));
    }

    #[test]
    fn test_zero_interval_runs_every_tick() {
        let (target, switches, mut gate) = setup(Counter::new(false, Duration::ZERO));
        switches.set_feature("counter", true);
        let now = Instant::now();
        for _ in 0..4 {
            assert_eq!(run(&mut gate, &target, now), GateOutcome::Applied);
        }
        assert_eq!(gate.last_run(), Some(now));
    }

    #[test]
    fn test_throttled_cleanup_stays_owed() {
        let interval = Duration::from_millis(100);
        let (target, switches, mut gate) = setup(Counter::new(true, interval));
        let t0 = Instant::now();
        switches.set_feature("counter", true);
        assert_eq!(run(&mut gate, &target, t0), GateOutcome::Applied);

        switches.set_feature("counter", false);
        assert_eq!(
            run(&mut gate, &target, t0 + Duration::from_millis(10)),
            GateOutcome::Throttled
        );
        assert!(gate.cleanup_owed());
        assert_eq!(
            run(&mut gate, &target, t0 + Duration::from_millis(120)),
            GateOutcome::Cleanup
        );
        assert_eq!(
            run(&mut gate, &target, t0 + Duration::from_millis(300)),
            GateOutcome::Skipped(SkipReason::FeatureDisabled)
        );
    }

    #[test]
    fn test_session_event_resets_throttle() {
        let interval = Duration::from_secs(60);
        let (target, switches, mut gate) = setup(Counter::new(false, interval));
        switches.set_feature("counter", true);
        let t0 = Instant::now();
        assert_eq!(run(&mut gate, &target, t0), GateOutcome::Applied);
        gate.on_session_event(SessionEvent::SessionStopped);
        assert_eq!(gate.last_run(), None);
        assert_eq!(
            run(&mut gate, &target, t0 + Duration::from_millis(1)),
            GateOutcome::Applied
        );
    }
}
