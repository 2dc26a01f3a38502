//! Write multiplexer
//!
//! Once per write tick every registered feature gate runs against a single
//! shared [`ScatterWriteHandle`], which is then flushed in one transport call.

use crate::feature::{FeatureContext, FeatureGate, GateOutcome, MemWriteFeature, WriteSwitches};
use crate::scatter::ScatterWriteHandle;
use crate::session::SessionListener;
use crate::traits::{GameSession, MemoryAccess};
use parking_lot::{Mutex, RwLock};
use periscope_common::{CameraSet, Result, SessionEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// Why a whole tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSkip {
    Disabled,
    NoSession,
    NoPlayer,
}

/// Summary of one multiplexer tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub skipped: Option<TickSkip>,
    pub applied: usize,
    pub cleanups: usize,
    pub throttled: usize,
    /// Gates that declined to run (feature off, no player)
    pub idle: usize,
    /// Features that returned an error or panicked
    pub failed: Vec<String>,
    /// Writes flushed by this tick
    pub writes: usize,
}

impl TickReport {
    fn skipped(reason: TickSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// Registry of write features driven once per tick
pub struct WriteMultiplexer {
    gates: RwLock<Vec<Arc<Mutex<FeatureGate>>>>,
    switches: Arc<WriteSwitches>,
    ticks: AtomicU64,
}

impl WriteMultiplexer {
    pub fn new(switches: Arc<WriteSwitches>) -> Self {
        Self {
            gates: RwLock::new(Vec::new()),
            switches,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn switches(&self) -> &Arc<WriteSwitches> {
        &self.switches
    }

    /// Register a feature; it takes part from the next tick on
    pub fn register(&self, feature: impl MemWriteFeature + 'static) -> Arc<Mutex<FeatureGate>> {
        self.register_boxed(Box::new(feature))
    }

    pub fn register_boxed(&self, feature: Box<dyn MemWriteFeature>) -> Arc<Mutex<FeatureGate>> {
        let gate = Arc::new(Mutex::new(FeatureGate::new(feature, self.switches.clone())));
        let mut gates = self.gates.write();
        debug!(
            target: "periscope::writes",
            feature = gate.lock().name(),
            registered = gates.len() + 1,
            "Registered write feature"
        );
        gates.push(gate.clone());
        gate
    }

    /// Remove every feature named `name`; returns whether any was removed
    pub fn unregister(&self, name: &str) -> bool {
        let mut gates = self.gates.write();
        let before = gates.len();
        gates.retain(|gate| gate.lock().name() != name);
        before != gates.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.gates
            .read()
            .iter()
            .map(|gate| gate.lock().name().to_string())
            .collect()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Run one write tick
    ///
    /// Feature errors and panics are logged and counted in the report; only
    /// handle creation and the final flush fail the tick.
    pub fn tick(
        &self,
        mem: &dyn MemoryAccess,
        session: &dyn GameSession,
        cameras: CameraSet,
        now: Instant,
    ) -> Result<TickReport> {
        if !self.switches.is_enabled() {
            return Ok(TickReport::skipped(TickSkip::Disabled));
        }
        if !session.in_session() {
            return Ok(TickReport::skipped(TickSkip::NoSession));
        }
        let Some(player) = session.local_player() else {
            return Ok(TickReport::skipped(TickSkip::NoPlayer));
        };

        let gates = self.gates.read().clone();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = TickReport::default();
        if gates.is_empty() {
            return Ok(report);
        }

        let ctx = FeatureContext {
            mem,
            player: Some(player),
            cameras,
        };
        let mut batch = ScatterWriteHandle::create(mem)?;

        for gate in &gates {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut gate = gate.lock();
                let name = gate.name().to_string();
                (name, gate.apply_if_ready(&ctx, &mut batch, now))
            }));
            match outcome {
                Ok((_, Ok(GateOutcome::Applied))) => report.applied += 1,
                Ok((_, Ok(GateOutcome::Cleanup))) => report.cleanups += 1,
                Ok((_, Ok(GateOutcome::Throttled))) => report.throttled += 1,
                Ok((_, Ok(GateOutcome::Skipped(_)))) => report.idle += 1,
                Ok((name, Err(e))) => {
                    warn!(
                        target: "periscope::writes",
                        feature = %name,
                        error = %e,
                        "Write feature failed"
                    );
                    report.failed.push(name);
                }
                Err(_) => {
                    let name = gate.lock().name().to_string();
                    error!(
                        target: "periscope::writes",
                        feature = %name,
                        "Write feature panicked"
                    );
                    report.failed.push(name);
                }
            }
        }

        report.writes = batch.pending_writes();
        batch.execute()?;
        trace!(
            target: "periscope::writes",
            tick,
            writes = report.writes,
            applied = report.applied,
            cleanups = report.cleanups,
            "Write tick complete"
        );
        Ok(report)
    }
}

impl SessionListener for WriteMultiplexer {
    fn listener_name(&self) -> &str {
        "writes"
    }

    fn on_session_event(&self, event: SessionEvent) {
        for gate in self.gates.read().iter() {
            gate.lock().on_session_event(event);
        }
    }
}
