//! Camera acquisition state machine
//!
//! Locates the first-person and optic cameras in the target's global camera
//! list once a session has settled, validates the FPS camera's view matrix and
//! then idles until the session ends. The machine is advanced by [`step`],
//! which returns how long to sleep before the next step; the worker thread
//! started by [`CameraAcquisition::start`] just loops over it.
//!
//! [`step`]: CameraAcquisition::step

use super::validate::validate_view_matrix;
use super::view::ViewState;
use crate::remote::{read_list_header, read_pointer_array};
use crate::session::SessionListener;
use crate::traits::{GameSession, MemoryAccess, MemoryAccessExt};
use parking_lot::{Mutex, RwLock};
use periscope_common::{
    CameraConfig, CameraOffsets, CameraRole, CameraSet, Error, RawMatrix, RemoteAddress, Result,
    SessionEvent,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Longest single sleep of the worker, bounding shutdown latency
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Acquisition progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    WaitingSession,
    /// Session active since `since`; no search before the settle delay
    Settling { since: Instant },
    /// `attempt` searches done so far
    Searching { attempt: u32 },
    Validating { attempt: u32 },
    Ready { last_valid: Instant },
}

impl AcquisitionState {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::WaitingSession => "waiting_session",
            AcquisitionState::Settling { .. } => "settling",
            AcquisitionState::Searching { .. } => "searching",
            AcquisitionState::Validating { .. } => "validating",
            AcquisitionState::Ready { .. } => "ready",
        }
    }
}

/// Outcome of one search attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchOutcome {
    pub fps: Option<RemoteAddress>,
    pub optic: Option<RemoteAddress>,
    pub scanned: usize,
}

/// Camera acquisition machine and its worker
pub struct CameraAcquisition {
    mem: Arc<dyn MemoryAccess>,
    session: Arc<dyn GameSession>,
    view: Arc<ViewState>,
    config: CameraConfig,
    offsets: CameraOffsets,
    state: Mutex<AcquisitionState>,
    cameras: RwLock<CameraSet>,
    last_search_log: Mutex<Option<Instant>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CameraAcquisition {
    pub fn new(
        mem: Arc<dyn MemoryAccess>,
        session: Arc<dyn GameSession>,
        view: Arc<ViewState>,
        config: CameraConfig,
        offsets: CameraOffsets,
    ) -> Self {
        Self {
            mem,
            session,
            view,
            config,
            offsets,
            state: Mutex::new(AcquisitionState::Idle),
            cameras: RwLock::new(CameraSet::default()),
            last_search_log: Mutex::new(None),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AcquisitionState {
        *self.state.lock()
    }

    /// Resolved camera addresses
    pub fn cameras(&self) -> CameraSet {
        *self.cameras.read()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), AcquisitionState::Ready { .. })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }

    fn session_active(&self) -> bool {
        self.session.in_session() && self.session.local_player().is_some()
    }

    /// Drop camera addresses and the published matrix
    fn reset_cameras(&self) {
        let mut cameras = self.cameras.write();
        if *cameras != CameraSet::default() {
            info!(target: "periscope::camera", "Session ended, clearing cameras");
            cameras.clear();
            self.view.reset();
        }
    }

    fn enter_waiting(&self, state: &mut AcquisitionState) {
        self.reset_cameras();
        if *state != AcquisitionState::WaitingSession {
            debug!(
                target: "periscope::camera",
                from = state.name(),
                "Waiting for session"
            );
        }
        *state = AcquisitionState::WaitingSession;
    }

    /// Advance the machine once at `now`; returns the delay before the next step
    pub fn step(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();
        let active = self.session_active();

        match *state {
            AcquisitionState::Idle => {
                self.enter_waiting(&mut state);
                Duration::ZERO
            }
            AcquisitionState::WaitingSession => {
                if active {
                    debug!(
                        target: "periscope::camera",
                        delay_ms = self.config.settle_delay_ms,
                        "Session active, settling"
                    );
                    *state = AcquisitionState::Settling { since: now };
                    Duration::ZERO
                } else {
                    self.config.session_poll()
                }
            }
            _ if !active => {
                self.enter_waiting(&mut state);
                self.config.session_poll()
            }
            AcquisitionState::Settling { since } => {
                let elapsed = now.saturating_duration_since(since);
                let delay = self.config.settle_delay();
                if elapsed >= delay {
                    *state = AcquisitionState::Searching { attempt: 0 };
                    Duration::ZERO
                } else {
                    self.config.settle_poll().min(delay - elapsed)
                }
            }
            AcquisitionState::Searching { attempt } => {
                let attempt = attempt.saturating_add(1);
                match self.search(now, attempt) {
                    Ok(SearchOutcome {
                        fps: Some(_),
                        optic: Some(_),
                        ..
                    }) => {
                        *state = AcquisitionState::Validating { attempt };
                        Duration::ZERO
                    }
                    Ok(_) => {
                        *state = AcquisitionState::Searching { attempt };
                        self.config.search_backoff(attempt)
                    }
                    Err(e) => {
                        debug!(
                            target: "periscope::camera",
                            attempt,
                            error = %e,
                            "Camera search failed"
                        );
                        *state = AcquisitionState::Searching { attempt };
                        self.config.search_backoff(attempt)
                    }
                }
            }
            AcquisitionState::Validating { attempt } => match self.validate_fps() {
                Ok(raw) => {
                    self.view.publish_matrix(&raw);
                    let cameras = {
                        let mut cameras = self.cameras.write();
                        cameras.initialized = true;
                        *cameras
                    };
                    info!(
                        target: "periscope::camera",
                        fps = %cameras.fps,
                        optic = %cameras.optic,
                        attempts = attempt,
                        "Cameras ready"
                    );
                    *state = AcquisitionState::Ready { last_valid: now };
                    Duration::ZERO
                }
                Err(e) => {
                    debug!(
                        target: "periscope::camera",
                        attempt,
                        error = %e,
                        "FPS view matrix rejected, searching again"
                    );
                    self.cameras.write().clear();
                    *state = AcquisitionState::Searching { attempt };
                    self.config.search_backoff(attempt)
                }
            },
            AcquisitionState::Ready { .. } => self.config.ready_poll(),
        }
    }

    /// Scan the global camera list for both roles
    fn search(&self, now: Instant, attempt: u32) -> Result<SearchOutcome> {
        let engine = self.session.engine_base();
        let list = self
            .mem
            .read_valid_ptr(engine.offset(self.offsets.all_cameras), false)?;
        let header = read_list_header(
            self.mem.as_ref(),
            list,
            self.offsets.list_items,
            self.offsets.list_count,
        )?;
        if header.is_empty() || header.count > self.config.max_list_count as usize {
            return Err(Error::memory(
                list.get(),
                format!(
                    "camera list count {} outside (0, {}]",
                    header.count, self.config.max_list_count
                ),
            ));
        }

        let scan = header.count.min(self.config.max_scan_entries as usize);
        let entries = read_pointer_array(
            self.mem.as_ref(),
            header.items,
            scan,
            self.offsets.list_stride,
        )?;

        let mut outcome = SearchOutcome::default();
        for (index, camera) in entries.into_iter().enumerate() {
            outcome.scanned = index + 1;
            if !camera.is_valid() {
                continue;
            }
            let name = match self.camera_name(camera) {
                Ok(name) => name,
                Err(e) => {
                    trace!(target: "periscope::camera", index, error = %e, "Unreadable camera entry");
                    continue;
                }
            };
            if name.chars().count() < self.config.min_name_len {
                continue;
            }
            // first entry per role wins; later duplicates are ignored
            match CameraRole::classify(&name) {
                Some(CameraRole::FirstPerson) if outcome.fps.is_none() => {
                    debug!(target: "periscope::camera", address = %camera, name = %name, "Found FPS camera");
                    outcome.fps = Some(camera);
                }
                Some(CameraRole::Optic) if outcome.optic.is_none() => {
                    debug!(target: "periscope::camera", address = %camera, name = %name, "Found optic camera");
                    outcome.optic = Some(camera);
                }
                _ => {}
            }
            if outcome.fps.is_some() && outcome.optic.is_some() {
                break;
            }
        }

        {
            let mut cameras = self.cameras.write();
            cameras.fps = outcome.fps.unwrap_or(RemoteAddress::NULL);
            cameras.optic = outcome.optic.unwrap_or(RemoteAddress::NULL);
            cameras.initialized = false;
        }

        self.log_search(now, attempt, header.count, &outcome);
        Ok(outcome)
    }

    fn camera_name(&self, camera: RemoteAddress) -> Result<String> {
        let game_object = self
            .mem
            .read_valid_ptr(camera.offset(self.offsets.component_game_object), false)?;
        let name_ptr = self
            .mem
            .read_valid_ptr(game_object.offset(self.offsets.game_object_name), false)?;
        self.mem
            .read_utf8(name_ptr, self.config.max_name_len, false)
    }

    fn validate_fps(&self) -> Result<RawMatrix> {
        let fps = self
            .cameras()
            .fps
            .valid()
            .ok_or_else(|| Error::InvalidState("no FPS camera to validate".into()))?;
        let addr = fps.offset(self.offsets.view_matrix);
        let raw: RawMatrix = self.mem.read_value(addr, false)?;
        validate_view_matrix(&raw, self.session.in_session(), self.config.world_bound)
            .map_err(|rejection| Error::memory(addr.get(), rejection.to_string()))?;
        Ok(raw)
    }

    fn log_search(&self, now: Instant, attempt: u32, count: usize, outcome: &SearchOutcome) {
        let mut last = self.last_search_log.lock();
        let due = last.map_or(true, |at| {
            now.saturating_duration_since(at) >= self.config.log_interval()
        });
        if !due {
            return;
        }
        *last = Some(now);
        info!(
            target: "periscope::camera",
            attempt,
            count,
            scanned = outcome.scanned,
            fps = outcome.fps.is_some(),
            optic = outcome.optic.is_some(),
            "Camera search"
        );
    }

    /// Start the background worker; no-op if it is already running
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("periscope-camera".into())
            .spawn(move || this.run())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                Error::Internal(format!("Failed to spawn camera worker: {}", e))
            })?;
        *self.worker.lock() = Some(handle);
        info!(target: "periscope::camera", "Camera worker started");
        Ok(())
    }

    fn run(&self) {
        while self.running.load(Ordering::SeqCst) {
            let delay = match catch_unwind(AssertUnwindSafe(|| self.step(Instant::now()))) {
                Ok(delay) => delay,
                Err(_) => {
                    error!(target: "periscope::camera", "Camera step panicked, backing off");
                    self.config.error_backoff()
                }
            };
            self.sleep_while_running(delay);
        }
        debug!(target: "periscope::camera", "Camera worker exiting");
    }

    fn sleep_while_running(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(target: "periscope::camera", "Camera worker terminated abnormally");
            }
        }
        info!(target: "periscope::camera", "Camera worker stopped");
    }
}

impl SessionListener for CameraAcquisition {
    fn listener_name(&self) -> &str {
        "camera"
    }

    fn on_session_event(&self, event: SessionEvent) {
        if event.is_teardown() {
            let mut state = self.state.lock();
            self.enter_waiting(&mut state);
        }
    }
}
