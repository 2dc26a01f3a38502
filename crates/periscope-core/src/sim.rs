//! Simulated target process
//!
//! In-memory implementations of the transport and game-side traits. Used by
//! the test suites and by `periscope-sim` to run the core without a device.

use crate::scatter::ScatterResults;
use crate::traits::{GameSession, LocalPlayer, MemoryAccess, ScatterRequest};
use bytemuck::Pod;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use periscope_common::{Error, OffsetsConfig, RawMatrix, RemoteAddress, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// First address handed out by [`SimulatedTarget::alloc`]
const HEAP_BASE: u64 = 0x1000_0000;
const PAGE: u64 = 0x1000;

#[derive(Default)]
struct SimMemory {
    regions: BTreeMap<u64, Vec<u8>>,
    next_alloc: u64,
    write_log: Vec<(RemoteAddress, Vec<u8>)>,
    fail_next_flush: bool,
}

impl SimMemory {
    fn region_mut(&mut self, addr: u64, len: usize) -> Option<&mut [u8]> {
        let (start, bytes) = self.regions.range_mut(..=addr).next_back()?;
        let offset = (addr - *start) as usize;
        let end = offset.checked_add(len)?;
        bytes.get_mut(offset..end)
    }

    fn region(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let (start, bytes) = self.regions.range(..=addr).next_back()?;
        let offset = (addr - *start) as usize;
        let end = offset.checked_add(len)?;
        bytes.get(offset..end)
    }

    fn store(&mut self, addr: RemoteAddress, data: &[u8]) -> Result<()> {
        let slot = self
            .region_mut(addr.get(), data.len())
            .ok_or_else(|| Error::memory(addr.get(), "write to unmapped memory"))?;
        slot.copy_from_slice(data);
        self.write_log.push((addr, data.to_vec()));
        Ok(())
    }
}

/// Sparse in-memory address space
///
/// Cloning yields another handle onto the same memory.
#[derive(Clone, Default)]
pub struct SimulatedTarget {
    memory: Arc<Mutex<SimMemory>>,
    flushes: Arc<AtomicU64>,
}

impl SimulatedTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `size` zeroed bytes at `addr`
    pub fn map(&self, addr: RemoteAddress, size: usize) {
        self.memory.lock().regions.insert(addr.get(), vec![0; size]);
    }

    /// Map fresh zeroed pages covering `size` bytes and return their base
    pub fn alloc(&self, size: usize) -> RemoteAddress {
        let mut memory = self.memory.lock();
        if memory.next_alloc == 0 {
            memory.next_alloc = HEAP_BASE;
        }
        let base = memory.next_alloc;
        let pages = (size as u64).div_ceil(PAGE).max(1);
        memory.next_alloc = base + pages * PAGE;
        memory.regions.insert(base, vec![0; (pages * PAGE) as usize]);
        RemoteAddress(base)
    }

    /// Write a value without going through the transport or the write log
    pub fn poke<T: Pod>(&self, addr: RemoteAddress, value: &T) {
        self.poke_bytes(addr, bytemuck::bytes_of(value));
    }

    pub fn poke_bytes(&self, addr: RemoteAddress, data: &[u8]) {
        let mut memory = self.memory.lock();
        if let Some(slot) = memory.region_mut(addr.get(), data.len()) {
            slot.copy_from_slice(data);
        }
    }

    /// Read a value without going through the transport
    pub fn peek<T: Pod>(&self, addr: RemoteAddress) -> Option<T> {
        let memory = self.memory.lock();
        memory
            .region(addr.get(), std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    /// Every write that reached memory, in order
    pub fn write_log(&self) -> Vec<(RemoteAddress, Vec<u8>)> {
        self.memory.lock().write_log.clone()
    }

    pub fn clear_write_log(&self) {
        self.memory.lock().write_log.clear();
    }

    /// Number of scatter executions
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Make the next scatter execution fail with a transport error
    pub fn fail_next_flush(&self) {
        self.memory.lock().fail_next_flush = true;
    }
}

impl MemoryAccess for SimulatedTarget {
    fn read(&self, addr: RemoteAddress, len: usize, _use_cache: bool) -> Result<Vec<u8>> {
        let memory = self.memory.lock();
        memory
            .region(addr.get(), len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::memory(addr.get(), format!("unmapped read of {} bytes", len)))
    }

    fn write(&self, addr: RemoteAddress, data: &[u8]) -> Result<()> {
        self.memory.lock().store(addr, data)
    }

    fn create_scatter(&self) -> Result<Box<dyn ScatterRequest>> {
        Ok(Box::new(SimScatter {
            target: self.clone(),
            reads: Vec::new(),
            writes: Vec::new(),
        }))
    }
}

/// Scatter request against a [`SimulatedTarget`]
pub struct SimScatter {
    target: SimulatedTarget,
    reads: Vec<(RemoteAddress, usize)>,
    writes: Vec<(RemoteAddress, Vec<u8>)>,
}

impl ScatterRequest for SimScatter {
    fn prepare_read(&mut self, addr: RemoteAddress, len: usize) -> Result<()> {
        self.reads.push((addr, len));
        Ok(())
    }

    fn prepare_write(&mut self, addr: RemoteAddress, data: &[u8]) -> Result<()> {
        self.writes.push((addr, data.to_vec()));
        Ok(())
    }

    fn execute(&mut self) -> Result<ScatterResults> {
        self.target.flushes.fetch_add(1, Ordering::SeqCst);
        let mut memory = self.target.memory.lock();
        if std::mem::take(&mut memory.fail_next_flush) {
            return Err(Error::Transport("simulated flush failure".into()));
        }

        let mut results = ScatterResults::new();
        for (addr, len) in self.reads.drain(..) {
            if let Some(bytes) = memory.region(addr.get(), len) {
                results.insert(addr, bytes.to_vec());
            }
        }
        for (addr, data) in self.writes.drain(..) {
            if let Err(e) = memory.store(addr, &data) {
                trace!(address = %addr, error = %e, "Simulated scatter write dropped");
            }
        }
        Ok(results)
    }
}

// =============================================================================
// Game-side collaborators
// =============================================================================

/// Local player with externally controlled aim and zoom
#[derive(Default)]
pub struct SimPlayer {
    aiming: AtomicBool,
    zoom: Mutex<Option<f32>>,
}

impl SimPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_aiming(&self, aiming: bool) {
        self.aiming.store(aiming, Ordering::SeqCst);
    }

    pub fn set_optic_zoom(&self, zoom: Option<f32>) {
        *self.zoom.lock() = zoom;
    }
}

impl LocalPlayer for SimPlayer {
    fn is_aiming(&self) -> bool {
        self.aiming.load(Ordering::SeqCst)
    }

    fn optic_zoom(&self) -> Option<f32> {
        *self.zoom.lock()
    }
}

/// Game session whose activity and player are set by the caller
pub struct SimulatedSession {
    in_session: AtomicBool,
    player: RwLock<Option<Arc<SimPlayer>>>,
    engine_base: RemoteAddress,
}

impl SimulatedSession {
    pub fn new(engine_base: RemoteAddress) -> Self {
        Self {
            in_session: AtomicBool::new(false),
            player: RwLock::new(None),
            engine_base,
        }
    }

    pub fn set_in_session(&self, active: bool) {
        self.in_session.store(active, Ordering::SeqCst);
    }

    /// Spawn (or return) the local player
    pub fn spawn_player(&self) -> Arc<SimPlayer> {
        let mut player = self.player.write();
        player.get_or_insert_with(|| Arc::new(SimPlayer::new())).clone()
    }

    pub fn despawn_player(&self) {
        *self.player.write() = None;
    }

    pub fn player(&self) -> Option<Arc<SimPlayer>> {
        self.player.read().clone()
    }
}

impl GameSession for SimulatedSession {
    fn in_session(&self) -> bool {
        self.in_session.load(Ordering::SeqCst)
    }

    fn local_player(&self) -> Option<Arc<dyn LocalPlayer>> {
        self.player
            .read()
            .clone()
            .map(|player| player as Arc<dyn LocalPlayer>)
    }

    fn engine_base(&self) -> RemoteAddress {
        self.engine_base
    }
}

// =============================================================================
// Scene builder
// =============================================================================

const CAMERA_SIZE: usize = 0x400;
const GAME_OBJECT_SIZE: usize = 0x100;
const CAMERA_LIST_CAPACITY: usize = 256;
const COMPONENT_CAPACITY: usize = 64;

/// Row-vector view-projection for a camera at `position` looking down +Z
///
/// Translation lands in M41..M43 and depth in M14..M44, the layout the
/// projector expects.
pub fn look_forward_matrix(position: Vec3, fov_deg: f32, aspect: f32) -> RawMatrix {
    let cot = 1.0 / (fov_deg.to_radians() * 0.5).tan();
    let sx = cot / aspect;
    let sy = cot;
    RawMatrix::from_rows([
        [sx, 0.0, 0.0, 0.0],
        [0.0, sy, 0.0, 0.0],
        [0.0, 0.0, 1.0, 1.0],
        [-position.x * sx, -position.y * sy, -position.z - 0.1, -position.z],
    ])
}

/// Camera list, cameras and game objects laid out the way [`OffsetsConfig`] describes
pub struct SimScene {
    pub target: SimulatedTarget,
    pub session: Arc<SimulatedSession>,
    pub offsets: OffsetsConfig,
    pub engine_base: RemoteAddress,
    pub camera_list: RemoteAddress,
    items: RemoteAddress,
    cameras: Mutex<Vec<RemoteAddress>>,
    components: Mutex<HashMap<RemoteAddress, (RemoteAddress, u64)>>,
}

impl SimScene {
    /// Empty scene with an engine module and a camera list
    pub fn new(offsets: OffsetsConfig) -> Self {
        let target = SimulatedTarget::new();
        let engine_base = target.alloc(offsets.camera.all_cameras as usize + 0x100);
        let camera_list = target.alloc(0x100);
        let items = target.alloc(CAMERA_LIST_CAPACITY * offsets.camera.list_stride as usize);

        target.poke(engine_base.offset(offsets.camera.all_cameras), &camera_list.get());
        target.poke(camera_list.offset(offsets.camera.list_items), &items.get());

        Self {
            session: Arc::new(SimulatedSession::new(engine_base)),
            target,
            offsets,
            engine_base,
            camera_list,
            items,
            cameras: Mutex::new(Vec::new()),
            components: Mutex::new(HashMap::new()),
        }
    }

    /// A scene with the first-person and optic cameras plus some unrelated ones
    pub fn standard() -> Self {
        Self::standard_with(OffsetsConfig::default())
    }

    /// [`SimScene::standard`] laid out with custom offsets
    pub fn standard_with(offsets: OffsetsConfig) -> Self {
        let scene = Self::new(offsets);
        scene.add_camera("Main Camera");
        scene.add_camera("UI");
        let fps = scene.add_camera("FPSCamera(Clone)");
        scene.add_camera("Weapon Camera");
        let optic = scene.add_camera("BaseOpticCamera(Clone)");

        let matrix = look_forward_matrix(Vec3::new(5.0, 2.0, -20.0), 75.0, 16.0 / 9.0);
        scene.set_matrix(fps, &matrix);
        scene.set_matrix(optic, &matrix);
        scene.set_lens(fps, 75.0, 16.0 / 9.0);
        scene.set_lens(optic, 15.0, 16.0 / 9.0);
        scene
    }

    /// Add a camera with a named game object to the global list
    pub fn add_camera(&self, name: &str) -> RemoteAddress {
        let camera = self.target.alloc(CAMERA_SIZE);
        let game_object = self.target.alloc(GAME_OBJECT_SIZE);
        let name_ptr = self.alloc_string(name);
        let layout = &self.offsets.camera;

        self.target
            .poke(camera.offset(layout.component_game_object), &game_object.get());
        self.target
            .poke(game_object.offset(layout.game_object_name), &name_ptr.get());

        let mut cameras = self.cameras.lock();
        let slot = self.items.offset(cameras.len() as u64 * layout.list_stride);
        self.target.poke(slot, &camera.get());
        cameras.push(camera);
        self.target.poke(
            self.camera_list.offset(layout.list_count),
            &(cameras.len() as i32),
        );
        camera
    }

    /// Cameras in list order
    pub fn cameras(&self) -> Vec<RemoteAddress> {
        self.cameras.lock().clone()
    }

    /// Overwrite the list element count
    pub fn set_list_count(&self, count: i32) {
        self.target.poke(
            self.camera_list.offset(self.offsets.camera.list_count),
            &count,
        );
    }

    pub fn set_matrix(&self, camera: RemoteAddress, matrix: &RawMatrix) {
        self.target
            .poke(camera.offset(self.offsets.camera.view_matrix), matrix);
    }

    pub fn set_lens(&self, camera: RemoteAddress, fov: f32, aspect: f32) {
        self.target.poke(camera.offset(self.offsets.camera.fov), &fov);
        self.target
            .poke(camera.offset(self.offsets.camera.aspect), &aspect);
    }

    /// Flip the optic camera's "is added" flag
    pub fn set_camera_active(&self, camera: RemoteAddress, active: bool) {
        self.target
            .poke(camera.offset(self.offsets.camera.is_added), &u8::from(active));
    }

    /// Owning game object of a camera
    pub fn game_object(&self, camera: RemoteAddress) -> Option<RemoteAddress> {
        self.target
            .peek::<u64>(camera.offset(self.offsets.camera.component_game_object))
            .map(RemoteAddress)
    }

    /// Attach a scripted component of `class_name` to a game object; returns
    /// the script instance that holds the component's fields
    pub fn add_component(&self, game_object: RemoteAddress, class_name: &str) -> RemoteAddress {
        let layout = &self.offsets.component;
        let mut components = self.components.lock();
        let (array, count) = *components.entry(game_object).or_insert_with(|| {
            let array = self
                .target
                .alloc(COMPONENT_CAPACITY * layout.entry_stride as usize);
            self.target
                .poke(game_object.offset(layout.components_array), &array.get());
            (array, 0)
        });

        let component = self.target.alloc(0x100);
        let instance = self.target.alloc(0x200);
        let class = self.target.alloc(0x100);
        let name_ptr = self.alloc_string(class_name);

        self.target
            .poke(component.offset(layout.component_object_class), &instance.get());
        self.target.poke(instance, &class.get());
        self.target.poke(class.offset(0x10), &name_ptr.get());

        let entry = array.offset(count * layout.entry_stride);
        self.target
            .poke(entry.offset(layout.entry_component), &component.get());
        self.target
            .poke(game_object.offset(layout.components_count), &(count + 1));
        components.insert(game_object, (array, count + 1));
        instance
    }

    fn alloc_string(&self, value: &str) -> RemoteAddress {
        let addr = self.target.alloc(value.len() + 1);
        self.target.poke_bytes(addr, value.as_bytes());
        addr
    }

    /// Enter a session with a spawned player
    pub fn start_session(&self) -> Arc<SimPlayer> {
        self.session.set_in_session(true);
        self.session.spawn_player()
    }

    pub fn end_session(&self) {
        self.session.set_in_session(false);
        self.session.despawn_player();
    }
}
