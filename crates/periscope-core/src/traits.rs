//! Core trait definitions for Periscope
//!
//! The memory transport (DMA device, driver, or the in-process simulator) and
//! the game-side collaborators are consumed through these traits.

use crate::scatter::ScatterResults;
use bytemuck::Pod;
use periscope_common::{Error, RemoteAddress, Result};
use std::sync::Arc;

/// Memory access primitives of the target process
pub trait MemoryAccess: Send + Sync {
    /// Read `len` bytes at `addr`
    fn read(&self, addr: RemoteAddress, len: usize, use_cache: bool) -> Result<Vec<u8>>;

    /// Write bytes directly at `addr`
    fn write(&self, addr: RemoteAddress, data: &[u8]) -> Result<()>;

    /// Create an empty scatter request bound to the target
    fn create_scatter(&self) -> Result<Box<dyn ScatterRequest>>;
}

/// Batched I/O: prepare any number of reads and writes, then execute once
pub trait ScatterRequest: Send {
    /// Queue a read of `len` bytes at `addr`
    fn prepare_read(&mut self, addr: RemoteAddress, len: usize) -> Result<()>;

    /// Queue a write of `data` at `addr`
    fn prepare_write(&mut self, addr: RemoteAddress, data: &[u8]) -> Result<()>;

    /// Submit every prepared operation in one transport round trip.
    ///
    /// Reads that failed are absent from the returned results.
    fn execute(&mut self) -> Result<ScatterResults>;
}

/// Typed helpers over [`MemoryAccess`]
pub trait MemoryAccessExt: MemoryAccess {
    /// Read a plain-old-data value
    fn read_value<T: Pod>(&self, addr: RemoteAddress, use_cache: bool) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read(addr, size, use_cache)?;
        if bytes.len() < size {
            return Err(Error::memory(
                addr.get(),
                format!("short read: expected {} bytes, got {}", size, bytes.len()),
            ));
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    }

    /// Read a pointer-sized value as an address
    fn read_ptr(&self, addr: RemoteAddress, use_cache: bool) -> Result<RemoteAddress> {
        self.read_value::<u64>(addr, use_cache).map(RemoteAddress)
    }

    /// Read a pointer and fail unless it is a valid address
    fn read_valid_ptr(&self, addr: RemoteAddress, use_cache: bool) -> Result<RemoteAddress> {
        let ptr = self.read_ptr(addr, use_cache)?;
        if !ptr.is_valid() {
            return Err(Error::InvalidAddress(ptr.get()));
        }
        Ok(ptr)
    }

    /// Follow `base + offsets[0]` → ptr, `ptr + offsets[1]` → ptr, ...
    fn read_ptr_chain(
        &self,
        base: RemoteAddress,
        offsets: &[u64],
        use_cache: bool,
    ) -> Result<RemoteAddress> {
        let mut current = base;
        for offset in offsets {
            current = self.read_valid_ptr(current.offset(*offset), use_cache)?;
        }
        Ok(current)
    }

    /// Read a NUL-terminated UTF-8 string of at most `max_len` bytes
    fn read_utf8(&self, addr: RemoteAddress, max_len: usize, use_cache: bool) -> Result<String> {
        let bytes = self.read(addr, max_len, use_cache)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Write a plain-old-data value directly (outside any batch)
    fn write_value<T: Pod>(&self, addr: RemoteAddress, value: &T) -> Result<()> {
        self.write(addr, bytemuck::bytes_of(value))
    }
}

impl<M: MemoryAccess + ?Sized> MemoryAccessExt for M {}

/// Local player as seen by the camera and write code
pub trait LocalPlayer: Send + Sync {
    /// Aiming down sights
    fn is_aiming(&self) -> bool;

    /// Magnification of the active optic, `None` when it cannot be determined
    fn optic_zoom(&self) -> Option<f32>;
}

/// Game session collaborator
pub trait GameSession: Send + Sync {
    /// The observed game activity (raid, match, level) is running
    fn in_session(&self) -> bool;

    /// Local player, once spawned
    fn local_player(&self) -> Option<Arc<dyn LocalPlayer>>;

    /// Base address of the engine module holding the global camera list
    fn engine_base(&self) -> RemoteAddress;
}
