//! Scatter batching
//!
//! [`ReadBatch`] wraps a transport scatter request for typed reads with
//! completion callbacks. [`ScatterWriteHandle`] owns one write batch per
//! write tick: writes accumulate, are flushed once by `execute`, and only
//! then are post-commit callbacks run.

use crate::traits::{MemoryAccess, ScatterRequest};
use bytemuck::Pod;
use periscope_common::{Error, RemoteAddress, Result};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Per-address results of an executed scatter request
#[derive(Debug, Clone, Default)]
pub struct ScatterResults {
    reads: HashMap<(RemoteAddress, usize), Vec<u8>>,
}

impl ScatterResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful read
    pub fn insert(&mut self, addr: RemoteAddress, data: Vec<u8>) {
        self.reads.insert((addr, data.len()), data);
    }

    /// Bytes read at `addr` for a request of `len` bytes
    pub fn bytes(&self, addr: RemoteAddress, len: usize) -> Option<&[u8]> {
        self.reads.get(&(addr, len)).map(Vec::as_slice)
    }

    /// Typed value read at `addr`, `None` if that read failed or was never prepared
    pub fn read_value<T: Pod>(&self, addr: RemoteAddress) -> Option<T> {
        self.bytes(addr, std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

type Completion = Box<dyn FnOnce(&ScatterResults) + Send>;

/// Single-use batch of reads with completion callbacks
pub struct ReadBatch {
    request: Box<dyn ScatterRequest>,
    completions: Vec<Completion>,
    prepared: usize,
}

impl ReadBatch {
    pub fn create(mem: &dyn MemoryAccess) -> Result<Self> {
        Ok(Self::from_request(mem.create_scatter()?))
    }

    pub fn from_request(request: Box<dyn ScatterRequest>) -> Self {
        Self {
            request,
            completions: Vec::new(),
            prepared: 0,
        }
    }

    /// Queue a typed read
    pub fn prepare_read_value<T: Pod>(&mut self, addr: RemoteAddress) -> Result<()> {
        self.prepare_read_range(addr, std::mem::size_of::<T>())
    }

    /// Queue a raw byte-range read
    pub fn prepare_read_range(&mut self, addr: RemoteAddress, len: usize) -> Result<()> {
        if !addr.is_valid() {
            return Err(Error::InvalidAddress(addr.get()));
        }
        self.request.prepare_read(addr, len)?;
        self.prepared += 1;
        Ok(())
    }

    /// Run `callback` with the results once the batch has executed
    pub fn on_completed(&mut self, callback: impl FnOnce(&ScatterResults) + Send + 'static) {
        self.completions.push(Box::new(callback));
    }

    pub fn prepared(&self) -> usize {
        self.prepared
    }

    /// Execute the batch, then run completion callbacks in registration order
    pub fn execute(mut self) -> Result<ScatterResults> {
        let results = if self.prepared == 0 {
            ScatterResults::new()
        } else {
            self.request.execute()?
        };
        trace!(
            prepared = self.prepared,
            succeeded = results.len(),
            "Read batch executed"
        );
        for completion in self.completions.drain(..) {
            completion(&results);
        }
        Ok(results)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open,
    Executed,
    Disposed,
}

type CommitCallback = Box<dyn FnOnce() + Send>;

/// Write-only scatter handle used by memory write features
///
/// Nothing reaches the target until [`execute`](Self::execute) returns.
/// Once executed or disposed, every further call fails with `InvalidState`.
pub struct ScatterWriteHandle {
    request: Option<Box<dyn ScatterRequest>>,
    callbacks: Vec<CommitCallback>,
    pending: usize,
    state: HandleState,
}

impl ScatterWriteHandle {
    /// Open a write batch on the target
    pub fn create(mem: &dyn MemoryAccess) -> Result<Self> {
        Ok(Self::from_request(mem.create_scatter()?))
    }

    pub fn from_request(request: Box<dyn ScatterRequest>) -> Self {
        Self {
            request: Some(request),
            callbacks: Vec::new(),
            pending: 0,
            state: HandleState::Open,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Executed => Err(Error::InvalidState(
                "scatter write handle already executed".into(),
            )),
            HandleState::Disposed => Err(Error::InvalidState(
                "scatter write handle disposed".into(),
            )),
        }
    }

    /// Queue a typed value write
    pub fn add_write<T: Pod>(&mut self, addr: RemoteAddress, value: T) -> Result<()> {
        self.add_write_bytes(addr, bytemuck::bytes_of(&value))
    }

    /// Queue a one-byte boolean write
    pub fn add_write_bool(&mut self, addr: RemoteAddress, value: bool) -> Result<()> {
        self.add_write_bytes(addr, &[u8::from(value)])
    }

    /// Queue a raw byte write
    pub fn add_write_bytes(&mut self, addr: RemoteAddress, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if !addr.is_valid() {
            return Err(Error::InvalidAddress(addr.get()));
        }
        let request = self
            .request
            .as_mut()
            .ok_or_else(|| Error::InvalidState("scatter write handle has no request".into()))?;
        request.prepare_write(addr, data)?;
        self.pending += 1;
        Ok(())
    }

    /// Run `callback` after the batch has been committed successfully
    pub fn on_committed(&mut self, callback: impl FnOnce() + Send + 'static) -> Result<()> {
        self.ensure_open()?;
        self.callbacks.push(Box::new(callback));
        Ok(())
    }

    /// Number of writes queued so far
    pub fn pending_writes(&self) -> usize {
        self.pending
    }

    pub fn is_consumed(&self) -> bool {
        self.state != HandleState::Open
    }

    /// Flush all queued writes in one transport call, then run commit callbacks.
    ///
    /// An empty batch skips the transport but still runs callbacks.
    pub fn execute(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = HandleState::Executed;

        if self.pending > 0 {
            let request = self
                .request
                .as_mut()
                .ok_or_else(|| Error::InvalidState("scatter write handle has no request".into()))?;
            if let Err(e) = request.execute() {
                warn!(pending = self.pending, error = %e, "Scatter write flush failed");
                self.callbacks.clear();
                return Err(e);
            }
            debug!(writes = self.pending, "Scatter writes committed");
        }

        for callback in self.callbacks.drain(..) {
            callback();
        }
        Ok(())
    }

    /// Release the underlying request. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.state == HandleState::Disposed {
            return;
        }
        if self.state == HandleState::Open && self.pending > 0 {
            debug!(
                pending = self.pending,
                "Disposing scatter write handle with unflushed writes"
            );
        }
        self.state = HandleState::Disposed;
        self.callbacks.clear();
        self.request = None;
    }
}

impl Drop for ScatterWriteHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}
