//! Device buffer allocators
//!
//! The allocator is an external capability: the harness only needs `create`
//! and `destroy`. Two in-process implementations stand in for real device
//! memory:
//! - [`UnifiedMemoryAllocator`]: fresh storage per request, counts live surfaces
//! - [`SurfacePoolAllocator`]: fixed pool of recycled surfaces, exhaustion is an
//!   allocation error

use super::alloc_zeroed;
use crate::error::{Error, Result};
use framexfer_common::MemoryDomain;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, trace};

/// Opaque device surface handed out by an allocator
#[derive(Debug)]
pub struct DeviceSurface {
    handle: u64,
    bytes: Vec<u8>,
}

impl DeviceSurface {
    pub fn new(handle: u64, bytes: Vec<u8>) -> Self {
        Self { handle, bytes }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Capability for obtaining and releasing device-resident storage
///
/// `destroy` is registered as the buffer destructor and runs exactly once per
/// surface, when the owning [`FrameBuffer`](super::FrameBuffer) drops.
pub trait DeviceBufferAllocator: Send + Sync {
    /// Memory domain of the surfaces this allocator hands out
    fn domain(&self) -> MemoryDomain;

    fn create(&self, size: usize) -> Result<DeviceSurface>;

    fn destroy(&self, surface: DeviceSurface);
}

/// Unified-memory allocator: every `create` gets fresh storage
#[derive(Debug, Default)]
pub struct UnifiedMemoryAllocator {
    next_handle: AtomicU64,
    live: AtomicUsize,
    destroyed: AtomicU64,
}

impl UnifiedMemoryAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surfaces created and not yet destroyed
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Total surfaces destroyed
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }
}

impl DeviceBufferAllocator for UnifiedMemoryAllocator {
    fn domain(&self) -> MemoryDomain {
        MemoryDomain::DeviceUnified
    }

    fn create(&self, size: usize) -> Result<DeviceSurface> {
        let bytes = alloc_zeroed(size)?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
        trace!("Unified surface {} created ({} bytes)", handle, size);
        Ok(DeviceSurface::new(handle, bytes))
    }

    fn destroy(&self, surface: DeviceSurface) {
        trace!("Unified surface {} destroyed", surface.handle());
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

struct PoolState {
    free: Vec<DeviceSurface>,
    created: usize,
    outstanding: usize,
}

/// Fixed-capacity pool of equally sized device surfaces
///
/// Surfaces are created lazily up to `capacity` and recycled on `destroy`.
/// Recycled surfaces keep their previous contents.
pub struct SurfacePoolAllocator {
    surface_len: usize,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl SurfacePoolAllocator {
    pub fn new(surface_len: usize, capacity: usize) -> Self {
        debug!(
            "Creating surface pool: {} surfaces of {} bytes",
            capacity, surface_len
        );
        Self {
            surface_len,
            capacity,
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(capacity),
                created: 0,
                outstanding: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Surfaces currently handed out
    pub fn outstanding(&self) -> usize {
        self.lock_state().outstanding
    }

    /// Surfaces allocated so far (never exceeds capacity)
    pub fn created(&self) -> usize {
        self.lock_state().created
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // A panic while holding the lock cannot leave the counters half-updated
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeviceBufferAllocator for SurfacePoolAllocator {
    fn domain(&self) -> MemoryDomain {
        MemoryDomain::DevicePooled
    }

    fn create(&self, size: usize) -> Result<DeviceSurface> {
        if size != self.surface_len {
            return Err(Error::Allocation(format!(
                "pool surfaces are {} bytes, requested {}",
                self.surface_len, size
            )));
        }

        let mut state = self.lock_state();
        let surface = match state.free.pop() {
            Some(surface) => surface,
            None if state.created < self.capacity => {
                let handle = state.created as u64;
                let surface = DeviceSurface::new(handle, alloc_zeroed(size)?);
                state.created += 1;
                surface
            }
            None => {
                return Err(Error::Allocation(format!(
                    "surface pool exhausted ({} of {} outstanding)",
                    state.outstanding, self.capacity
                )));
            }
        };
        state.outstanding += 1;
        Ok(surface)
    }

    fn destroy(&self, surface: DeviceSurface) {
        let mut state = self.lock_state();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.free.push(surface);
    }
}
