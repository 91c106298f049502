//! Frame buffers, batches, and device allocators
//!
//! A [`FrameBuffer`] is exclusively owned by one component at a time. Handing
//! it to the pipeline or the sink moves it; device storage is returned to its
//! allocator when the last owner drops the buffer.

pub mod allocator;
pub mod frame;

pub use allocator::{DeviceBufferAllocator, DeviceSurface, SurfacePoolAllocator, UnifiedMemoryAllocator};
pub use frame::{BufferBatch, FrameBuffer};

use crate::error::{Error, Result};

/// Allocate `len` zeroed bytes, reporting exhaustion instead of aborting
pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|e| Error::Allocation(format!("cannot allocate {} bytes: {}", len, e)))?;
    bytes.resize(len, 0);
    Ok(bytes)
}
