//! Frame buffer handle and per-trial batch

use super::allocator::{DeviceBufferAllocator, DeviceSurface};
use framexfer_common::MemoryDomain;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

enum Storage {
    Host(Vec<u8>),
    Device {
        /// Taken exactly once, in `Drop`
        surface: Option<DeviceSurface>,
        allocator: Arc<dyn DeviceBufferAllocator>,
    },
}

/// Fixed-size frame buffer tagged with its memory domain
///
/// Every mutable access bumps a write generation so test doubles can fence
/// writes that happen after an ownership transfer.
pub struct FrameBuffer {
    id: u64,
    domain: MemoryDomain,
    storage: Storage,
    write_generation: u64,
}

impl FrameBuffer {
    /// Wrap host memory
    pub fn host(id: u64, bytes: Vec<u8>) -> Self {
        Self {
            id,
            domain: MemoryDomain::Host,
            storage: Storage::Host(bytes),
            write_generation: 0,
        }
    }

    /// Wrap a device surface; `allocator.destroy` runs when the buffer drops
    pub fn device(id: u64, surface: DeviceSurface, allocator: Arc<dyn DeviceBufferAllocator>) -> Self {
        Self {
            id,
            domain: allocator.domain(),
            storage: Storage::Device {
                surface: Some(surface),
                allocator,
            },
            write_generation: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn domain(&self) -> MemoryDomain {
        self.domain
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Host(bytes) => bytes,
            Storage::Device { surface, .. } => surface.as_ref().map(|s| s.bytes()).unwrap_or(&[]),
        }
    }

    /// Mutable view of the frame bytes (counts as a write)
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.write_generation += 1;
        match &mut self.storage {
            Storage::Host(bytes) => bytes,
            Storage::Device { surface, .. } => match surface.as_mut() {
                Some(s) => s.bytes_mut(),
                None => &mut [],
            },
        }
    }

    /// Number of mutable accesses since creation
    pub fn write_generation(&self) -> u64 {
        self.write_generation
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Storage::Device { surface, allocator } = &mut self.storage {
            if let Some(surface) = surface.take() {
                trace!("Releasing device buffer {} (surface {})", self.id, surface.handle());
                allocator.destroy(surface);
            }
        }
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("len", &self.len())
            .field("write_generation", &self.write_generation)
            .finish()
    }
}

/// Ordered batch of frame buffers handed over in one operation
#[derive(Debug, Default)]
pub struct BufferBatch {
    buffers: Vec<FrameBuffer>,
}

impl BufferBatch {
    pub fn new(buffers: Vec<FrameBuffer>) -> Self {
        Self { buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameBuffer> {
        self.buffers.iter()
    }

    /// Total payload in bytes
    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(FrameBuffer::len).sum()
    }

    /// Detach up to `count` buffers from the front, preserving order
    pub fn split_front(&mut self, count: usize) -> BufferBatch {
        let count = count.min(self.buffers.len());
        BufferBatch::new(self.buffers.drain(..count).collect())
    }

    pub fn into_buffers(self) -> Vec<FrameBuffer> {
        self.buffers
    }
}

impl IntoIterator for BufferBatch {
    type Item = FrameBuffer;
    type IntoIter = std::vec::IntoIter<FrameBuffer>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffers.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::allocator::UnifiedMemoryAllocator;

    #[test]
    fn test_write_generation_counts_mutable_access() {
        let mut buffer = FrameBuffer::host(7, vec![0u8; 16]);
        assert_eq!(buffer.write_generation(), 0);

        buffer.data_mut()[0] = 0xFF;
        buffer.data_mut()[1] = 0xFF;

        assert_eq!(buffer.write_generation(), 2);
        assert_eq!(buffer.data()[..2], [0xFF, 0xFF]);
        // Reads are free
        let _ = buffer.data();
        assert_eq!(buffer.write_generation(), 2);
    }

    #[test]
    fn test_device_buffer_released_exactly_once_on_drop() {
        let allocator = Arc::new(UnifiedMemoryAllocator::new());
        let surface = allocator.create(64).unwrap();
        let buffer = FrameBuffer::device(1, surface, allocator.clone());

        assert_eq!(buffer.domain(), MemoryDomain::DeviceUnified);
        assert_eq!(buffer.len(), 64);
        assert_eq!(allocator.live(), 1);

        drop(buffer);
        assert_eq!(allocator.live(), 0);
        assert_eq!(allocator.destroyed(), 1);
    }

    #[test]
    fn test_split_front_preserves_order() {
        let mut batch = BufferBatch::new((0..5).map(|i| FrameBuffer::host(i, vec![0; 4])).collect());

        let head = batch.split_front(2);
        assert_eq!(head.iter().map(|b| b.id()).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(batch.iter().map(|b| b.id()).collect::<Vec<_>>(), vec![2, 3, 4]);

        let rest = batch.split_front(10);
        assert_eq!(rest.len(), 3);
        assert!(batch.is_empty());
        assert_eq!(rest.total_bytes(), 12);
    }
}
