//! Per-trial batch construction

use crate::buffer::{alloc_zeroed, BufferBatch, DeviceBufferAllocator, FrameBuffer};
use crate::error::{Error, Result};
use crate::pipeline::flip::marked_rows_after;
use framexfer_common::{FlipMethod, FrameGeometry, MemoryDomain};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::trace;

/// Smoke-test marker value written into the first buffer of a host batch
pub const SMOKE_MARKER: u8 = 0xFF;

/// Where batch storage comes from
#[derive(Clone)]
pub enum SourcePolicy {
    /// Fresh host allocation per buffer
    Host,

    /// Surfaces from a device allocator, released through it on drop
    Device(Arc<dyn DeviceBufferAllocator>),
}

impl SourcePolicy {
    pub fn domain(&self) -> MemoryDomain {
        match self {
            SourcePolicy::Host => MemoryDomain::Host,
            SourcePolicy::Device(allocator) => allocator.domain(),
        }
    }
}

impl fmt::Debug for SourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePolicy::Host => f.write_str("Host"),
            SourcePolicy::Device(allocator) => write!(f, "Device({})", allocator.domain()),
        }
    }
}

/// Expected appearance of the marked buffer once the transform ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeCheck {
    /// Buffer carrying the marker
    pub buffer_id: u64,

    /// Rows expected to hold the marker after the flip
    pub marked_rows: Range<usize>,

    pub row_stride: usize,
}

impl SmokeCheck {
    /// Coarse check: marker rows are where the flip puts them, all other rows are clear
    pub fn matches(&self, frame: &[u8]) -> bool {
        frame
            .chunks_exact(self.row_stride)
            .enumerate()
            .all(|(row, bytes)| {
                let expected = if self.marked_rows.contains(&row) { SMOKE_MARKER } else { 0 };
                bytes.iter().all(|b| *b == expected)
            })
    }
}

/// Builds exactly `batch_size` buffers per trial
pub struct BufferSource {
    policy: SourcePolicy,
    geometry: FrameGeometry,
    frame_len: usize,
    batch_size: usize,
    next_id: u64,
}

impl BufferSource {
    pub fn new(policy: SourcePolicy, geometry: FrameGeometry, batch_size: usize) -> Result<Self> {
        let frame_len = geometry
            .frame_len()
            .ok_or_else(|| Error::Configuration(format!("frame size overflows: {}", geometry)))?;
        if batch_size == 0 {
            return Err(Error::Configuration("batch size must be at least 1".to_string()));
        }
        Ok(Self {
            policy,
            geometry,
            frame_len,
            batch_size,
            next_id: 0,
        })
    }

    /// Rows covered by the marker (the first half of the frame, at least one row)
    fn marker_rows(&self) -> usize {
        ((self.geometry.height as usize) / 2).max(1)
    }

    /// Build a fresh batch
    ///
    /// Host batches mark the first half of their first buffer with
    /// [`SMOKE_MARKER`]. Device batches are left as the allocator hands them out.
    pub fn build_batch(&mut self) -> Result<BufferBatch> {
        let mut buffers = Vec::with_capacity(self.batch_size);
        for slot in 0..self.batch_size {
            let id = self.next_id + slot as u64;
            let buffer = match &self.policy {
                SourcePolicy::Host => {
                    let mut bytes = alloc_zeroed(self.frame_len)?;
                    if slot == 0 {
                        let marked = self.marker_rows() * self.geometry.row_stride();
                        bytes[..marked].fill(SMOKE_MARKER);
                    }
                    FrameBuffer::host(id, bytes)
                }
                SourcePolicy::Device(allocator) => {
                    let surface = allocator.create(self.frame_len)?;
                    FrameBuffer::device(id, surface, Arc::clone(allocator))
                }
            };
            buffers.push(buffer);
        }
        self.next_id += self.batch_size as u64;

        trace!(
            "Built batch of {} {} buffers ({} bytes each)",
            self.batch_size,
            self.policy.domain(),
            self.frame_len
        );
        Ok(BufferBatch::new(buffers))
    }

    /// Smoke check for the batch built most recently
    ///
    /// `None` for device batches, which carry no marker.
    pub fn smoke_check(&self, flip: FlipMethod) -> Option<SmokeCheck> {
        match self.policy {
            SourcePolicy::Host => Some(SmokeCheck {
                buffer_id: self.next_id.checked_sub(self.batch_size as u64)?,
                marked_rows: marked_rows_after(flip, &self.geometry, self.marker_rows()),
                row_stride: self.geometry.row_stride(),
            }),
            SourcePolicy::Device(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{SurfacePoolAllocator, UnifiedMemoryAllocator};
    use crate::pipeline::flip_in_place;
    use framexfer_common::PixelFormat;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(4, 4, PixelFormat::Gray8)
    }

    #[test]
    fn test_host_batch_has_exactly_n_buffers() {
        let mut source = BufferSource::new(SourcePolicy::Host, geometry(), 5).unwrap();
        let batch = source.build_batch().unwrap();

        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|b| b.len() == 16 && b.domain() == MemoryDomain::Host));
        let ids: Vec<u64> = batch.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        // Ids keep counting across trials
        let next = source.build_batch().unwrap();
        assert_eq!(next.iter().next().unwrap().id(), 5);
    }

    #[test]
    fn test_only_first_host_buffer_is_marked() {
        let mut source = BufferSource::new(SourcePolicy::Host, geometry(), 2).unwrap();
        let batch = source.build_batch().unwrap();
        let buffers = batch.into_buffers();

        assert_eq!(&buffers[0].data()[..8], &[SMOKE_MARKER; 8]);
        assert_eq!(&buffers[0].data()[8..], &[0; 8]);
        assert!(buffers[1].data().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_smoke_check_follows_flip() {
        for flip in [FlipMethod::Horizontal, FlipMethod::Vertical] {
            let mut source = BufferSource::new(SourcePolicy::Host, geometry(), 1).unwrap();
            let batch = source.build_batch().unwrap();
            let check = source.smoke_check(flip).unwrap();
            let mut frame = batch.into_buffers().remove(0);

            // Untransformed frames only pass when the flip leaves rows in place
            assert_eq!(check.matches(frame.data()), flip == FlipMethod::Horizontal);

            flip_in_place(frame.data_mut(), &geometry(), flip).unwrap();
            assert!(check.matches(frame.data()));
        }
    }

    #[test]
    fn test_device_batch_uses_allocator() {
        let allocator = Arc::new(UnifiedMemoryAllocator::new());
        let mut source =
            BufferSource::new(SourcePolicy::Device(allocator.clone()), geometry(), 3).unwrap();

        let batch = source.build_batch().unwrap();
        assert_eq!(allocator.live(), 3);
        assert!(batch.iter().all(|b| b.domain() == MemoryDomain::DeviceUnified));
        assert!(source.smoke_check(FlipMethod::Horizontal).is_none());

        drop(batch);
        assert_eq!(allocator.live(), 0);
    }

    #[test]
    fn test_pool_exhaustion_surfaces_as_allocation_error() {
        let pool = Arc::new(SurfacePoolAllocator::new(16, 2));
        let mut source = BufferSource::new(SourcePolicy::Device(pool.clone()), geometry(), 3).unwrap();

        let err = source.build_batch().unwrap_err();
        assert!(matches!(err, Error::Allocation(_)));
        // The partial batch was released
        assert_eq!(pool.outstanding(), 0);
    }
}
