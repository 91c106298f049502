//! Flip transform over packed pixel frames

use crate::error::{Error, Result};
use framexfer_common::{FlipMethod, FrameGeometry};
use std::ops::Range;

/// Flip a packed frame in place
pub fn flip_in_place(bytes: &mut [u8], geometry: &FrameGeometry, method: FlipMethod) -> Result<()> {
    let expected = geometry.frame_len().unwrap_or(usize::MAX);
    if bytes.len() != expected {
        return Err(Error::PipelineRuntime(format!(
            "frame is {} bytes, {} expects {}",
            bytes.len(),
            geometry,
            expected
        )));
    }

    let stride = geometry.row_stride();
    let height = geometry.height as usize;
    match method {
        FlipMethod::Horizontal => {
            let bpp = geometry.format.bytes_per_pixel();
            let width = geometry.width as usize;
            for row in bytes.chunks_exact_mut(stride) {
                for i in 0..width / 2 {
                    let left = i * bpp;
                    let right = (width - 1 - i) * bpp;
                    for k in 0..bpp {
                        row.swap(left + k, right + k);
                    }
                }
            }
        }
        FlipMethod::Vertical => {
            for r in 0..height / 2 {
                let mirror = height - 1 - r;
                let (upper, lower) = bytes.split_at_mut(mirror * stride);
                upper[r * stride..(r + 1) * stride].swap_with_slice(&mut lower[..stride]);
            }
        }
    }
    Ok(())
}

/// Row range occupied by rows `0..marked_rows` once the flip has run
pub fn marked_rows_after(method: FlipMethod, geometry: &FrameGeometry, marked_rows: usize) -> Range<usize> {
    let height = geometry.height as usize;
    let marked_rows = marked_rows.min(height);
    match method {
        // Fully marked rows stay where they are
        FlipMethod::Horizontal => 0..marked_rows,
        FlipMethod::Vertical => height - marked_rows..height,
    }
}
