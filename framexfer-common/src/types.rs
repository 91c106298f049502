//! Frame transport types shared across the workspace
//!
//! All enums deserialize from kebab-case strings so they can be written
//! directly in the TOML bootstrap file (`memory_domain = "device-pooled"`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a frame buffer's storage lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryDomain {
    /// Plain host (system) memory
    Host,

    /// Unified memory addressable from both host and device
    DeviceUnified,

    /// Device surfaces recycled through an external pool
    DevicePooled,
}

impl MemoryDomain {
    /// True for domains whose buffers come from a device allocator
    pub fn is_device(&self) -> bool {
        !matches!(self, MemoryDomain::Host)
    }
}

impl fmt::Display for MemoryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryDomain::Host => write!(f, "host"),
            MemoryDomain::DeviceUnified => write!(f, "device-unified"),
            MemoryDomain::DevicePooled => write!(f, "device-pooled"),
        }
    }
}

impl FromStr for MemoryDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(MemoryDomain::Host),
            "device-unified" | "unified" => Ok(MemoryDomain::DeviceUnified),
            "device-pooled" | "pooled" => Ok(MemoryDomain::DevicePooled),
            other => Err(format!(
                "unknown memory domain '{}' (expected host, device-unified or device-pooled)",
                other
            )),
        }
    }
}

/// Packed pixel formats understood by the flip stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    Rgba,
    Bgrx,
    Gray8,
    Gray16,
}

impl PixelFormat {
    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgrx => 4,
            PixelFormat::Gray16 => 2,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgba => write!(f, "RGBA"),
            PixelFormat::Bgrx => write!(f, "BGRx"),
            PixelFormat::Gray8 => write!(f, "GRAY8"),
            PixelFormat::Gray16 => write!(f, "GRAY16"),
        }
    }
}

/// Frame dimensions and layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Bytes per row (no padding)
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Total frame size in bytes, `None` on overflow
    pub fn frame_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.bytes_per_pixel())
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// Geometry operation applied by the transform stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlipMethod {
    /// Mirror each row left to right
    Horizontal,

    /// Mirror rows top to bottom
    Vertical,
}

impl fmt::Display for FlipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlipMethod::Horizontal => write!(f, "horizontal-flip"),
            FlipMethod::Vertical => write!(f, "vertical-flip"),
        }
    }
}

/// How the sink collects completed buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrainMode {
    /// Pull one buffer per sample-ready signal inside the trial event loop
    Notify,

    /// Issue exactly N blocking pulls
    Blocking,
}

impl fmt::Display for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainMode::Notify => write!(f, "notify"),
            DrainMode::Blocking => write!(f, "blocking"),
        }
    }
}

impl FromStr for DrainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notify" => Ok(DrainMode::Notify),
            "blocking" => Ok(DrainMode::Blocking),
            other => Err(format!(
                "unknown drain mode '{}' (expected notify or blocking)",
                other
            )),
        }
    }
}

/// How a trial's batch is handed to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedMode {
    /// Whole batch in one push, then end-of-stream
    SingleBurst,

    /// One chunk per need-data signal; end-of-stream after the last chunk
    Chunked { chunk_size: usize },
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedMode::SingleBurst => write!(f, "single-burst"),
            FeedMode::Chunked { chunk_size } => write!(f, "chunked({})", chunk_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_rgba() {
        let geometry = FrameGeometry::new(1920, 1080, PixelFormat::Rgba);
        assert_eq!(geometry.row_stride(), 7680);
        assert_eq!(geometry.frame_len(), Some(1920 * 1080 * 4));
    }

    #[test]
    fn test_frame_len_overflow() {
        let geometry = FrameGeometry::new(u32::MAX, u32::MAX, PixelFormat::Rgba);
        // 64-bit usize can hold u32::MAX² but not ×4
        if usize::BITS == 64 {
            assert_eq!(geometry.frame_len(), None);
        }
    }

    #[test]
    fn test_memory_domain_parse() {
        assert_eq!("host".parse::<MemoryDomain>(), Ok(MemoryDomain::Host));
        assert_eq!("pooled".parse::<MemoryDomain>(), Ok(MemoryDomain::DevicePooled));
        assert_eq!(
            "Device-Unified".parse::<MemoryDomain>(),
            Ok(MemoryDomain::DeviceUnified)
        );
        assert!("gpu".parse::<MemoryDomain>().is_err());
        assert!(MemoryDomain::DevicePooled.is_device());
        assert!(!MemoryDomain::Host.is_device());
    }

    #[test]
    fn test_drain_mode_parse() {
        assert_eq!("blocking".parse::<DrainMode>(), Ok(DrainMode::Blocking));
        assert!("poll".parse::<DrainMode>().is_err());
    }
}
