//! # framexfer Common Library
//!
//! Shared code for the framexfer workspace including:
//! - Frame and transport types (memory domain, pixel format, geometry)
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod types;

pub use config::{BenchSettings, LoggingConfig};
pub use error::{Error, Result};
pub use types::{DrainMode, FeedMode, FlipMethod, FrameGeometry, MemoryDomain, PixelFormat};
