//! Test helper modules for framexfer integration tests
//!
//! Provides reusable test infrastructure components:
//! - ScriptedPipeline: synchronous pipeline double with fault injection and a
//!   write-after-transfer fence
//! - settings builders for small, fast trials

#![allow(dead_code)]

pub mod scripted_pipeline;

pub use scripted_pipeline::{Fault, LifecycleStep, ScriptLog, ScriptedPipeline};

use framexfer_common::{BenchSettings, DrainMode, PixelFormat};

/// Tiny frames so trials finish in microseconds
pub fn small_settings(trials: u32, batch_size: usize, drain_mode: DrainMode) -> BenchSettings {
    BenchSettings {
        trials,
        batch_size,
        width: 8,
        height: 4,
        pixel_format: PixelFormat::Gray8,
        drain_mode,
        ..BenchSettings::default()
    }
}
