//! # framexfer
//!
//! Frame-buffer transport latency benchmark.
//!
//! **Purpose:** Push a batch of fixed-size frame buffers through a single-stage
//! transform pipeline, drain the results, and time the round trip over many
//! strictly sequential trials to compare host, unified and pooled device
//! memory.
//!
//! **Architecture:** [`harness`] drives a [`pipeline::Pipeline`] backend with
//! buffers from [`buffer`]; [`stats`] summarises the trial series and
//! [`report`] renders it.

pub mod buffer;
pub mod error;
pub mod harness;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod system_info;

pub use error::{Error, ErrorKind, Result};
