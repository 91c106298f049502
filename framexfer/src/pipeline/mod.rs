//! Pipeline capability
//!
//! The pipeline is an external collaborator: a linear source → transform →
//! sink topology that accepts frame batches and hands back transformed frames.
//! The harness talks to it only through the [`Pipeline`] trait:
//! - lifecycle: `configure`, `activate`, `deactivate`, `reset`
//! - signals: typed [`PipelineEvent`]s delivered through an [`EventSubscription`]
//! - transport: bulk `push` + `end_of_stream`, blocking `pull_next`
//!
//! [`FlipPipeline`] is the in-process backend used by the binary.

pub mod flip;
pub mod memory;

pub use flip::flip_in_place;
pub use memory::FlipPipeline;

use crate::buffer::{BufferBatch, FrameBuffer};
use crate::error::{Error, Result};
use framexfer_common::{BenchSettings, FlipMethod, FrameGeometry, MemoryDomain};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

/// Declarative parameters for the single-stage topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageParams {
    pub geometry: FrameGeometry,

    /// Source/sink queue capacity in buffers (max-buffers)
    pub batch_capacity: usize,

    pub memory_domain: MemoryDomain,

    pub flip: FlipMethod,
}

impl StageParams {
    pub fn from_settings(settings: &BenchSettings) -> Self {
        Self {
            geometry: settings.geometry(),
            batch_capacity: settings.batch_size,
            memory_domain: settings.memory_domain,
            flip: settings.flip_method,
        }
    }

    /// Expected frame size in bytes
    pub fn frame_len(&self) -> Result<usize> {
        self.geometry
            .frame_len()
            .ok_or_else(|| Error::Configuration(format!("frame size overflows: {}", self.geometry)))
    }
}

/// Signals a pipeline raises towards the harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Source queue wants data
    NeedData { free_slots: usize },

    /// Source queue reached capacity
    BufferFull,

    /// One transformed buffer is waiting at the sink
    SampleReady,

    /// Every buffer before end-of-stream has reached the sink
    EndOfStream,

    /// A stage failed asynchronously
    Error { stage: String, message: String },
}

/// Which optional signals a backend raises
///
/// Backends that skip need-data are fed directly after activation; backends
/// that skip sample-ready can only be drained with blocking pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSupport {
    pub need_data: bool,
    pub buffer_full: bool,
    pub sample_ready: bool,
}

impl SignalSupport {
    pub fn all() -> Self {
        Self {
            need_data: true,
            buffer_full: true,
            sample_ready: true,
        }
    }

    /// Bulk push + blocking pulls only
    pub fn none() -> Self {
        Self {
            need_data: false,
            buffer_full: false,
            sample_ready: false,
        }
    }
}

/// Result of an accepted push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStatus {
    /// Buffers taken over by the pipeline
    pub accepted: usize,

    /// Source queue is at capacity after this push
    pub queue_full: bool,
}

/// Receiving end of a pipeline's signal stream
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl EventSubscription {
    /// Block until the next event arrives
    ///
    /// There is no timeout: a hung pipeline hangs the caller.
    pub fn wait(&mut self) -> Result<PipelineEvent> {
        self.rx
            .blocking_recv()
            .ok_or_else(|| Error::PipelineRuntime("pipeline event channel closed".to_string()))
    }

    /// Next event if one is already queued
    #[cfg(test)]
    pub fn try_next(&mut self) -> Option<PipelineEvent> {
        self.rx.try_recv().ok()
    }

    /// Drop queued events left over from a finished trial
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

/// Fan-out of pipeline events to every live subscription
///
/// Cheap to clone; stage worker threads hold their own copy.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<PipelineEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        EventSubscription { rx }
    }

    /// Deliver `event` to all subscribers, forgetting dropped ones
    pub fn emit(&self, event: PipelineEvent) {
        trace!("pipeline event: {:?}", event);
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<PipelineEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Single-stage transform pipeline
pub trait Pipeline: Send {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Build and validate the topology; fails with a configuration error if
    /// the parameters cannot be realized
    fn configure(&mut self, params: &StageParams) -> Result<()>;

    /// Optional signals this backend raises
    fn signals(&self) -> SignalSupport;

    /// Register a new signal subscription
    fn subscribe(&mut self) -> EventSubscription;

    /// Start processing (PLAYING)
    fn activate(&mut self) -> Result<()>;

    /// Stop processing and release in-flight buffers (NULL)
    fn deactivate(&mut self) -> Result<()>;

    /// Return to a state ready for the next trial's batch (READY)
    fn reset(&mut self) -> Result<()>;

    /// Take ownership of every buffer in `batch`, or none of them
    fn push(&mut self, batch: BufferBatch) -> Result<FlowStatus>;

    /// Signal that no more input follows in this trial
    fn end_of_stream(&mut self) -> Result<()>;

    /// Block until the next transformed buffer is available
    ///
    /// Returns `Ok(None)` once end-of-stream has been reached with nothing
    /// pending.
    fn pull_next(&mut self) -> Result<Option<FrameBuffer>>;
}
