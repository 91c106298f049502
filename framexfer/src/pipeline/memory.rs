//! In-process flip pipeline
//!
//! ```text
//! push(batch) ──► source queue (HeapRb, max-buffers = batch capacity)
//!                      │
//!                      ▼
//!               flip stage worker thread
//!                      │
//!                      ▼
//!                sink queue (bounded mpsc) ──► pull_next()
//! ```
//!
//! The worker raises need-data when the source queue runs dry, sample-ready per
//! transformed frame, and end-of-stream once end-of-stream was signalled and
//! the source queue is empty. `push` raises buffer-full when a push fills the
//! source queue.
//!
//! A fresh worker and fresh queues are built on every `activate`, so nothing
//! from one trial survives into the next.

use super::flip::flip_in_place;
use super::{EventBus, EventSubscription, FlowStatus, Pipeline, PipelineEvent, SignalSupport, StageParams};
use crate::buffer::{BufferBatch, FrameBuffer};
use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Largest frame the backend accepts (1 GiB)
const MAX_FRAME_BYTES: usize = 1 << 30;

/// Lifecycle states, mirroring NULL / READY / PLAYING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Unconfigured,
    Ready,
    Playing,
}

/// Flags shared between the pipeline handle and its stage worker
#[derive(Default)]
struct StageControl {
    shutdown: AtomicBool,
    input_eos: AtomicBool,

    /// Buffers pushed but not yet taken by the worker
    queued: AtomicUsize,
}

enum StageOutput {
    Frame(FrameBuffer),
    EndOfStream,
}

/// Per-activation resources
struct StageSession {
    producer: HeapProd<FrameBuffer>,
    output: mpsc::Receiver<StageOutput>,
    control: Arc<StageControl>,
    worker: Option<JoinHandle<()>>,
    input_eos: bool,
    output_eos: bool,
}

impl StageSession {
    fn wake_worker(&self) {
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
    }
}

/// Source → flip → sink pipeline running its stage on a worker thread
pub struct FlipPipeline {
    params: Option<StageParams>,
    signals: SignalSupport,
    bus: EventBus,
    lifecycle: Lifecycle,
    session: Option<StageSession>,
}

impl FlipPipeline {
    /// Backend raising every signal
    pub fn new() -> Self {
        Self::with_signals(SignalSupport::all())
    }

    /// Backend that only supports bulk push + blocking pulls
    pub fn without_signals() -> Self {
        Self::with_signals(SignalSupport::none())
    }

    pub fn with_signals(signals: SignalSupport) -> Self {
        Self {
            params: None,
            signals,
            bus: EventBus::new(),
            lifecycle: Lifecycle::Unconfigured,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Playing
    }

    fn active_session(&mut self, op: &str) -> Result<&mut StageSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Push(format!("{}: pipeline is not active (flushing)", op)))
    }
}

impl Default for FlipPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for FlipPipeline {
    fn name(&self) -> &str {
        "flip"
    }

    fn configure(&mut self, params: &StageParams) -> Result<()> {
        if self.lifecycle == Lifecycle::Playing {
            return Err(Error::InvalidState(
                "cannot reconfigure an active pipeline".to_string(),
            ));
        }
        if params.geometry.width == 0 || params.geometry.height == 0 {
            return Err(Error::Configuration(format!(
                "cannot negotiate zero-sized frames ({})",
                params.geometry
            )));
        }
        let frame_len = params.frame_len()?;
        if frame_len > MAX_FRAME_BYTES {
            return Err(Error::Configuration(format!(
                "frame of {} bytes exceeds the {} byte limit",
                frame_len, MAX_FRAME_BYTES
            )));
        }
        if params.batch_capacity == 0 {
            return Err(Error::Configuration(
                "max-buffers must be at least 1".to_string(),
            ));
        }

        info!(
            "Configured pipeline: source ! {} ! sink, {} frames, max-buffers={}, memory={}",
            params.flip, params.geometry, params.batch_capacity, params.memory_domain
        );
        self.params = Some(*params);
        self.lifecycle = Lifecycle::Ready;
        Ok(())
    }

    fn signals(&self) -> SignalSupport {
        self.signals
    }

    fn subscribe(&mut self) -> EventSubscription {
        self.bus.subscribe()
    }

    fn activate(&mut self) -> Result<()> {
        let params = match self.lifecycle {
            Lifecycle::Unconfigured => {
                return Err(Error::InvalidState("pipeline is not configured".to_string()))
            }
            Lifecycle::Playing => {
                return Err(Error::InvalidState("pipeline is already active".to_string()))
            }
            Lifecycle::Ready => self
                .params
                .ok_or_else(|| Error::InvalidState("pipeline is not configured".to_string()))?,
        };

        let capacity = params.batch_capacity;
        let (producer, consumer) = HeapRb::<FrameBuffer>::new(capacity).split();
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let control = Arc::new(StageControl::default());

        let worker = StageWorker {
            consumer,
            output: output_tx,
            control: Arc::clone(&control),
            bus: self.bus.clone(),
            signals: self.signals,
            params,
        };
        let handle = thread::Builder::new()
            .name("flip-stage".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::PipelineRuntime(format!("cannot start flip stage: {}", e)))?;

        self.session = Some(StageSession {
            producer,
            output: output_rx,
            control,
            worker: Some(handle),
            input_eos: false,
            output_eos: false,
        });
        self.lifecycle = Lifecycle::Playing;
        debug!("Pipeline activated");
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if self.lifecycle == Lifecycle::Playing {
            self.lifecycle = Lifecycle::Ready;
        }

        session.control.shutdown.store(true, Ordering::Release);
        // Wakes a worker blocked on a full sink queue
        session.output.close();
        session.wake_worker();

        let joined = match session.worker.take() {
            Some(worker) => worker.join(),
            None => Ok(()),
        };

        let mut discarded = 0;
        while session.output.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Deactivate released {} undrained output buffers", discarded);
        }

        joined.map_err(|_| Error::PipelineRuntime("flip stage worker panicked".to_string()))
    }

    fn reset(&mut self) -> Result<()> {
        self.deactivate()?;
        if self.params.is_none() {
            return Err(Error::InvalidState("pipeline is not configured".to_string()));
        }
        self.lifecycle = Lifecycle::Ready;
        Ok(())
    }

    fn push(&mut self, batch: BufferBatch) -> Result<FlowStatus> {
        let params = self
            .params
            .ok_or_else(|| Error::Push("pipeline is not configured".to_string()))?;
        let frame_len = params.frame_len()?;
        let capacity = params.batch_capacity;
        let signals = self.signals;
        let session = self.active_session("push")?;

        if session.input_eos {
            return Err(Error::Push(
                "end-of-stream already signalled (eos)".to_string(),
            ));
        }
        for frame in batch.iter() {
            if frame.domain() != params.memory_domain {
                return Err(Error::Push(format!(
                    "buffer {} is {} memory, pipeline negotiated {} (not-negotiated)",
                    frame.id(),
                    frame.domain(),
                    params.memory_domain
                )));
            }
            if frame.len() != frame_len {
                return Err(Error::Push(format!(
                    "buffer {} is {} bytes, caps require {} (not-negotiated)",
                    frame.id(),
                    frame.len(),
                    frame_len
                )));
            }
        }

        let count = batch.len();
        // The worker only ever lowers this, so the free space can only grow
        let queued = session.control.queued.load(Ordering::Acquire);
        let free = capacity.saturating_sub(queued);
        if count > free {
            return Err(Error::Push(format!(
                "source queue would overflow: {} buffers pushed, {} of {} slots free",
                count, free, capacity
            )));
        }

        session.control.queued.fetch_add(count, Ordering::AcqRel);
        for frame in batch {
            if let Err(frame) = session.producer.try_push(frame) {
                return Err(Error::Push(format!(
                    "source queue rejected buffer {}",
                    frame.id()
                )));
            }
        }
        session.wake_worker();
        trace!("Pushed {} buffers ({} already queued)", count, queued);

        let queue_full = queued + count >= capacity;
        if queue_full && signals.buffer_full {
            self.bus.emit(PipelineEvent::BufferFull);
        }
        Ok(FlowStatus {
            accepted: count,
            queue_full,
        })
    }

    fn end_of_stream(&mut self) -> Result<()> {
        let session = self.active_session("end-of-stream")?;
        if session.input_eos {
            return Err(Error::Push(
                "end-of-stream already signalled (eos)".to_string(),
            ));
        }
        session.input_eos = true;
        session.control.input_eos.store(true, Ordering::Release);
        session.wake_worker();
        Ok(())
    }

    fn pull_next(&mut self) -> Result<Option<FrameBuffer>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::InvalidState("pull from inactive pipeline".to_string()))?;
        if session.output_eos {
            return Ok(None);
        }

        match session.output.blocking_recv() {
            Some(StageOutput::Frame(frame)) => Ok(Some(frame)),
            Some(StageOutput::EndOfStream) => {
                session.output_eos = true;
                Ok(None)
            }
            None => Err(Error::PipelineRuntime(
                "flip stage stopped before end-of-stream".to_string(),
            )),
        }
    }
}

impl Drop for FlipPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.deactivate() {
            warn!("Pipeline teardown failed: {}", e);
        }
    }
}

/// State moved onto the stage worker thread
struct StageWorker {
    consumer: HeapCons<FrameBuffer>,
    output: mpsc::Sender<StageOutput>,
    control: Arc<StageControl>,
    bus: EventBus,
    signals: SignalSupport,
    params: StageParams,
}

impl StageWorker {
    fn run(mut self) {
        let mut need_data_raised = false;

        loop {
            if self.control.shutdown.load(Ordering::Acquire) {
                trace!("Flip stage shutting down");
                return;
            }

            // Load before popping: every push happens-before the EOS flag
            let eos = self.control.input_eos.load(Ordering::Acquire);
            match self.consumer.try_pop() {
                Some(mut frame) => {
                    self.control.queued.fetch_sub(1, Ordering::AcqRel);
                    need_data_raised = false;

                    if let Err(e) = flip_in_place(frame.data_mut(), &self.params.geometry, self.params.flip) {
                        self.bus.emit(PipelineEvent::Error {
                            stage: "flip".to_string(),
                            message: e.to_string(),
                        });
                        return;
                    }
                    if self.output.blocking_send(StageOutput::Frame(frame)).is_err() {
                        // Sink closed by deactivate
                        return;
                    }
                    if self.signals.sample_ready {
                        self.bus.emit(PipelineEvent::SampleReady);
                    }
                }
                None if eos => {
                    if self.output.blocking_send(StageOutput::EndOfStream).is_ok() {
                        self.bus.emit(PipelineEvent::EndOfStream);
                    }
                    return;
                }
                None => {
                    if !need_data_raised && self.signals.need_data {
                        self.bus.emit(PipelineEvent::NeedData {
                            free_slots: self.params.batch_capacity,
                        });
                        need_data_raised = true;
                    }
                    thread::park();
                }
            }
        }
    }
}
