//! Backpressure-driven feed state machine
//!
//! ```text
//! Idle ──arm──► Armed ──need-data──► Feeding ──► EndOfStream
//!                 ▲                     │
//!                 └────buffer-full──────┤ (chunked: more to send)
//!                                       ▼
//!                                   Draining ──need-data──► Feeding
//!
//! any failed push ──► Faulted
//! ```
//!
//! Feeding runs synchronously inside the need-data handler. In single-burst
//! mode the first need-data pushes the whole batch and signals end-of-stream
//! straight away; every later need-data is ignored. Chunked mode pushes one
//! chunk per need-data and signals end-of-stream after the last one.

use super::source::BufferSource;
use crate::buffer::BufferBatch;
use crate::error::{Error, Result};
use crate::pipeline::{FlowStatus, Pipeline};
use framexfer_common::FeedMode;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedState {
    Idle,
    Armed,
    Feeding,
    Draining,
    EndOfStream,
    Faulted,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct FeedController {
    state: FeedState,
    mode: FeedMode,
    source: BufferSource,

    /// Buffers built for this trial and not yet handed over
    pending: BufferBatch,

    pushes: usize,
    pushed_buffers: usize,
}

impl FeedController {
    pub fn new(source: BufferSource, mode: FeedMode) -> Self {
        Self {
            state: FeedState::Idle,
            mode,
            source,
            pending: BufferBatch::default(),
            pushes: 0,
            pushed_buffers: 0,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn source(&self) -> &BufferSource {
        &self.source
    }

    /// Bulk pushes issued this trial
    pub fn pushes(&self) -> usize {
        self.pushes
    }

    /// Buffers handed to the pipeline this trial
    pub fn pushed_buffers(&self) -> usize {
        self.pushed_buffers
    }

    /// Buffers built but not yet handed over
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Build this trial's batch (Idle → Armed)
    pub fn arm(&mut self) -> Result<()> {
        if self.state != FeedState::Idle {
            return Err(Error::InvalidState(format!(
                "feed controller cannot arm from {}",
                self.state
            )));
        }
        match self.source.build_batch() {
            Ok(batch) => {
                self.pending = batch;
                self.state = FeedState::Armed;
                debug!("Feed armed with {} buffers ({})", self.pending.len(), self.mode);
                Ok(())
            }
            Err(e) => {
                self.state = FeedState::Faulted;
                Err(e)
            }
        }
    }

    /// Handle the pipeline's need-data signal
    pub fn on_need_data(&mut self, pipeline: &mut dyn Pipeline) -> Result<()> {
        match self.state {
            FeedState::Armed | FeedState::Draining => {}
            FeedState::Feeding | FeedState::EndOfStream => {
                trace!("need-data ignored in {}", self.state);
                return Ok(());
            }
            FeedState::Idle | FeedState::Faulted => {
                warn!("need-data ignored in {}", self.state);
                return Ok(());
            }
        }

        self.state = FeedState::Feeding;
        match self.mode {
            FeedMode::SingleBurst => {
                let batch = std::mem::take(&mut self.pending);
                self.push(pipeline, batch)?;
                self.signal_end_of_stream(pipeline)
            }
            FeedMode::Chunked { chunk_size } => {
                let chunk = self.pending.split_front(chunk_size);
                let status = self.push(pipeline, chunk)?;
                if self.pending.is_empty() {
                    self.signal_end_of_stream(pipeline)
                } else if status.queue_full {
                    self.on_buffer_full();
                    Ok(())
                } else {
                    self.state = FeedState::Draining;
                    Ok(())
                }
            }
        }
    }

    /// Handle the pipeline's buffer-full signal
    pub fn on_buffer_full(&mut self) {
        if self.state == FeedState::Feeding {
            debug!("Buffer full, pausing feed with {} buffers pending", self.pending.len());
            self.state = FeedState::Armed;
        } else {
            trace!("buffer-full ignored in {}", self.state);
        }
    }

    /// Drop anything left of the trial and return to Idle
    pub fn reset(&mut self) {
        if !self.pending.is_empty() {
            debug!("Feed reset releases {} unsent buffers", self.pending.len());
        }
        self.pending = BufferBatch::default();
        self.pushes = 0;
        self.pushed_buffers = 0;
        self.state = FeedState::Idle;
    }

    fn push(&mut self, pipeline: &mut dyn Pipeline, batch: BufferBatch) -> Result<FlowStatus> {
        let count = batch.len();
        match pipeline.push(batch) {
            Ok(status) if status.accepted == count => {
                self.pushes += 1;
                self.pushed_buffers += count;
                trace!("Pushed {} buffers to {}", count, pipeline.name());
                Ok(status)
            }
            Ok(status) => {
                self.state = FeedState::Faulted;
                Err(Error::Push(format!(
                    "{} accepted {} of {} buffers",
                    pipeline.name(),
                    status.accepted,
                    count
                )))
            }
            Err(e) => {
                self.state = FeedState::Faulted;
                error!("Push of {} buffers failed: {}", count, e);
                Err(e)
            }
        }
    }

    fn signal_end_of_stream(&mut self, pipeline: &mut dyn Pipeline) -> Result<()> {
        if let Err(e) = pipeline.end_of_stream() {
            self.state = FeedState::Faulted;
            return Err(e);
        }
        self.state = FeedState::EndOfStream;
        trace!("End-of-stream signalled after {} pushes", self.pushes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBuffer;
    use crate::harness::source::SourcePolicy;
    use crate::pipeline::{EventBus, EventSubscription, SignalSupport, StageParams};
    use framexfer_common::{FrameGeometry, PixelFormat};

    /// Records pushes; optionally reports a full queue or refuses pushes
    #[derive(Default)]
    struct Recorder {
        pushes: Vec<usize>,
        eos_calls: usize,
        report_full: bool,
        refuse: bool,
    }

    impl Pipeline for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn configure(&mut self, _params: &StageParams) -> Result<()> {
            Ok(())
        }
        fn signals(&self) -> SignalSupport {
            SignalSupport::all()
        }
        fn subscribe(&mut self) -> EventSubscription {
            EventBus::new().subscribe()
        }
        fn activate(&mut self) -> Result<()> {
            Ok(())
        }
        fn deactivate(&mut self) -> Result<()> {
            Ok(())
        }
        fn reset(&mut self) -> Result<()> {
            Ok(())
        }
        fn push(&mut self, batch: BufferBatch) -> Result<FlowStatus> {
            if self.refuse {
                return Err(Error::Push("flushing".to_string()));
            }
            self.pushes.push(batch.len());
            Ok(FlowStatus {
                accepted: batch.len(),
                queue_full: self.report_full,
            })
        }
        fn end_of_stream(&mut self) -> Result<()> {
            self.eos_calls += 1;
            Ok(())
        }
        fn pull_next(&mut self) -> Result<Option<FrameBuffer>> {
            Ok(None)
        }
    }

    fn controller(batch: usize, mode: FeedMode) -> FeedController {
        let geometry = FrameGeometry::new(2, 2, PixelFormat::Gray8);
        let source = BufferSource::new(SourcePolicy::Host, geometry, batch).unwrap();
        FeedController::new(source, mode)
    }

    #[test]
    fn test_arm_builds_batch_without_pushing() {
        let mut feed = controller(4, FeedMode::SingleBurst);
        assert_eq!(feed.state(), FeedState::Idle);

        feed.arm().unwrap();
        assert_eq!(feed.state(), FeedState::Armed);
        assert_eq!(feed.pending(), 4);
        assert_eq!(feed.pushes(), 0);

        assert!(matches!(feed.arm(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_single_burst_pushes_once_then_eos() {
        let mut pipeline = Recorder::default();
        let mut feed = controller(4, FeedMode::SingleBurst);
        feed.arm().unwrap();

        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(feed.state(), FeedState::EndOfStream);
        assert_eq!(pipeline.pushes, vec![4]);
        assert_eq!(pipeline.eos_calls, 1);

        // Later need-data is a no-op
        feed.on_need_data(&mut pipeline).unwrap();
        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(pipeline.pushes, vec![4]);
        assert_eq!(pipeline.eos_calls, 1);
        assert_eq!(feed.pushes(), 1);
    }

    #[test]
    fn test_need_data_before_arm_is_ignored() {
        let mut pipeline = Recorder::default();
        let mut feed = controller(2, FeedMode::SingleBurst);

        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(feed.state(), FeedState::Idle);
        assert!(pipeline.pushes.is_empty());
    }

    #[test]
    fn test_failed_push_faults() {
        let mut pipeline = Recorder {
            refuse: true,
            ..Recorder::default()
        };
        let mut feed = controller(2, FeedMode::SingleBurst);
        feed.arm().unwrap();

        let err = feed.on_need_data(&mut pipeline).unwrap_err();
        assert!(matches!(err, Error::Push(_)));
        assert_eq!(feed.state(), FeedState::Faulted);
        assert_eq!(pipeline.eos_calls, 0);

        // No retry on the next signal
        pipeline.refuse = false;
        feed.on_need_data(&mut pipeline).unwrap();
        assert!(pipeline.pushes.is_empty());
    }

    #[test]
    fn test_chunked_feed_pushes_per_need_data() {
        let mut pipeline = Recorder::default();
        let mut feed = controller(5, FeedMode::Chunked { chunk_size: 2 });
        feed.arm().unwrap();

        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(feed.state(), FeedState::Draining);
        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(feed.state(), FeedState::Draining);
        feed.on_need_data(&mut pipeline).unwrap();

        assert_eq!(feed.state(), FeedState::EndOfStream);
        assert_eq!(pipeline.pushes, vec![2, 2, 1]);
        assert_eq!(pipeline.eos_calls, 1);
        assert_eq!(feed.pushed_buffers(), 5);
    }

    #[test]
    fn test_chunked_feed_pauses_on_full_queue() {
        let mut pipeline = Recorder {
            report_full: true,
            ..Recorder::default()
        };
        let mut feed = controller(4, FeedMode::Chunked { chunk_size: 3 });
        feed.arm().unwrap();

        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(feed.state(), FeedState::Armed);
        assert_eq!(feed.pending(), 1);

        feed.on_need_data(&mut pipeline).unwrap();
        assert_eq!(feed.state(), FeedState::EndOfStream);
    }

    #[test]
    fn test_buffer_full_outside_feeding_is_ignored() {
        let mut feed = controller(2, FeedMode::SingleBurst);
        feed.on_buffer_full();
        assert_eq!(feed.state(), FeedState::Idle);
        feed.arm().unwrap();
        feed.on_buffer_full();
        assert_eq!(feed.state(), FeedState::Armed);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut pipeline = Recorder::default();
        let mut feed = controller(2, FeedMode::SingleBurst);
        feed.arm().unwrap();
        feed.on_need_data(&mut pipeline).unwrap();

        feed.reset();
        assert_eq!(feed.state(), FeedState::Idle);
        assert_eq!(feed.pushes(), 0);
        feed.arm().unwrap();
    }
}
