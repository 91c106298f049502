//! Completion drain
//!
//! The sink takes ownership of exactly one batch's worth of transformed
//! buffers per trial, either one per sample-ready signal or through N blocking
//! pulls. Each buffer is released as soon as it has been consumed.

use super::source::SmokeCheck;
use crate::buffer::FrameBuffer;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use tracing::{debug, trace};

pub struct BufferSink {
    expected: usize,
    received: usize,
    verify_output: bool,
    smoke: Option<SmokeCheck>,
    smoke_verified: bool,
    scratch: Vec<u8>,
}

impl BufferSink {
    /// Sink for batches of `expected` buffers
    ///
    /// With `verify_output` every frame is copied out before release and the
    /// marked frame is smoke-checked.
    pub fn new(expected: usize, verify_output: bool) -> Self {
        Self {
            expected,
            received: 0,
            verify_output,
            smoke: None,
            smoke_verified: false,
            scratch: Vec::new(),
        }
    }

    /// Reset the count for a new trial
    pub fn begin_trial(&mut self, smoke: Option<SmokeCheck>) {
        self.received = 0;
        self.smoke = smoke;
        self.smoke_verified = false;
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// Whether this trial's marked frame passed its smoke check
    pub fn smoke_verified(&self) -> bool {
        self.smoke_verified
    }

    /// Pull the one buffer announced by a sample-ready signal
    pub fn on_sample_ready(&mut self, pipeline: &mut dyn Pipeline) -> Result<()> {
        match pipeline.pull_next()? {
            Some(frame) => self.consume(frame),
            None => Err(Error::Consistency(format!(
                "sample-ready signalled after end-of-stream ({} of {} received)",
                self.received, self.expected
            ))),
        }
    }

    /// Pull until the batch is complete, blocking on each buffer
    pub fn drain_blocking(&mut self, pipeline: &mut dyn Pipeline) -> Result<()> {
        while self.received < self.expected {
            match pipeline.pull_next()? {
                Some(frame) => self.consume(frame)?,
                None => {
                    return Err(Error::Consistency(format!(
                        "pull after end-of-stream with nothing pending ({} of {} received)",
                        self.received, self.expected
                    )))
                }
            }
        }
        Ok(())
    }

    /// Confirm exactly one batch arrived
    pub fn finish(&self) -> Result<()> {
        if self.received != self.expected {
            return Err(Error::Consistency(format!(
                "sink received {} of {} buffers",
                self.received, self.expected
            )));
        }
        debug!("Sink drained {} buffers", self.received);
        Ok(())
    }

    fn consume(&mut self, frame: FrameBuffer) -> Result<()> {
        if self.received >= self.expected {
            return Err(Error::Consistency(format!(
                "sink received buffer {} beyond the expected {}",
                frame.id(),
                self.expected
            )));
        }

        if self.verify_output {
            self.scratch.clear();
            self.scratch.extend_from_slice(frame.data());

            if let Some(check) = &self.smoke {
                if check.buffer_id == frame.id() {
                    if !check.matches(&self.scratch) {
                        return Err(Error::Consistency(format!(
                            "buffer {} does not carry the transformed smoke pattern",
                            frame.id()
                        )));
                    }
                    self.smoke_verified = true;
                }
            }
        }

        self.received += 1;
        trace!("Sink consumed buffer {} ({}/{})", frame.id(), self.received, self.expected);
        Ok(())
    }
}
