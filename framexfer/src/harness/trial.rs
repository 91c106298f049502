//! One feed → drain → measure cycle
//!
//! The runner owns the pipeline, its event subscription, the feed controller
//! and the sink. Everything it needs comes in through the [`HarnessContext`],
//! so independent runners can coexist in one process.
//!
//! Timing covers pipeline activation, the feed sequence and the complete
//! drain. Batch construction happens before the start timestamp; deactivation
//! and reset happen after the end timestamp.

use super::feed::FeedController;
use super::sink::BufferSink;
use super::source::BufferSource;
use super::HarnessContext;
use crate::error::{Error, Result};
use crate::pipeline::{EventSubscription, Pipeline, PipelineEvent, SignalSupport};
use crate::stats::TrialResult;
use framexfer_common::DrainMode;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrialState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Wall-clock window of one completed trial
#[derive(Debug, Clone, Copy)]
pub struct TrialWindow {
    pub index: u32,
    pub started: Instant,
    pub finished: Instant,

    /// Pipeline deactivated and reset, ready for the next trial
    pub reset_completed: Instant,
}

pub struct TrialRunner<P: Pipeline> {
    context: HarnessContext,
    pipeline: P,
    events: EventSubscription,
    feed: FeedController,
    sink: BufferSink,
    state: TrialState,
    windows: Vec<TrialWindow>,
}

impl<P: Pipeline> TrialRunner<P> {
    /// Configure `pipeline` for the context and wire up the harness around it
    pub fn new(context: HarnessContext, mut pipeline: P) -> Result<Self> {
        pipeline.configure(&context.params)?;
        let events = pipeline.subscribe();

        let source = BufferSource::new(
            context.policy.clone(),
            context.params.geometry,
            context.settings.batch_size,
        )?;
        let feed = FeedController::new(source, context.settings.feed_mode());
        let sink = BufferSink::new(context.settings.batch_size, context.settings.verify_output);

        debug!(
            "Trial runner ready: {} backend, {} drain, {} feed",
            pipeline.name(),
            context.settings.drain_mode,
            context.settings.feed_mode()
        );
        Ok(Self {
            context,
            pipeline,
            events,
            feed,
            sink,
            state: TrialState::NotStarted,
            windows: Vec::new(),
        })
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    pub fn sink(&self) -> &BufferSink {
        &self.sink
    }

    /// Windows of every completed trial, in order
    pub fn windows(&self) -> &[TrialWindow] {
        &self.windows
    }

    /// Run trial `index` to completion
    ///
    /// Any error leaves the runner `Failed`; a failed runner refuses further
    /// trials.
    pub fn run(&mut self, index: u32) -> Result<TrialResult> {
        if self.state == TrialState::Failed {
            return Err(Error::InvalidState(
                "trial runner failed in an earlier trial".to_string(),
            ));
        }

        self.state = TrialState::Running;
        match self.execute(index) {
            Ok(result) => {
                self.state = TrialState::Completed;
                Ok(result)
            }
            Err(e) => {
                self.state = TrialState::Failed;
                error!("Trial {} failed: {}", index, e);
                if let Err(teardown) = self.pipeline.deactivate() {
                    warn!("Pipeline teardown after failed trial: {}", teardown);
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, index: u32) -> Result<TrialResult> {
        self.feed.reset();
        self.feed.arm()?;
        self.sink
            .begin_trial(self.feed.source().smoke_check(self.context.params.flip));

        let started = Instant::now();
        self.pipeline.activate()?;

        let signals = self.pipeline.signals();
        match self.context.settings.drain_mode {
            DrainMode::Notify => self.run_event_loop(signals)?,
            DrainMode::Blocking => {
                self.feed_directly()?;
                self.sink.drain_blocking(&mut self.pipeline)?;
            }
        }
        self.sink.finish()?;

        let finished = Instant::now();
        let elapsed_ms = u64::try_from(finished.duration_since(started).as_millis()).unwrap_or(u64::MAX);

        self.pipeline.deactivate()?;
        self.pipeline.reset()?;
        let stale = self.events.discard_pending();
        self.feed.reset();
        let reset_completed = Instant::now();

        trace!("Trial {} discarded {} stale events", index, stale);
        debug!("Trial {}: {} ms", index, elapsed_ms);
        self.windows.push(TrialWindow {
            index,
            started,
            finished,
            reset_completed,
        });
        Ok(TrialResult { index, elapsed_ms })
    }

    /// Wait on pipeline events until the batch has been fed and drained
    ///
    /// Backends without need-data are fed right after activation; backends
    /// without sample-ready are drained with blocking pulls once fed.
    fn run_event_loop(&mut self, signals: SignalSupport) -> Result<()> {
        if !signals.need_data {
            self.feed_directly()?;
        }

        let mut eos_seen = false;
        loop {
            let done = if signals.sample_ready {
                eos_seen
            } else {
                self.feed.state() == super::FeedState::EndOfStream
            };
            if done {
                break;
            }

            match self.events.wait()? {
                PipelineEvent::NeedData { free_slots } => {
                    trace!("need-data ({} free)", free_slots);
                    self.feed.on_need_data(&mut self.pipeline)?;
                }
                PipelineEvent::BufferFull => self.feed.on_buffer_full(),
                PipelineEvent::SampleReady => {
                    if signals.sample_ready {
                        self.sink.on_sample_ready(&mut self.pipeline)?;
                    }
                }
                PipelineEvent::EndOfStream => eos_seen = true,
                PipelineEvent::Error { stage, message } => {
                    return Err(Error::PipelineRuntime(format!("{}: {}", stage, message)));
                }
            }
        }

        if !signals.sample_ready {
            self.sink.drain_blocking(&mut self.pipeline)?;
        }
        Ok(())
    }

    /// Feed without waiting for need-data
    fn feed_directly(&mut self) -> Result<()> {
        while matches!(
            self.feed.state(),
            super::FeedState::Armed | super::FeedState::Draining
        ) {
            self.feed.on_need_data(&mut self.pipeline)?;
        }
        Ok(())
    }
}
