//! Synchronous pipeline double
//!
//! Every signal is raised on the caller's thread while the call is still in
//! progress, so the trial event loop sees them in a fixed order:
//! need-data on activate, one sample-ready per pushed buffer, buffer-full
//! when a push fills the queue, then end-of-stream (or an error).
//!
//! At hand-off every buffer's write generation is recorded; at pull time it
//! is compared again. Any difference means someone wrote to the buffer while
//! the pipeline owned it.

use framexfer::buffer::{BufferBatch, FrameBuffer};
use framexfer::pipeline::{
    EventBus, EventSubscription, FlowStatus, Pipeline, PipelineEvent, SignalSupport, StageParams,
};
use framexfer::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Injected failures, keyed by zero-based trial (activation) index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the push
    PushOnTrial(usize),

    /// Raise a stage error instead of end-of-stream
    RuntimeErrorOnTrial(usize),

    /// Accept the push but lose its last buffer
    DropBufferOnTrial(usize),

    /// Take a mutable view of the push's first buffer after accepting it
    WriteInFlightOnTrial(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Activate,
    Deactivate,
    Reset,
}

/// Everything the double observed
#[derive(Debug, Default)]
pub struct ScriptLog {
    pub steps: Vec<(LifecycleStep, Instant)>,

    /// (trial, buffers) per accepted push
    pub pushes: Vec<(usize, usize)>,

    /// Buffer ids handed to the sink, in order
    pub delivered: Vec<u64>,

    /// Buffer ids written to while owned by the pipeline
    pub fence_violations: Vec<u64>,

    pub eos_calls: usize,
}

impl ScriptLog {
    pub fn activations(&self) -> usize {
        self.steps
            .iter()
            .filter(|(step, _)| *step == LifecycleStep::Activate)
            .count()
    }

    pub fn pushes_in_trial(&self, trial: usize) -> Vec<usize> {
        self.pushes
            .iter()
            .filter(|(t, _)| *t == trial)
            .map(|(_, count)| *count)
            .collect()
    }
}

pub struct ScriptedPipeline {
    bus: EventBus,
    signals: SignalSupport,
    capacity: usize,
    fault: Option<Fault>,
    extra_need_data: usize,

    active: bool,
    trial: usize,
    activations: usize,
    in_flight: VecDeque<FrameBuffer>,
    fence: HashMap<u64, u64>,
    input_eos: bool,
    stage_failed: bool,

    log: ScriptLog,
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            signals: SignalSupport::all(),
            capacity: 0,
            fault: None,
            extra_need_data: 0,
            active: false,
            trial: 0,
            activations: 0,
            in_flight: VecDeque::new(),
            fence: HashMap::new(),
            input_eos: false,
            stage_failed: false,
            log: ScriptLog::default(),
        }
    }

    pub fn with_signals(mut self, signals: SignalSupport) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Raise this many redundant need-data signals on activate and after each push
    pub fn with_extra_need_data(mut self, count: usize) -> Self {
        self.extra_need_data = count;
        self
    }

    pub fn log(&self) -> &ScriptLog {
        &self.log
    }

    fn fault_now(&self, fault: fn(usize) -> Fault) -> bool {
        self.fault == Some(fault(self.trial))
    }

    fn raise_need_data(&self, times: usize) {
        if self.signals.need_data {
            for _ in 0..times {
                self.bus.emit(PipelineEvent::NeedData {
                    free_slots: self.capacity.saturating_sub(self.in_flight.len()),
                });
            }
        }
    }
}

impl Default for ScriptedPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for ScriptedPipeline {
    fn name(&self) -> &str {
        "scripted"
    }

    fn configure(&mut self, params: &StageParams) -> Result<()> {
        if params.batch_capacity == 0 {
            return Err(Error::Configuration("zero capacity".to_string()));
        }
        self.capacity = params.batch_capacity;
        Ok(())
    }

    fn signals(&self) -> SignalSupport {
        self.signals
    }

    fn subscribe(&mut self) -> EventSubscription {
        self.bus.subscribe()
    }

    fn activate(&mut self) -> Result<()> {
        if self.active {
            return Err(Error::InvalidState("already active".to_string()));
        }
        self.active = true;
        self.trial = self.activations;
        self.activations += 1;
        self.input_eos = false;
        self.stage_failed = false;
        self.fence.clear();
        self.log.steps.push((LifecycleStep::Activate, Instant::now()));

        self.raise_need_data(1 + self.extra_need_data);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.active = false;
        self.in_flight.clear();
        self.log.steps.push((LifecycleStep::Deactivate, Instant::now()));
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.in_flight.clear();
        self.input_eos = false;
        self.stage_failed = false;
        self.log.steps.push((LifecycleStep::Reset, Instant::now()));
        Ok(())
    }

    fn push(&mut self, batch: BufferBatch) -> Result<FlowStatus> {
        if !self.active {
            return Err(Error::Push("flushing".to_string()));
        }
        if self.input_eos {
            return Err(Error::Push("eos".to_string()));
        }
        if self.fault_now(Fault::PushOnTrial) {
            return Err(Error::Push(format!("injected push failure in trial {}", self.trial)));
        }

        let count = batch.len();
        self.log.pushes.push((self.trial, count));
        let first = self.in_flight.len();
        for frame in batch {
            self.fence.insert(frame.id(), frame.write_generation());
            self.in_flight.push_back(frame);
        }
        if self.fault_now(Fault::WriteInFlightOnTrial) {
            if let Some(frame) = self.in_flight.get_mut(first) {
                let _ = frame.data_mut();
            }
        }
        let mut ready = count;
        if self.fault_now(Fault::DropBufferOnTrial) && self.in_flight.pop_back().is_some() {
            ready -= 1;
        }

        if self.signals.sample_ready {
            for _ in 0..ready {
                self.bus.emit(PipelineEvent::SampleReady);
            }
        }
        let queue_full = self.in_flight.len() >= self.capacity;
        if queue_full && self.signals.buffer_full {
            self.bus.emit(PipelineEvent::BufferFull);
        }
        self.raise_need_data(self.extra_need_data);

        Ok(FlowStatus {
            accepted: count,
            queue_full,
        })
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if !self.active {
            return Err(Error::Push("flushing".to_string()));
        }
        self.input_eos = true;
        self.log.eos_calls += 1;

        if self.fault_now(Fault::RuntimeErrorOnTrial) {
            self.stage_failed = true;
            self.bus.emit(PipelineEvent::Error {
                stage: "scripted".to_string(),
                message: "injected stage fault".to_string(),
            });
        } else {
            self.bus.emit(PipelineEvent::EndOfStream);
        }
        Ok(())
    }

    fn pull_next(&mut self) -> Result<Option<FrameBuffer>> {
        if self.stage_failed {
            return Err(Error::PipelineRuntime("injected stage fault".to_string()));
        }
        match self.in_flight.pop_front() {
            Some(frame) => {
                if self.fence.get(&frame.id()) != Some(&frame.write_generation()) {
                    self.log.fence_violations.push(frame.id());
                }
                self.log.delivered.push(frame.id());
                Ok(Some(frame))
            }
            None if self.input_eos => Ok(None),
            // A real backend would block here forever
            None => Err(Error::PipelineRuntime(
                "nothing in flight and no end-of-stream".to_string(),
            )),
        }
    }
}
