//! Benchmark harness
//!
//! - [`BufferSource`] builds each trial's batch
//! - [`FeedController`] hands it to the pipeline under backpressure
//! - [`BufferSink`] drains exactly one batch back out
//! - [`TrialRunner`] times one feed → drain cycle
//! - [`run_series`] repeats trials strictly one after another
//!
//! There is no process-wide state: a [`HarnessContext`] carries the settings
//! and buffer policy into each runner.

pub mod feed;
pub mod series;
pub mod sink;
pub mod source;
pub mod trial;

pub use feed::{FeedController, FeedState};
pub use series::{run_series, SeriesOutcome};
pub use sink::BufferSink;
pub use source::{BufferSource, SmokeCheck, SourcePolicy, SMOKE_MARKER};
pub use trial::{TrialRunner, TrialState, TrialWindow};

use crate::error::{Error, Result};
use crate::pipeline::StageParams;
use framexfer_common::BenchSettings;
use tracing::debug;

/// Everything a trial runner needs, passed in explicitly
#[derive(Debug, Clone)]
pub struct HarnessContext {
    pub settings: BenchSettings,
    pub params: StageParams,
    pub policy: SourcePolicy,
}

impl HarnessContext {
    /// Validate `settings` and pair them with a buffer policy
    pub fn new(settings: BenchSettings, policy: SourcePolicy) -> Result<Self> {
        settings.validate()?;
        if policy.domain() != settings.memory_domain {
            return Err(Error::Configuration(format!(
                "buffer policy provides {} memory, settings ask for {}",
                policy.domain(),
                settings.memory_domain
            )));
        }
        if settings.verify_output && settings.memory_domain.is_device() {
            debug!("Device buffers carry no smoke pattern, verification only copies");
        }
        let params = StageParams::from_settings(&settings);
        Ok(Self {
            settings,
            params,
            policy,
        })
    }
}
