//! Sequential trial series

use super::trial::TrialRunner;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::stats::{LatencyStatistics, StatisticsAccumulator, TrialSeries};
use tracing::{error, info};

/// Completed series and its summary
#[derive(Debug, Clone)]
pub struct SeriesOutcome {
    pub series: TrialSeries,
    pub statistics: LatencyStatistics,
}

/// Run `trials` trials back to back and summarise them
///
/// The first failing trial ends the run: its error is returned and the
/// partial series is dropped with the accumulator, so no statistics exist.
pub fn run_series<P: Pipeline>(runner: &mut TrialRunner<P>, trials: u32) -> Result<SeriesOutcome> {
    let mut accumulator = StatisticsAccumulator::new(trials as usize);
    let progress_step = (trials / 10).max(1);

    info!("Running {} trials on {} backend", trials, runner.pipeline().name());
    for index in 0..trials {
        match runner.run(index) {
            Ok(result) => accumulator.record(result)?,
            Err(e) => {
                error!(
                    "Run aborted at trial {} of {}, no statistics produced",
                    index + 1,
                    trials
                );
                return Err(e);
            }
        }
        if (index + 1) % progress_step == 0 {
            info!("Completed {}/{} trials", index + 1, trials);
        }
    }

    let statistics = accumulator.compute()?;
    Ok(SeriesOutcome {
        series: accumulator.into_series(),
        statistics,
    })
}
