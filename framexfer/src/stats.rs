//! Latency statistics over a trial series
//!
//! **Purpose:** Aggregate per-trial latencies into mean, sample standard
//! deviation and maximum. A series is only summarised when every configured
//! trial completed; a single failed trial voids it.

use crate::error::{Error, Result};
use serde::Serialize;

/// Latency of one completed trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialResult {
    /// Zero-based trial index
    pub index: u32,

    /// Push-to-drain time in whole milliseconds
    pub elapsed_ms: u64,
}

/// Ordered results of a run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TrialSeries {
    results: Vec<TrialResult>,
}

impl TrialSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: TrialResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn elapsed_ms(&self) -> impl Iterator<Item = u64> + '_ {
        self.results.iter().map(|r| r.elapsed_ms)
    }
}

/// Summary printed at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStatistics {
    pub count: usize,
    pub mean_ms: f64,

    /// Sample standard deviation (divides by count − 1)
    pub std_dev_ms: f64,

    pub max_ms: u64,
}

/// Collects trial results for a fixed trial count
#[derive(Debug)]
pub struct StatisticsAccumulator {
    expected: usize,
    series: TrialSeries,
}

impl StatisticsAccumulator {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            series: TrialSeries::new(),
        }
    }

    pub fn into_series(self) -> TrialSeries {
        self.series
    }

    pub fn record(&mut self, result: TrialResult) -> Result<()> {
        if self.series.len() >= self.expected {
            return Err(Error::Consistency(format!(
                "trial {} exceeds the configured {} trials",
                result.index, self.expected
            )));
        }
        self.series.push(result);
        Ok(())
    }

    /// Compute the summary; refused unless exactly `expected` trials completed
    pub fn compute(&self) -> Result<LatencyStatistics> {
        let count = self.series.len();
        if count != self.expected {
            return Err(Error::Consistency(format!(
                "{} of {} trials completed",
                count, self.expected
            )));
        }
        if count < 2 {
            return Err(Error::Consistency(format!(
                "sample standard deviation needs at least 2 trials (have {})",
                count
            )));
        }

        let n = count as f64;
        let mean = self.series.elapsed_ms().map(|x| x as f64).sum::<f64>() / n;
        let squared: f64 = self
            .series
            .elapsed_ms()
            .map(|x| {
                let d = x as f64 - mean;
                d * d
            })
            .sum();
        let std_dev = (squared / (n - 1.0)).sqrt();
        let max = self.series.elapsed_ms().max().unwrap_or(0);

        Ok(LatencyStatistics {
            count,
            mean_ms: mean,
            std_dev_ms: std_dev,
            max_ms: max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulate(values: &[u64]) -> StatisticsAccumulator {
        let mut acc = StatisticsAccumulator::new(values.len());
        for (i, v) in values.iter().enumerate() {
            acc.record(TrialResult {
                index: i as u32,
                elapsed_ms: *v,
            })
            .unwrap();
        }
        acc
    }

    #[test]
    fn test_known_series() {
        let stats = accumulate(&[10, 20, 30]).compute().unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.mean_ms - 20.0).abs() < 1e-9);
        assert!((stats.std_dev_ms - 10.0).abs() < 1e-9);
        assert_eq!(stats.max_ms, 30);
    }

    #[test]
    fn test_constant_series_has_zero_deviation() {
        let stats = accumulate(&[7, 7, 7, 7]).compute().unwrap();
        assert_eq!(stats.mean_ms, 7.0);
        assert_eq!(stats.std_dev_ms, 0.0);
    }

    #[test]
    fn test_incomplete_series_refused() {
        let mut acc = StatisticsAccumulator::new(3);
        acc.record(TrialResult { index: 0, elapsed_ms: 1 }).unwrap();
        acc.record(TrialResult { index: 1, elapsed_ms: 2 }).unwrap();
        assert!(matches!(acc.compute(), Err(Error::Consistency(_))));
    }

    #[test]
    fn test_single_trial_refused() {
        let acc = accumulate(&[5]);
        assert!(acc.compute().is_err());
    }

    #[test]
    fn test_overflowing_series_rejected() {
        let mut acc = accumulate(&[1, 2]);
        let result = acc.record(TrialResult { index: 2, elapsed_ms: 3 });
        assert!(matches!(result, Err(Error::Consistency(_))));
    }
}
