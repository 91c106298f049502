//! Report generation and formatting
//!
//! **Purpose:** Assemble the end-of-run report and render it either as the
//! plain text summary or as JSON. Reports go to stdout only; nothing is
//! persisted.

use crate::stats::{LatencyStatistics, TrialResult, TrialSeries};
use crate::system_info::SystemInfo;
use framexfer_common::BenchSettings;
use serde::Serialize;
use uuid::Uuid;

/// Complete benchmark run report
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub run_id: Uuid,

    /// Report creation time (RFC 3339)
    pub timestamp: String,

    pub version: String,

    pub system_info: SystemInfo,

    pub settings: SettingsSummary,

    pub trials: Vec<TrialResult>,

    pub statistics: LatencyStatistics,
}

/// Settings that shaped the run
#[derive(Debug, Clone, Serialize)]
pub struct SettingsSummary {
    pub backend: String,
    pub trials: u32,
    pub batch_size: usize,
    pub geometry: String,
    pub memory_domain: String,
    pub drain_mode: String,
    pub feed_mode: String,
    pub flip_method: String,
}

impl SettingsSummary {
    pub fn new(settings: &BenchSettings, backend: &str) -> Self {
        Self {
            backend: backend.to_string(),
            trials: settings.trials,
            batch_size: settings.batch_size,
            geometry: settings.geometry().to_string(),
            memory_domain: settings.memory_domain.to_string(),
            drain_mode: settings.drain_mode.to_string(),
            feed_mode: settings.feed_mode().to_string(),
            flip_method: settings.flip_method.to_string(),
        }
    }
}

impl BenchReport {
    pub fn new(
        settings: SettingsSummary,
        system_info: SystemInfo,
        series: &TrialSeries,
        statistics: LatencyStatistics,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            system_info,
            settings,
            trials: series.results().to_vec(),
            statistics,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Plain text rendering
pub struct CliFormatter;

impl CliFormatter {
    /// Format system information
    pub fn format_system_info(info: &SystemInfo) -> String {
        format!("System: {}, {}, {} cores", info.cpu, info.os, info.logical_cores)
    }

    /// One-line description of the run
    ///
    /// Example: `30 x 1920x1080 rgba buffers, host memory, single-burst feed, notify drain`
    pub fn format_run(settings: &SettingsSummary) -> String {
        format!(
            "{} x {} buffers, {} memory, {} feed, {} drain, {} ({} backend)",
            settings.batch_size,
            settings.geometry,
            settings.memory_domain,
            settings.feed_mode,
            settings.drain_mode,
            settings.flip_method,
            settings.backend
        )
    }

    /// The result lines
    ///
    /// ```text
    /// Mean: 12.5 ms
    /// Standard Deviation: 0.7071067811865476 ms
    /// Max: 13 ms
    /// ```
    pub fn format_statistics(stats: &LatencyStatistics, report_max: bool) -> String {
        let mut output = String::new();
        output.push_str(&format!("Mean: {} ms\n", stats.mean_ms));
        output.push_str(&format!("Standard Deviation: {} ms\n", stats.std_dev_ms));
        if report_max {
            output.push_str(&format!("Max: {} ms\n", stats.max_ms));
        }
        output
    }

    /// Header plus result lines
    pub fn format_report(report: &BenchReport, report_max: bool) -> String {
        let mut output = String::new();
        output.push_str(&Self::format_system_info(&report.system_info));
        output.push('\n');
        output.push_str(&Self::format_run(&report.settings));
        output.push('\n');
        output.push_str(&format!("Trials: {}\n", report.statistics.count));
        output.push_str(&Self::format_statistics(&report.statistics, report_max));
        output
    }
}
