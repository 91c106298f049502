//! framexfer - frame-buffer transport latency benchmark
//!
//! Runs a fixed number of strictly sequential trials against the in-process
//! flip pipeline and prints the latency summary to stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use framexfer::buffer::{SurfacePoolAllocator, UnifiedMemoryAllocator};
use framexfer::harness::{run_series, HarnessContext, SourcePolicy, TrialRunner};
use framexfer::pipeline::{FlipPipeline, Pipeline};
use framexfer::report::{BenchReport, CliFormatter, SettingsSummary};
use framexfer::system_info::SystemInfo;
use framexfer_common::config::resolve_config_path;
use framexfer_common::{BenchSettings, DrainMode, MemoryDomain};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for framexfer
#[derive(Parser, Debug)]
#[command(name = "framexfer")]
#[command(about = "Frame-buffer pipeline round-trip latency benchmark")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "FRAMEXFER_CONFIG")]
    config: Option<PathBuf>,

    /// Number of trials
    #[arg(short, long)]
    trials: Option<u32>,

    /// Buffers per trial
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Buffer memory: host, device-unified, device-pooled
    #[arg(short, long)]
    memory: Option<MemoryDomain>,

    /// Drain mode: notify or blocking
    #[arg(short, long)]
    drain: Option<DrainMode>,

    /// Feed in chunks of this many buffers instead of one burst
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Backend raises no need-data, buffer-full or sample-ready signals
    #[arg(long)]
    bulk_only: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<framexfer::Error>() {
                Some(err) => eprintln!("error: {}: {:#}", err.kind(), e),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config_path = resolve_config_path(args.config.as_deref())?;
    let mut settings = BenchSettings::load(config_path.as_deref())?;
    apply_overrides(&mut settings, &args);

    init_tracing(&settings.logging.level);
    info!(
        "framexfer {} ({}, built {}, {} profile)",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }

    settings.validate().context("Invalid benchmark settings")?;

    let policy = buffer_policy(&settings)?;
    let context = HarnessContext::new(settings.clone(), policy)?;
    let pipeline = if args.bulk_only {
        FlipPipeline::without_signals()
    } else {
        FlipPipeline::new()
    };

    let mut runner = TrialRunner::new(context, pipeline).context("Failed to configure pipeline")?;
    let outcome = run_series(&mut runner, settings.trials)?;
    debug!("Series complete: {:?}", outcome.statistics);

    let summary = SettingsSummary::new(&settings, runner.pipeline().name());
    let report = BenchReport::new(summary, SystemInfo::detect(), &outcome.series, outcome.statistics);

    if args.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!("{}", CliFormatter::format_report(&report, settings.report_max));
    }
    Ok(())
}

fn apply_overrides(settings: &mut BenchSettings, args: &Args) {
    if let Some(trials) = args.trials {
        settings.trials = trials;
    }
    if let Some(batch_size) = args.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(memory) = args.memory {
        settings.memory_domain = memory;
    }
    if let Some(drain) = args.drain {
        settings.drain_mode = drain;
    }
    if let Some(chunk_size) = args.chunk_size {
        settings.chunk_size = Some(chunk_size);
    }
}

/// RUST_LOG wins over the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("framexfer={level},framexfer_common={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn buffer_policy(settings: &BenchSettings) -> Result<SourcePolicy> {
    let policy = match settings.memory_domain {
        MemoryDomain::Host => SourcePolicy::Host,
        MemoryDomain::DeviceUnified => SourcePolicy::Device(Arc::new(UnifiedMemoryAllocator::new())),
        MemoryDomain::DevicePooled => {
            let frame_len = settings
                .geometry()
                .frame_len()
                .ok_or_else(|| anyhow!("frame size overflows: {}", settings.geometry()))?;
            SourcePolicy::Device(Arc::new(SurfacePoolAllocator::new(
                frame_len,
                settings.pool_capacity(),
            )))
        }
    };
    Ok(policy)
}
