//! # bmon Gauge
//!
//! Coulomb-counting battery gauge daemon. Loads a TOML configuration,
//! builds one estimator per battery, performs optional RT setup, and
//! enters the fixed-cadence sampling loop until SIGINT (or a tick limit).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use bmon_common::config::load_config;
use bmon_gauge::runner::{GaugeRunner, rt_setup};
use bmon_gauge::sink::{JsonlSink, LogSink, TelemetrySink};

/// bmon Gauge — battery SoC and cycle monitor
#[derive(Parser, Debug)]
#[command(name = "bmon_gauge")]
#[command(version)]
#[command(about = "Coulomb-counting SoC and cycle gauge")]
struct Args {
    /// Path to the gauge configuration TOML.
    #[arg(default_value = "config/bmon.toml")]
    config: PathBuf,

    /// Override the configured sampling interval [ms].
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Stop after N ticks (default: run until SIGINT).
    #[arg(long, value_name = "N")]
    ticks: Option<u64>,

    /// Append JSON-lines telemetry to this file.
    #[arg(long, value_name = "PATH")]
    jsonl: Option<PathBuf>,

    /// CPU core to pin the sampling thread to (rt builds).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt builds).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("bmon Gauge v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("bmon Gauge shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&args.config)?;
    if let Some(interval_ms) = args.interval_ms {
        config.sample_interval_ms = interval_ms;
        config.validate()?;
    }

    info!(
        "Config OK: interval={}ms, publish_every={}, batteries={}",
        config.sample_interval_ms,
        config.publish_every,
        config.batteries.len(),
    );

    // RT setup (mlockall, affinity, scheduler). No-op in the default build.
    rt_setup(args.cpu_core, args.rt_priority)?;

    let mut sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(LogSink::new())];
    if let Some(path) = &args.jsonl {
        sinks.push(Box::new(JsonlSink::create(path)?));
        info!("JSONL telemetry -> {}", path.display());
    }

    let mut runner = GaugeRunner::new(&config, sinks)?;
    info!(
        "GaugeRunner initialized ({} batteries), entering sampling loop",
        runner.battery_count()
    );

    // Graceful shutdown on SIGINT.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    runner.run(&running, args.ticks)?;

    let stats = runner.stats();
    info!(
        ticks = stats.tick_count,
        rejected = stats.rejected_samples,
        overruns = stats.overruns,
        avg_tick_us = stats.avg_tick_ns() / 1000,
        "sampling loop stopped"
    );

    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
