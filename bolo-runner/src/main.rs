use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bolo_config::{Config, ConfigLoader};
use clap::Parser;
use log::{error, info};

mod scenario;

use scenario::Scenario;

/// Ticks between progress lines in the log.
const REPORT_EVERY: u64 = 100;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many ticks, overriding the configuration
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    match &args.config {
        Some(path) => {
            let config = ConfigLoader::load(path)?;
            info!("Using configuration from {}", path.display());
            Ok(config)
        }
        None => {
            let config = Config::default();
            ConfigLoader::validate(&config)?;
            info!("No configuration file given, using defaults");
            Ok(config)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.as_str())).init();

    let config = load_config(&args)?;
    let mut scenario = Scenario::from_config(&config)?;

    let frame_duration = Duration::from_secs_f64(1.0 / config.simulation.tick_rate as f64);
    let limit = args.ticks.or(config.simulation.max_ticks);
    match limit {
        Some(ticks) => info!("Running {} ticks at {} ticks per second", ticks, config.simulation.tick_rate),
        None => info!("Running at {} ticks per second until interrupted", config.simulation.tick_rate),
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    let started = Instant::now();
    let mut bytes_in_window = 0usize;
    let mut messages_in_window = 0usize;
    loop {
        let frame_start = Instant::now();

        let report = match scenario.step() {
            Ok(report) => report,
            Err(e) => {
                error!("Simulation stopped: {}", e);
                scenario.finish()?;
                return Err(e.into());
            }
        };
        bytes_in_window += report.packet_len;
        messages_in_window += report.messages;

        if report.tick % REPORT_EVERY == 0 {
            info!(
                "tick {}: {} entities, {} players, {} messages in {} bytes over the last {} ticks",
                report.tick, report.entities, report.players, messages_in_window, bytes_in_window, REPORT_EVERY
            );
            bytes_in_window = 0;
            messages_in_window = 0;
        }

        if limit.is_some_and(|ticks| report.tick >= ticks) {
            break;
        }
        if !running.load(Ordering::SeqCst) {
            info!("Interrupted at tick {}", report.tick);
            break;
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_duration {
            spin_sleep::sleep(frame_duration - elapsed);
        }
    }

    scenario.finish()?;
    info!(
        "Finished {} ticks in {:.2?}, mirror holds {} entities, {} bytes sent",
        scenario.authority().tick_count(),
        started.elapsed(),
        scenario.mirror().len(),
        scenario.controller().bytes_sent()
    );
    Ok(())
}
