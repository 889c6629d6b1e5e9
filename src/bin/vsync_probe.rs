//! Runs the vsync emulator for a while and reports how well it kept time

use anyhow::{anyhow, Result};
use clap::Parser;
use hwc_vsync::timing::period_from_refresh_hz;
use hwc_vsync::{Clock, MonotonicClock, Nsecs, VsyncConfig, VsyncEmulator};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "vsync_probe")]
#[command(about = "Measure the emulated hwcomposer vsync", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to keep vsync enabled, in seconds
    #[arg(short, long, default_value_t = 3.0)]
    duration: f64,

    /// Override the refresh rate
    #[arg(long)]
    refresh_hz: Option<f64>,

    /// Override the startup delay
    #[arg(long)]
    startup_delay_ms: Option<u64>,

    /// Toggle vsync off and on again halfway through
    #[arg(long)]
    toggle: bool,

    /// Enable verbose debug output
    #[arg(long)]
    debug: bool,
}

/// (tick timestamp, time the callback actually ran)
type Sample = (Nsecs, Nsecs);

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => VsyncConfig::load(path)?,
        None => VsyncConfig::default(),
    };
    config.apply_env()?;
    if let Some(hz) = args.refresh_hz {
        config.period_ns = period_from_refresh_hz(hz)
            .ok_or_else(|| anyhow!("bad refresh rate {}", hz))?;
    }
    if let Some(ms) = args.startup_delay_ms {
        config.startup_delay_ms = ms;
    }
    config.priority = None;

    let period = config.period_ns;
    let delay = config.startup_delay();
    info!(?config, "starting probe");

    let clock = MonotonicClock::new();
    let (tx, rx) = mpsc::channel::<Sample>();
    let tx = Mutex::new(tx);

    let mut vsync = VsyncEmulator::new(config)?;
    vsync.register_callback(move |ts| {
        let _ = tx
            .lock()
            .map(|tx| tx.send((ts, MonotonicClock::new().now())));
    })?;
    vsync.start()?;
    vsync.set_enabled(true);

    let run = Duration::from_secs_f64(args.duration.max(0.0));
    if args.toggle {
        thread::sleep(delay + run / 2);
        vsync.set_enabled(false);
        println!("vsync disabled for 200ms");
        thread::sleep(Duration::from_millis(200));
        vsync.set_enabled(true);
        thread::sleep(run / 2);
    } else {
        thread::sleep(delay + run);
    }
    vsync.set_enabled(false);
    let stopped_at = clock.now();
    vsync.shutdown()?;

    let samples: Vec<Sample> = rx.try_iter().collect();
    report(&samples, period, stopped_at);
    Ok(())
}

fn report(samples: &[Sample], period: Nsecs, stopped_at: Nsecs) {
    println!("=== vsync probe ===");
    println!("period: {}ns ({:.2}Hz)", period, 1e9 / period as f64);
    println!("ticks: {}", samples.len());
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        println!("no ticks delivered");
        return;
    };

    let span = stopped_at - first.0;
    println!("expected over {:.3}s: ~{}", span as f64 / 1e9, span / period + 1);

    let mut skipped = 0;
    let mut off_grid = 0;
    for pair in samples.windows(2) {
        let delta = pair[1].0 - pair[0].0;
        if delta % period != 0 {
            off_grid += 1;
        } else if delta > period {
            skipped += delta / period - 1;
        }
    }
    println!("skipped ticks: {}", skipped);
    println!("re-anchored intervals: {}", off_grid);

    let mut latency: Vec<Nsecs> = samples.iter().map(|(ts, ran)| ran - ts).collect();
    latency.sort_unstable();
    let pct = |p: usize| latency[(latency.len() - 1) * p / 100];
    println!(
        "callback latency: p50 {:.3}ms  p99 {:.3}ms  max {:.3}ms",
        pct(50) as f64 / 1e6,
        pct(99) as f64 / 1e6,
        pct(100) as f64 / 1e6
    );
    println!("last tick: {}", last.0);
}
