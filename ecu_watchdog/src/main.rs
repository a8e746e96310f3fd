//! # ECU Watchdog
//!
//! Supervises the peripheral binaries that surround the core ECU loops:
//! telemetry, the web UI, the OTA updater, and the transmission daemon.
//! The core loops themselves (crank/cam decode, fuel/spark, ignition
//! scheduling) run in `ecu_engine` and are never restarted by this
//! process — a crash there is a safety event, not a supervision one.
//!
//! ```text
//! ecu_watchdog ──spawn/SIGTERM/SIGKILL──► ecu_telemetry
//!                                       ├─► ecu_webui
//!                                       ├─► ecu_updater
//!                                       └─► ecu_transmission
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ecu_watchdog::supervisor::{HealthStatus, ManagedProcess, ProcessSupervisor, Watchdog};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// ECU Watchdog - peripheral process supervisor
#[derive(Parser, Debug)]
#[command(name = "ecu_watchdog")]
#[command(author = "EVO-ECU")]
#[command(version)]
#[command(about = "Spawns and restarts the ECU's peripheral binaries")]
struct Args {
    /// Directory holding project.toml, sensors.toml, fault_rules.toml, tables/
    #[arg(short, long, default_value = "/etc/ecu")]
    config_dir: PathBuf,

    /// Directory the managed binaries are resolved relative to
    #[arg(long, default_value = ".")]
    bin_dir: PathBuf,

    /// Restart attempts allowed per module before giving up on it
    #[arg(long, default_value_t = 3)]
    max_restarts: u32,

    /// Health-check polling interval, ms
    #[arg(long, default_value_t = 1_000)]
    poll_interval_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("ECU Watchdog v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut supervisor = ProcessSupervisor::new(args.bin_dir.clone(), args.max_restarts);
    for module in ManagedProcess::ALL {
        if let Err(e) = supervisor.spawn_module(module, &args.config_dir) {
            error!(?module, "failed to spawn: {e}");
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        running_handler.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to install signal handler: {e}");
    }

    while running.load(Ordering::SeqCst) {
        for module in ManagedProcess::ALL {
            if let HealthStatus::Dead { exit_code } = supervisor.health_check(module) {
                warn!(?module, ?exit_code, "module exited, restarting");
                if let Err(e) = supervisor.restart_module(module) {
                    error!(?module, "restart failed: {e}");
                }
            }
        }
        std::thread::sleep(Duration::from_millis(args.poll_interval_ms));
    }

    info!("shutting down managed processes");
    if let Err(e) = supervisor.shutdown_all() {
        error!("shutdown error: {e}");
    }
    info!("ECU Watchdog shutdown complete");
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
