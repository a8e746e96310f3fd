//! # ECU Telemetry Publisher
//!
//! Publishes `EngineState` snapshots and fault events to an MQTT-ish
//! broker for external loggers/dashboards. Out of scope per the core
//! spec — this binary documents the seam only.
//!
//! ```text
//! ecu_engine ──EngineState snapshot + fault events──► ecu_telemetry ──► broker
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ecu_telemetry")]
struct Args {
    /// Directory holding project.toml (unused by this stub beyond logging).
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();
    info!(config_dir = %args.config_dir.display(), "ECU Telemetry Publisher starting...");

    // Placeholder: in full implementation this would subscribe to
    // EngineState snapshots and fault events and publish them over MQTT.
    info!("Telemetry Publisher initialized — placeholder (not yet implemented)");
}
