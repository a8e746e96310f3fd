//! # ECU Web UI / Tune API
//!
//! Exposes an HTTP API for reading live `EngineState` and mutating
//! `TuneTable` cells/axes — the config-UI collaborator left out of scope
//! for the core. This binary documents the seam only.
//!
//! ```text
//! Tuner laptop ──HTTP──► ecu_webui ──set_cell/set_axis──► ecu_engine's TuneTable
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ecu_webui")]
struct Args {
    /// Directory holding the tables/ this UI would mutate.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// HTTP listen port.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();
    info!(config_dir = %args.config_dir.display(), port = args.port, "ECU Web UI starting...");

    // Placeholder: in full implementation this would start an HTTP server
    // (e.g. axum) with routes for live state, fault history, and
    // set_cell/set_axis tune-table mutation.
    info!("Web UI initialized — placeholder (not yet implemented)");
}
