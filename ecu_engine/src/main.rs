//! Thin CLI shell over `ecu_engine::run` — parses arguments, sets up
//! logging, and reports a fatal startup error with a non-zero exit code.

use clap::Parser;
use ecu_engine::Args;
use tracing::{error, info};

fn main() {
    let args = Args::parse();
    ecu_engine::setup_tracing(&args);

    info!("ECU Engine v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = ecu_engine::run(&args) {
        error!("fatal startup error: {e}");
        std::process::exit(1);
    }
}
