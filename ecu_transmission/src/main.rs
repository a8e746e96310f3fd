//! # ECU Transmission
//!
//! Shift-program daemon for automatic-transmission builds. Consumes the
//! engine's live RPM/load over `TransmissionPort` and drives shift
//! solenoids; manual-transmission builds never spawn this binary. Out of
//! scope per the core spec — this binary documents the seam only.
//!
//! ```text
//! ecu_engine ──TransmissionPort (rpm, load, TPS)──► ecu_transmission ──solenoids──► gearbox
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

/// Placeholder seam the core would hand engine state through; the real
/// implementation lives wherever the fast/slow loops publish their bus.
trait TransmissionPort {
    fn rpm(&self) -> f32;
    fn load_pct(&self) -> f32;
    fn throttle_pct(&self) -> f32;
}

#[derive(Parser, Debug)]
#[command(name = "ecu_transmission")]
struct Args {
    /// Directory holding project.toml (shift tables, solenoid pin map).
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();
    info!(config_dir = %args.config_dir.display(), "ECU Transmission starting...");

    // Placeholder: in full implementation this would read shift tables
    // from config_dir and drive solenoids off a TransmissionPort feed.
    info!("Transmission daemon initialized — placeholder (not yet implemented)");
}
