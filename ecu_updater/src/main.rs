//! # ECU Updater
//!
//! Bundles the three storage/provisioning paths the core spec puts out of
//! scope: OTA firmware/tune delivery, FTP sync of logged data, and SD-card
//! JSON persistence of tune tables. Bundled here since all three are pure
//! storage concerns with no angle-accurate timing requirement.
//!
//! ```text
//! OTA server ──bundle──┐
//! FTP peer  ──sync────┼──► ecu_updater ──writes──► tables/*.toml, SD card
//! SD card   ──load─────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ecu_updater")]
struct Args {
    /// Directory holding project.toml and tables/ this updater persists to.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Mount point to watch for SD-card tune/firmware bundles.
    #[arg(long, default_value = "/mnt/sd")]
    sd_mount: PathBuf,
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();
    info!(
        config_dir = %args.config_dir.display(),
        sd_mount = %args.sd_mount.display(),
        "ECU Updater starting...",
    );

    // Placeholder: in full implementation this would poll the SD mount
    // and FTP peer for bundles, verify and apply them, and persist
    // tune-table edits back to tables/*.toml.
    info!("Updater initialized — placeholder (not yet implemented)");
}
