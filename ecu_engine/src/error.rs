//! Top-level error type the binary's `run()` returns.

use ecu_common::config::ConfigError;
use ecu_hal::HalError;
use ecu_scheduler::SchedulerError;
use ecu_tables::TableError;
use thiserror::Error;

/// Everything that can abort startup or the loops it spawns.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `project.toml`/`sensors.toml` failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A `tables/<name>.toml` tune table failed to load.
    #[error("tune table error: {0}")]
    Table(#[from] TableError),
    /// `RealtimeScheduler` construction failed (bad pin map).
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// A HAL capability call failed outside the fast/slow loop's own
    /// per-tick error handling (i.e. during setup).
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),
}
