//! Error type for [`crate::supervisor::Watchdog`] operations.

use crate::supervisor::ManagedProcess;

/// Error type for watchdog operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    /// Failed to spawn the requested module.
    #[error("failed to spawn {module:?}: {reason}")]
    SpawnFailed {
        /// The module that failed to spawn.
        module: ManagedProcess,
        /// The OS error or other reason.
        reason: String,
    },

    /// Module did not become ready within the expected timeout.
    #[error("{module:?} not ready after {timeout_s:.1}s")]
    ReadyTimeout {
        /// The module that failed to become ready.
        module: ManagedProcess,
        /// The timeout that elapsed, seconds.
        timeout_s: f64,
    },

    /// Maximum restart attempts exhausted.
    #[error("max restarts ({max}) exhausted for {module:?}")]
    RestartsExhausted {
        /// The module that exhausted its restart budget.
        module: ManagedProcess,
        /// The configured restart ceiling.
        max: u32,
    },

    /// Generic I/O or system error.
    #[error("watchdog error: {0}")]
    Other(String),
}
