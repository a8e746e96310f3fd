//! `Watchdog` trait and the [`ProcessSupervisor`] that implements it for
//! the ECU's out-of-core-loop binaries (telemetry, web UI, updater,
//! transmission). Adapted from SHM-backed health probing to plain process
//! liveness — the slow/fast loops themselves live in one process
//! (`ecu_engine`), so there is no shared-memory heartbeat to watch here.

pub mod error;
pub mod supervisor;

pub use error::WatchdogError;
pub use supervisor::{HealthStatus, ManagedProcess, ProcessSupervisor, Watchdog};
