//! Process-level supervisor: spawn, health-check, restart with a bounded
//! budget, and coordinated shutdown of the ECU's peripheral binaries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::WatchdogError;

/// Identifies a managed peripheral binary. The core loops (`ecu_engine`)
/// are not managed here — this supervisor governs the services the core
/// never blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedProcess {
    /// `ecu_telemetry` — MQTT-ish publisher.
    Telemetry,
    /// `ecu_webui` — HTTP tune-mutator API.
    WebUi,
    /// `ecu_updater` — OTA/FTP/SD-card persistence.
    Updater,
    /// `ecu_transmission` — shift-program daemon.
    Transmission,
}

impl ManagedProcess {
    /// Every managed process, in the order they should be started (and
    /// the reverse of the order they should be shut down).
    pub const ALL: [ManagedProcess; 4] =
        [ManagedProcess::Telemetry, ManagedProcess::WebUi, ManagedProcess::Updater, ManagedProcess::Transmission];

    fn binary_name(self) -> &'static str {
        match self {
            ManagedProcess::Telemetry => "ecu_telemetry",
            ManagedProcess::WebUi => "ecu_webui",
            ManagedProcess::Updater => "ecu_updater",
            ManagedProcess::Transmission => "ecu_transmission",
        }
    }
}

/// Health status returned by [`Watchdog::health_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Process is alive.
    Healthy,
    /// Process is alive but has not reported in past a configured window.
    /// Unused by [`ProcessSupervisor`] (no heartbeat channel exists without
    /// SHM); kept so the trait matches the full supervisor contract.
    Stale {
        /// Seconds since the last known-good heartbeat.
        age_secs: u64,
    },
    /// Process has exited.
    Dead {
        /// Exit code, if the OS reported one.
        exit_code: Option<i32>,
    },
    /// Never spawned, or not being tracked.
    Unknown,
}

/// Supervisor contract for ECU process lifecycle management.
pub trait Watchdog {
    /// Spawn a managed module, forwarding `config_dir` via `--config-dir`.
    fn spawn_module(&mut self, module: ManagedProcess, config_dir: &Path) -> Result<u32, WatchdogError>;
    /// Query the health of a managed module.
    fn health_check(&self, module: ManagedProcess) -> HealthStatus;
    /// Restart a module that has died, within the configured restart budget.
    fn restart_module(&mut self, module: ManagedProcess) -> Result<u32, WatchdogError>;
    /// Shut down all managed modules, SIGTERM then SIGKILL, reverse-startup order.
    fn shutdown_all(&mut self) -> Result<(), WatchdogError>;
}

struct Tracked {
    child: Mutex<Child>,
    config_dir: PathBuf,
    restarts: u32,
    #[allow(dead_code)]
    spawned_at: Instant,
}

/// Grace period between SIGTERM and SIGKILL during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Spawns and supervises the ECU's peripheral binaries with plain
/// `std::process::Command` — no SHM, matching the single-process core
/// loop design.
pub struct ProcessSupervisor {
    bin_dir: PathBuf,
    max_restarts: u32,
    children: HashMap<ManagedProcess, Tracked>,
}

impl ProcessSupervisor {
    /// Build a supervisor that resolves managed binaries under `bin_dir`
    /// and allows up to `max_restarts` restarts per module before giving up.
    pub fn new(bin_dir: PathBuf, max_restarts: u32) -> Self {
        Self { bin_dir, max_restarts, children: HashMap::new() }
    }

    fn spawn_child(&self, module: ManagedProcess, config_dir: &Path) -> Result<Child, WatchdogError> {
        Command::new(self.bin_dir.join(module.binary_name()))
            .arg("--config-dir")
            .arg(config_dir)
            .spawn()
            .map_err(|e| WatchdogError::SpawnFailed { module, reason: e.to_string() })
    }

    fn terminate(&self, tracked: &Tracked) {
        let mut child = tracked.child.lock().unwrap();
        if child.try_wait().ok().flatten().is_some() {
            return;
        }
        let pid = Pid::from_raw(child.id() as i32);
        let _ = kill(pid, Signal::SIGTERM);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() >= deadline => break,
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(_) => return,
            }
        }
        tracing::warn!(pid = pid.as_raw(), "did not exit after SIGTERM, sending SIGKILL");
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Watchdog for ProcessSupervisor {
    fn spawn_module(&mut self, module: ManagedProcess, config_dir: &Path) -> Result<u32, WatchdogError> {
        let child = self.spawn_child(module, config_dir)?;
        let pid = child.id();
        self.children.insert(
            module,
            Tracked { child: Mutex::new(child), config_dir: config_dir.to_path_buf(), restarts: 0, spawned_at: Instant::now() },
        );
        tracing::info!(?module, pid, "spawned managed process");
        Ok(pid)
    }

    fn health_check(&self, module: ManagedProcess) -> HealthStatus {
        let Some(tracked) = self.children.get(&module) else {
            return HealthStatus::Unknown;
        };
        let mut child = tracked.child.lock().unwrap();
        match child.try_wait() {
            Ok(Some(status)) => HealthStatus::Dead { exit_code: status.code() },
            Ok(None) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unknown,
        }
    }

    fn restart_module(&mut self, module: ManagedProcess) -> Result<u32, WatchdogError> {
        let config_dir = match self.children.get(&module) {
            Some(tracked) => {
                if tracked.restarts >= self.max_restarts {
                    return Err(WatchdogError::RestartsExhausted { module, max: self.max_restarts });
                }
                self.terminate(tracked);
                tracked.config_dir.clone()
            }
            None => return Err(WatchdogError::Other(format!("{module:?} was never spawned"))),
        };

        let restarts = self.children.get(&module).map(|t| t.restarts).unwrap_or(0) + 1;
        let child = self.spawn_child(module, &config_dir)?;
        let pid = child.id();
        self.children.insert(
            module,
            Tracked { child: Mutex::new(child), config_dir, restarts, spawned_at: Instant::now() },
        );
        tracing::warn!(?module, pid, restarts, "restarted managed process");
        Ok(pid)
    }

    fn shutdown_all(&mut self) -> Result<(), WatchdogError> {
        for module in ManagedProcess::ALL.iter().rev() {
            if let Some(tracked) = self.children.get(module) {
                tracing::info!(?module, "shutting down");
                self.terminate(tracked);
            }
        }
        self.children.clear();
        Ok(())
    }
}
