//! `RealtimeScheduler` and its RT loop-running infrastructure.
//!
//! The loop-selection/RT-setup shape (`rt_setup`, `run_rt_loop`/
//! `run_sim_loop` behind the `rt` feature) follows the usual fixed-cycle
//! RT runner shape, adapted since this loop has no fixed rate (it
//! busy-polls while the engine runs, and sleeps between idle checks
//! otherwise) — only the setup/dispatch skeleton carries over, not
//! cycle-time pacing.

use std::sync::Arc;

use ecu_common::config::ProjectConfig;
use ecu_decoder::{CrankCounters, SyncState};
use ecu_hal::{Clock, GpioPort, Level};
use ecu_state::{EngineState, EngineStateBus};

use crate::cylinder::{angle_mod, in_window, CylinderState};

/// Errors from RT setup or scheduler construction.
#[derive(Debug)]
pub enum SchedulerError {
    /// An RT syscall failed during setup.
    RtSetup(String),
    /// `ProjectConfig.pins` did not have one entry per cylinder.
    PinMapMismatch,
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
            Self::PinMapMismatch => write!(f, "pin map length does not match cylinder count"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Lock all current/future pages and prefault the stack, pin to a CPU
/// core, and take `SCHED_FIFO`. No-op without the `rt` feature.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), SchedulerError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::sys::mman::{mlockall, MlockallFlags};
    use nix::unistd::Pid;

    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| SchedulerError::RtSetup(format!("mlockall failed: {e}")))?;

    let mut buf = [0u8; 64 * 1024];
    for b in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(b, 0xFF) };
    }
    core::hint::black_box(&buf);

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu_core)
        .map_err(|e| SchedulerError::RtSetup(format!("CpuSet::set({cpu_core}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| SchedulerError::RtSetup(format!("sched_setaffinity failed: {e}")))?;

    let param = libc::sched_param { sched_priority: rt_priority };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(SchedulerError::RtSetup(format!("sched_setscheduler(SCHED_FIFO, {rt_priority}) failed: {err}")));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu_core: usize, _rt_priority: i32) -> Result<(), SchedulerError> {
    Ok(())
}

/// Angle-accurate dwell/spark and injector scheduler, one instance per
/// engine, owning per-cylinder coil/injector output state.
pub struct RealtimeScheduler {
    /// 1-indexed cylinder numbers, in firing order.
    firing_order: Vec<u8>,
    /// Per-cylinder live output state, parallel to `firing_order`.
    cylinders: Vec<CylinderState>,
    total_teeth: u32,
    batch_open: bool,
}

impl RealtimeScheduler {
    /// Build a scheduler from engine geometry and the coil/injector pin map.
    pub fn new(cfg: &ProjectConfig) -> Result<Self, SchedulerError> {
        let n = cfg.engine.cylinders as usize;
        if cfg.pins.coil_pins.len() != n || cfg.pins.injector_pins.len() != n {
            return Err(SchedulerError::PinMapMismatch);
        }
        let cylinders = cfg
            .engine
            .firing_order
            .iter()
            .map(|&cyl_num| CylinderState {
                coil_pin: cfg.pins.coil_pins[(cyl_num - 1) as usize],
                injector_pin: cfg.pins.injector_pins[(cyl_num - 1) as usize],
                ..CylinderState::default()
            })
            .collect();
        Ok(Self {
            firing_order: cfg.engine.firing_order.clone(),
            cylinders,
            total_teeth: cfg.engine.crank_teeth as u32,
            batch_open: false,
        })
    }

    fn drive_all_low(&mut self, gpio: &mut dyn GpioPort) -> Result<(), ecu_hal::HalError> {
        for cyl in &mut self.cylinders {
            gpio.write(cyl.coil_pin, Level::Low)?;
            gpio.write(cyl.injector_pin, Level::Low)?;
            cyl.charging = false;
            cyl.inj_open = false;
        }
        self.batch_open = false;
        Ok(())
    }

    fn drive_all_coils_low(&mut self, gpio: &mut dyn GpioPort) -> Result<(), ecu_hal::HalError> {
        for cyl in &mut self.cylinders {
            gpio.write(cyl.coil_pin, Level::Low)?;
            cyl.charging = false;
        }
        Ok(())
    }

    fn drive_all_injectors_low(&mut self, gpio: &mut dyn GpioPort) -> Result<(), ecu_hal::HalError> {
        for cyl in &mut self.cylinders {
            gpio.write(cyl.injector_pin, Level::Low)?;
            cyl.inj_open = false;
        }
        self.batch_open = false;
        Ok(())
    }

    /// Run one fast-loop iteration. Returns `true` when the iteration was
    /// idle (engine not synced/running) and the caller should yield ≥1 ms
    /// before the next call; `false` for a busy-polled iteration.
    pub fn tick(
        &mut self,
        gpio: &mut dyn GpioPort,
        clock: &dyn Clock,
        crank: &CrankCounters,
        state: &EngineState,
        cfg: &ProjectConfig,
    ) -> Result<bool, ecu_hal::HalError> {
        let rpm = crank.rpm();
        let tooth = crank.tooth_position();
        let sync = crank.sync_state();

        if sync != SyncState::Synced || rpm == 0 {
            self.drive_all_low(gpio)?;
            return Ok(true);
        }

        let now_us = clock.now_us();
        let deg_per_tooth = 360.0 / self.total_teeth as f32;
        let theta_now = tooth as f32 * deg_per_tooth;
        let deg_per_us = rpm as f32 * 360.0 / 60_000_000.0;

        let sequential = state.sequential_mode;
        let period = if sequential { 720.0 } else { 360.0 };
        let delta = 720.0 / self.cylinders.len() as f32;
        let tooth_tolerance = deg_per_tooth * 1.5;

        let rev_limit = if state.limp_mode { cfg.limp.limp_rev_limit } else { cfg.ignition.rev_limit_rpm };
        let advance = if state.limp_mode {
            state.spark_advance_deg.min(cfg.limp.limp_advance_cap)
        } else {
            state.spark_advance_deg
        };
        let dwell_deg = cfg.ignition.max_dwell_ms * 1000.0 * deg_per_us;
        let max_dwell_us = (cfg.ignition.max_dwell_ms * 1000.0) as u64;

        let rev_limited = rpm > rev_limit;
        if rev_limited {
            self.drive_all_coils_low(gpio)?;
        }

        for i in 0..self.cylinders.len() {
            let cyl_num = self.firing_order[i];
            let theta_spark = angle_mod(i as f32 * delta - advance, period);
            let theta_dwell = angle_mod(theta_spark - dwell_deg, period);

            if !rev_limited {
                let charging = self.cylinders[i].charging;
                if !charging && in_window(theta_now, theta_dwell, period, tooth_tolerance) {
                    gpio.write(self.cylinders[i].coil_pin, Level::High)?;
                    self.cylinders[i].charging = true;
                    self.cylinders[i].dwell_start_us = now_us;
                } else if charging && in_window(theta_now, theta_spark, period, tooth_tolerance) {
                    gpio.write(self.cylinders[i].coil_pin, Level::Low)?;
                    self.cylinders[i].charging = false;
                } else if charging && now_us.saturating_sub(self.cylinders[i].dwell_start_us) > max_dwell_us {
                    gpio.write(self.cylinders[i].coil_pin, Level::Low)?;
                    self.cylinders[i].charging = false;
                }
            }

            if !state.fuel_cut && sequential {
                let inj_center = angle_mod(i as f32 * delta + 360.0, 720.0);
                let effective_pw =
                    state.inj_pw_us * state.inj_trim[(cyl_num - 1) as usize] + cfg.injection.injector_dead_time_ms * 1000.0;
                let inj_open = self.cylinders[i].inj_open;
                if !inj_open && in_window(theta_now, inj_center, 720.0, tooth_tolerance) {
                    gpio.write(self.cylinders[i].injector_pin, Level::High)?;
                    self.cylinders[i].inj_open = true;
                    self.cylinders[i].inj_open_us = now_us;
                    self.cylinders[i].inj_scheduled_us = effective_pw;
                } else if inj_open
                    && now_us.saturating_sub(self.cylinders[i].inj_open_us) as f32 >= self.cylinders[i].inj_scheduled_us
                {
                    gpio.write(self.cylinders[i].injector_pin, Level::Low)?;
                    self.cylinders[i].inj_open = false;
                }
            }
        }

        if state.fuel_cut {
            self.drive_all_injectors_low(gpio)?;
        } else if !sequential {
            self.tick_batch_injectors(gpio, clock, tooth, state, cfg)?;
        }

        Ok(false)
    }

    /// Batch/wasted-spark injection: open every injector together at tooth
    /// 0, each for half the scheduled pulse width.
    fn tick_batch_injectors(
        &mut self,
        gpio: &mut dyn GpioPort,
        clock: &dyn Clock,
        tooth: u32,
        state: &EngineState,
        cfg: &ProjectConfig,
    ) -> Result<(), ecu_hal::HalError> {
        let now_us = clock.now_us();
        if tooth == 0 && !self.batch_open {
            let effective_pw = state.inj_pw_us * 0.5 + cfg.injection.injector_dead_time_ms * 1000.0;
            for cyl in &mut self.cylinders {
                gpio.write(cyl.injector_pin, Level::High)?;
                cyl.inj_open = true;
                cyl.inj_open_us = now_us;
                cyl.inj_scheduled_us = effective_pw;
            }
            self.batch_open = true;
        }
        if self.batch_open {
            let mut all_closed = true;
            for cyl in &mut self.cylinders {
                if cyl.inj_open {
                    if now_us.saturating_sub(cyl.inj_open_us) as f32 >= cyl.inj_scheduled_us {
                        gpio.write(cyl.injector_pin, Level::Low)?;
                        cyl.inj_open = false;
                    } else {
                        all_closed = false;
                    }
                }
            }
            if all_closed {
                self.batch_open = false;
            }
        }
        Ok(())
    }
}

/// Drives [`RealtimeScheduler::tick`] against the published [`EngineStateBus`],
/// sleeping ≥1 ms between idle iterations and busy-polling otherwise.
pub struct SchedulerRunner {
    scheduler: RealtimeScheduler,
    crank: Arc<CrankCounters>,
    bus: Arc<EngineStateBus>,
}

impl SchedulerRunner {
    /// Build a runner around an already-constructed scheduler.
    pub fn new(scheduler: RealtimeScheduler, crank: Arc<CrankCounters>, bus: Arc<EngineStateBus>) -> Self {
        Self { scheduler, crank, bus }
    }

    /// Run one iteration against live HAL handles and the latest published
    /// config snapshot, sleeping if the iteration was idle.
    pub fn run_once(&mut self, gpio: &mut dyn GpioPort, clock: &dyn Clock, cfg: &ProjectConfig) -> Result<(), ecu_hal::HalError> {
        let state = self.bus.snapshot();
        let idle = self.scheduler.tick(gpio, clock, &self.crank, &state, cfg)?;
        if idle {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        Ok(())
    }

    /// Enter the fast loop. Never returns under normal operation.
    pub fn run(&mut self, gpio: &mut dyn GpioPort, clock: &dyn Clock, cfg: &ProjectConfig) -> Result<(), ecu_hal::HalError> {
        loop {
            self.run_once(gpio, clock, cfg)?;
        }
    }
}
