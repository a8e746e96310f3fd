//! `LimpArbiter` — aggregates sensor and peripheral fault bits into the
//! degraded operating envelope and debounces its exit.

use ecu_common::config::{Curve6, LimpThresholds};
use ecu_common::error::{report_fault, FaultBitmask, FaultCallback, FaultEvent};

/// Aggregate output of one `LimpArbiter::update()` tick.
#[derive(Debug, Clone, Copy)]
pub struct LimpOutput {
    /// The degraded operating envelope is active.
    pub limp_mode: bool,
    /// Fault bitmask last observed active; sticky while `limp_mode`.
    pub fault_bits: FaultBitmask,
    /// Check-engine-light indicator state.
    pub cel: bool,
    /// Spark advance cap to apply this tick (only meaningful while `limp_mode`).
    pub advance_cap: f32,
    /// Commanded rev limit for this tick: CLT-gated in normal operation,
    /// `limp_rev_limit` while `limp_mode`.
    pub effective_rev_limit: u32,
}

/// Debounced limp-mode entry/exit state machine: enters immediately on any
/// nonzero fault aggregate, exits only once the aggregate has read zero
/// continuously for `limp_recovery_ms`.
#[derive(Default)]
pub struct LimpArbiter {
    active: bool,
    recovery_start_ms: Option<u64>,
    fault_bits: FaultBitmask,
}

impl LimpArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Run one slow-loop tick. `faults` is the full aggregate — sensor
    /// out-of-range bits, peripheral communication faults, and oil
    /// pressure — already folded together by the caller.
    pub fn update(
        &mut self,
        now_ms: u64,
        faults: FaultBitmask,
        clt_f: f32,
        cfg: &LimpThresholds,
        rev_limit_curve: &Curve6,
        fault_cb: Option<&FaultCallback>,
    ) -> LimpOutput {
        if faults != 0 {
            self.recovery_start_ms = None;
            if !self.active {
                self.active = true;
                report_fault(
                    fault_cb,
                    &FaultEvent { name: "LIMP".into(), message: format!("fault bits 0x{faults:08X}"), active: true },
                );
            }
            self.fault_bits = faults;
        } else if self.active {
            match self.recovery_start_ms {
                None => self.recovery_start_ms = Some(now_ms),
                Some(start) if now_ms.saturating_sub(start) >= cfg.limp_recovery_ms => {
                    self.active = false;
                    self.fault_bits = 0;
                    self.recovery_start_ms = None;
                    report_fault(
                        fault_cb,
                        &FaultEvent { name: "LIMP".into(), message: "all sensors recovered".into(), active: false },
                    );
                }
                _ => {}
            }
        }

        let effective_rev_limit = if self.active { cfg.limp_rev_limit } else { rev_limit_curve.interpolate(clt_f) as u32 };

        LimpOutput {
            limp_mode: self.active,
            fault_bits: self.fault_bits,
            cel: self.active,
            advance_cap: cfg.limp_advance_cap,
            effective_rev_limit,
        }
    }
}
