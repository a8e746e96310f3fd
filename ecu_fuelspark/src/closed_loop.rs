//! Closed-loop O2 trim: per-bank PI correction averaged across banks
//!.

use ecu_common::config::ClosedLoopWindow;
use ecu_common::consts::O2_TRIM_CLAMP;

/// Per-bank integral state for the O2 trim controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedLoopTrim {
    integral: [f32; 2],
}

impl ClosedLoopTrim {
    /// `true` when the window's RPM/MAP gates are satisfied.
    pub fn in_window(rpm: u32, map_kpa: f32, cfg: &ClosedLoopWindow) -> bool {
        rpm >= cfg.min_rpm && rpm <= cfg.max_rpm && map_kpa <= cfg.max_map_kpa
    }

    /// Advance both banks' PI controllers and return the fractional trim to
    /// apply multiplicatively to the base pulse width (average of both
    /// banks' corrections, each independently clamped to `O2_TRIM_CLAMP`).
    /// Banks without a ready wideband/narrowband reading hold their prior
    /// integral and contribute zero correction for this tick.
    pub fn update(&mut self, target_afr: f32, actual_afr: [f32; 2], bank_valid: [bool; 2], cfg: &ClosedLoopWindow) -> f32 {
        let mut total = 0.0;
        let mut count = 0;
        for bank in 0..2 {
            if !bank_valid[bank] {
                continue;
            }
            let error = target_afr - actual_afr[bank];
            self.integral[bank] = (self.integral[bank] + error * cfg.ki).clamp(-O2_TRIM_CLAMP, O2_TRIM_CLAMP);
            let correction = (cfg.kp * error + self.integral[bank]).clamp(-O2_TRIM_CLAMP, O2_TRIM_CLAMP);
            total += correction;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            total / count as f32
        }
    }
}
