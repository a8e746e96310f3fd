//! Deceleration fuel cutoff.

use ecu_common::config::DfcoConfig;

/// Debounced DFCO entry/exit latch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DfcoState {
    active: bool,
    condition_since_ms: Option<u64>,
}

impl DfcoState {
    /// Advance one tick and return whether fuel-cut is active.
    ///
    /// Entry requires `rpm > rpm_threshold && tps_pct < tps_threshold` to
    /// hold continuously for `entry_delay_ms`; exit is immediate on
    /// `rpm < exit_rpm || tps_pct > exit_tps`.
    pub fn update(&mut self, now_ms: u64, rpm: u32, tps_pct: f32, cfg: &DfcoConfig) -> bool {
        if self.active {
            if rpm < cfg.exit_rpm || tps_pct > cfg.exit_tps {
                self.active = false;
                self.condition_since_ms = None;
            }
            return self.active;
        }

        let entry_condition = rpm > cfg.rpm_threshold && tps_pct < cfg.tps_threshold;
        if entry_condition {
            let since = *self.condition_since_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= cfg.entry_delay_ms as u64 {
                self.active = true;
            }
        } else {
            self.condition_since_ms = None;
        }
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DfcoConfig {
        DfcoConfig { rpm_threshold: 2_500, tps_threshold: 3.0, entry_delay_ms: 500, exit_rpm: 1_800, exit_tps: 5.0 }
    }

    #[test]
    fn requires_entry_delay_before_cutting_fuel() {
        let mut dfco = DfcoState::default();
        assert!(!dfco.update(0, 3_000, 0.0, &cfg()));
        assert!(!dfco.update(300, 3_000, 0.0, &cfg()));
        assert!(dfco.update(500, 3_000, 0.0, &cfg()));
    }

    #[test]
    fn entry_condition_dropping_resets_the_debounce_timer() {
        let mut dfco = DfcoState::default();
        assert!(!dfco.update(0, 3_000, 0.0, &cfg()));
        assert!(!dfco.update(300, 3_000, 10.0, &cfg())); // tps spikes, resets timer
        assert!(!dfco.update(600, 3_000, 0.0, &cfg())); // condition just re-armed, since=600
        assert!(!dfco.update(900, 3_000, 0.0, &cfg())); // only 300ms since re-arm
        assert!(dfco.update(1_100, 3_000, 0.0, &cfg()));
    }

    #[test]
    fn exits_on_rpm_drop_or_tps_rise() {
        let mut dfco = DfcoState::default();
        dfco.update(0, 3_000, 0.0, &cfg());
        assert!(dfco.update(500, 3_000, 0.0, &cfg()));
        assert!(!dfco.update(600, 1_700, 0.0, &cfg()));

        dfco.update(0, 3_000, 0.0, &cfg());
        dfco.update(500, 3_000, 0.0, &cfg());
        assert!(!dfco.update(600, 3_000, 6.0, &cfg()));
    }
}
