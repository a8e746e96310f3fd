//! After-start enrichment.

use ecu_common::config::AseConfig;

/// Tracks whether after-start enrichment is currently decaying and how much
/// of it remains.
#[derive(Debug, Clone, Copy, Default)]
pub struct AseState {
    active: bool,
    start_ms: u64,
    was_running: bool,
}

/// Outcome of one [`AseState::update`] call.
#[derive(Debug, Clone, Copy)]
pub struct AseStatus {
    /// `true` while enrichment is applying a non-zero multiplier.
    pub active: bool,
    /// Remaining enrichment percentage (decays linearly to 0).
    pub pct_remaining: f32,
}

impl AseState {
    /// Advance one tick. Begins enrichment on the `false -> true` edge of
    /// `running` when `clt_f` is below `cfg.min_clt_f`; decays linearly over
    /// `cfg.duration_ms`; terminates at 0% or when the engine stops.
    pub fn update(&mut self, now_ms: u64, running: bool, clt_f: f32, cfg: &AseConfig) -> AseStatus {
        let just_started = running && !self.was_running;
        self.was_running = running;

        if !running {
            self.active = false;
            return AseStatus { active: false, pct_remaining: 0.0 };
        }

        if just_started && clt_f < cfg.min_clt_f {
            self.active = true;
            self.start_ms = now_ms;
        }

        if !self.active {
            return AseStatus { active: false, pct_remaining: 0.0 };
        }

        let elapsed_ms = now_ms.saturating_sub(self.start_ms) as f32;
        let frac = (elapsed_ms / cfg.duration_ms.max(1) as f32).clamp(0.0, 1.0);
        let pct_remaining = cfg.initial_pct * (1.0 - frac);

        if pct_remaining <= 0.0 {
            self.active = false;
            return AseStatus { active: false, pct_remaining: 0.0 };
        }

        AseStatus { active: true, pct_remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AseConfig {
        AseConfig { initial_pct: 40.0, duration_ms: 10_000, min_clt_f: 100.0 }
    }

    #[test]
    fn does_not_start_when_already_warm() {
        let mut ase = AseState::default();
        let status = ase.update(0, true, 180.0, &cfg());
        assert!(!status.active);
    }

    #[test]
    fn starts_on_running_edge_when_cold_and_decays_linearly() {
        let mut ase = AseState::default();
        ase.update(0, false, 50.0, &cfg()); // not yet running
        let start = ase.update(0, true, 50.0, &cfg());
        assert!(start.active);
        assert_eq!(start.pct_remaining, 40.0);

        let mid = ase.update(5_000, true, 50.0, &cfg());
        assert!((mid.pct_remaining - 20.0).abs() < 1e-3);

        let done = ase.update(10_000, true, 50.0, &cfg());
        assert!(!done.active);
        assert_eq!(done.pct_remaining, 0.0);
    }

    #[test]
    fn terminates_on_engine_stop() {
        let mut ase = AseState::default();
        ase.update(0, false, 50.0, &cfg());
        ase.update(0, true, 50.0, &cfg());
        let stopped = ase.update(100, false, 50.0, &cfg());
        assert!(!stopped.active);
    }
}
