//! WidebandHeaterSM: two independent CJ125-style heater/lambda banks,
//! driven from the slow loop at a decimated ~100 ms tick.

pub mod heater;
pub mod lambda;

pub use heater::{BankHal, HeaterState, WidebandBank};
pub use lambda::adc_to_lambda;

use ecu_common::consts::{SLOW_LOOP_PERIOD_MS, WIDEBAND_TICK_MS};

/// Number of wideband banks (one per cylinder bank).
pub const NUM_BANKS: usize = 2;

/// Owns both wideband banks and decimates the slow loop's tick down to
/// the heater/IC's own ~100 ms cadence.
pub struct WidebandHeaterSM {
    banks: [WidebandBank; NUM_BANKS],
    enabled: bool,
    decimation_count: u32,
}

impl Default for WidebandHeaterSM {
    fn default() -> Self {
        Self { banks: [WidebandBank::default(), WidebandBank::default()], enabled: false, decimation_count: 0 }
    }
}

impl WidebandHeaterSM {
    /// Identify and begin both banks.
    pub fn begin(&mut self, hals: &mut [BankHal; NUM_BANKS], now_ms: u64) {
        for (bank, hal) in self.banks.iter_mut().zip(hals.iter_mut()) {
            bank.begin(hal, now_ms);
        }
        self.enabled = true;
        self.decimation_count = 0;
    }

    /// The bank states, in bank order.
    pub fn banks(&self) -> &[WidebandBank; NUM_BANKS] {
        &self.banks
    }

    /// `true` once a bank is producing a valid lambda/AFR reading.
    pub fn ready(&self, bank: usize) -> bool {
        self.banks.get(bank).is_some_and(WidebandBank::ready)
    }

    /// Call once per slow-loop tick (`SLOW_LOOP_PERIOD_MS`). Runs the
    /// per-bank state machines only every `WIDEBAND_TICK_MS /
    /// SLOW_LOOP_PERIOD_MS` calls, matching the heater IC's own cadence.
    pub fn tick(&mut self, hals: &mut [BankHal; NUM_BANKS], now_ms: u64, battery_v: f32) {
        if !self.enabled {
            return;
        }
        self.decimation_count += 1;
        let decimation = (WIDEBAND_TICK_MS / SLOW_LOOP_PERIOD_MS) as u32;
        if self.decimation_count < decimation {
            return;
        }
        self.decimation_count = 0;
        for (bank, hal) in self.banks.iter_mut().zip(hals.iter_mut()) {
            bank.update(hal, now_ms, battery_v);
        }
    }
}
