//! `SensorDescriptor` — one per logical sensor slot: source routing,
//! calibration, filter, and validation config.
//!
//! Ported from `SensorDescriptor.h`'s C struct; the source-kind and
//! calibration-kind inheritance hierarchies become tagged variants instead.

use bitflags::bitflags;
use ecu_common::error::FaultAction;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Engine phases a sensor's validation (or a fault rule's gating) can
    /// be restricted to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EnginePhase: u8 {
        /// Starter-driven, pre-combustion.
        const CRANKING = 1 << 0;
        /// Running under its own power.
        const RUNNING = 1 << 1;
        /// Key-on, not cranking or running.
        const STOPPED = 1 << 2;
        /// All three phases (the descriptor default).
        const ALL = Self::CRANKING.bits() | Self::RUNNING.bits() | Self::STOPPED.bits();
    }
}

/// The current single-phase engine state, for comparing against a
/// descriptor's or rule's `active_states`/gate set.
pub fn current_phase(cranking: bool, running: bool) -> EnginePhase {
    if cranking {
        EnginePhase::CRANKING
    } else if running {
        EnginePhase::RUNNING
    } else {
        EnginePhase::STOPPED
    }
}

/// A non-hardware channel a [`SourceKind::Virtual`] slot mirrors, or a
/// [`crate::fault_rule::FaultSource`] gates/reads against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualChannel {
    /// Engine speed, as produced by `CrankDecoder`.
    Rpm,
}

/// Where `SensorLayer` reads this slot's raw millivolt reading from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Not wired; always reads 0 mV and never validates.
    Disabled,
    /// On-chip ADC channel.
    OnChipAdc {
        /// ADC channel index.
        channel: u8,
    },
    /// External 16-bit differential I2C ADC.
    ExternalAdc16 {
        /// Device index among the configured external-16 devices.
        device: u8,
        /// Channel on that device.
        channel: u8,
    },
    /// External 12-bit SPI ADC.
    ExternalAdc12 {
        /// Device index among the configured external-12 devices.
        device: u8,
        /// Channel on that device.
        channel: u8,
    },
    /// Digital input: high reads as 5000 mV, low as 0 mV.
    Digital {
        /// GPIO pin.
        pin: u32,
    },
    /// Mirrors a value computed elsewhere instead of reading hardware.
    Virtual {
        /// The channel to mirror.
        channel: VirtualChannel,
    },
}

/// Calibration applied to the filtered raw millivolt reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalKind {
    /// `value = c + (v - a) * (d - c) / (b - a)`, v in volts.
    Linear {
        /// Volts at the first calibration point.
        a: f32,
        /// Volts at the second calibration point.
        b: f32,
        /// Engineering value at `a`.
        c: f32,
        /// Engineering value at `b`.
        d: f32,
    },
    /// NTC thermistor: pullup divider + Beta equation, result in °F.
    Ntc {
        /// Pullup resistor, ohms.
        r_pullup: f32,
        /// Thermistor Beta coefficient.
        beta: f32,
        /// Thermistor resistance at `t0_k`, ohms.
        r0: f32,
        /// Reference temperature, kelvin (typically 298.15 = 25°C).
        t0_k: f32,
        /// ADC reference voltage.
        v_ref: f32,
    },
    /// `value = v * ratio`, v in volts.
    VoltageDivider {
        /// Divider ratio.
        ratio: f32,
    },
    /// Linear interpolation between two `(volts, value)` points — the
    /// narrowband O2 calibration style (`voltageToAfr`).
    TwoPointLookup {
        /// Volts at the first point.
        v0: f32,
        /// Value at `v0`.
        val0: f32,
        /// Volts at the second point.
        v1: f32,
        /// Value at `v1`.
        val1: f32,
    },
    /// No calibration; value is the raw millivolt reading.
    Raw,
}

impl CalKind {
    /// Apply this calibration to a millivolt reading.
    pub fn calibrate(&self, mv: f32) -> f32 {
        let v = mv / 1000.0;
        match *self {
            CalKind::Linear { a, b, c, d } => {
                if (b - a).abs() < 1e-6 {
                    c
                } else {
                    c + (v - a) * (d - c) / (b - a)
                }
            }
            CalKind::Ntc { r_pullup, beta, r0, t0_k, v_ref } => {
                let denom = (v_ref - v).max(1e-6);
                let r = r_pullup * v / denom;
                let t_k = 1.0 / (1.0 / t0_k + (1.0 / beta) * (r / r0).ln());
                (t_k - 273.15) * 9.0 / 5.0 + 32.0
            }
            CalKind::VoltageDivider { ratio } => v * ratio,
            CalKind::TwoPointLookup { v0, val0, v1, val1 } => {
                if (v1 - v0).abs() < 1e-6 {
                    val0
                } else {
                    val0 + (v - v0) * (val1 - val0) / (v1 - v0)
                }
            }
            CalKind::Raw => mv,
        }
    }
}

/// Identifies the well-known engine channel a slot fills, so other
/// components can find it without string matching on `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorRole {
    /// Manifold absolute pressure, kPa.
    MapKpa,
    /// Throttle position, %.
    TpsPct,
    /// Coolant temperature, °F.
    CltF,
    /// Intake air temperature, °F.
    IatF,
    /// Battery voltage, V.
    VbatV,
    /// Oil pressure, PSI.
    OilPsi,
    /// Narrowband O2, bank 0.
    O2Bank0,
    /// Narrowband O2, bank 1.
    O2Bank1,
    /// No well-known role; addressed by name/index only.
    Custom,
}

fn default_ema_alpha() -> f32 {
    0.3
}
fn default_avg_samples() -> usize {
    1
}
fn default_fault_bit() -> u8 {
    0xFF
}
fn default_active_states() -> EnginePhase {
    EnginePhase::ALL
}

/// Config for one logical sensor slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorDescriptor {
    /// Human-readable name, used in fault messages.
    pub name: String,
    /// Engineering unit, for telemetry/display only.
    pub unit: String,
    /// Well-known channel this slot fills, if any.
    #[serde(default = "default_role")]
    pub role: SensorRole,
    /// Where the raw reading comes from.
    pub source: SourceKind,
    /// Calibration applied to the filtered reading.
    pub cal: CalKind,
    /// EMA coefficient in `[0, 1]` applied after the moving average.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f32,
    /// Moving-average window, `1..=32` samples.
    #[serde(default = "default_avg_samples")]
    pub avg_samples: usize,
    /// Lower error-bound; breaching it (while active) sets `in_error`.
    #[serde(default)]
    pub error_min: Option<f32>,
    /// Upper error-bound.
    #[serde(default)]
    pub error_max: Option<f32>,
    /// Lower warn-bound.
    #[serde(default)]
    pub warn_min: Option<f32>,
    /// Upper warn-bound.
    #[serde(default)]
    pub warn_max: Option<f32>,
    /// Validation is skipped while `|filtered raw mV| <= settle_guard`.
    #[serde(default)]
    pub settle_guard: f32,
    /// Bit index into the fault bitmask; `0xFF` means "no fault mapping".
    #[serde(default = "default_fault_bit")]
    pub fault_bit: u8,
    /// What an active fault on this slot does to the operating envelope.
    #[serde(default)]
    pub fault_action: FaultAction,
    /// Engine phases in which validation is active.
    #[serde(default = "default_active_states")]
    pub active_states: EnginePhase,
}

fn default_role() -> SensorRole {
    SensorRole::Custom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_calibration_round_trips_endpoints() {
        let cal = CalKind::Linear { a: 0.0, b: 5.0, c: 0.0, d: 100.0 };
        assert!((cal.calibrate(0.0) - 0.0).abs() < 1e-3);
        assert!((cal.calibrate(5000.0) - 100.0).abs() < 1e-3);
        assert!((cal.calibrate(2500.0) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn two_point_lookup_matches_narrowband_style() {
        let cal = CalKind::TwoPointLookup { v0: 0.0, val0: 0.0, v1: 5.0, val1: 20.0 };
        assert!((cal.calibrate(2500.0) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn voltage_divider_scales_linearly() {
        let cal = CalKind::VoltageDivider { ratio: 4.0 };
        assert!((cal.calibrate(1000.0) - 4.0).abs() < 1e-3);
    }

    #[test]
    fn ntc_beta_equation_decreases_with_higher_voltage_ratio() {
        let cal = CalKind::Ntc { r_pullup: 10_000.0, beta: 3950.0, r0: 10_000.0, t0_k: 298.15, v_ref: 3.3 };
        let cold = cal.calibrate(500.0);
        let hot = cal.calibrate(2500.0);
        assert!(hot > cold);
    }

    #[test]
    fn phase_derivation_matches_flags() {
        assert_eq!(current_phase(true, false), EnginePhase::CRANKING);
        assert_eq!(current_phase(false, true), EnginePhase::RUNNING);
        assert_eq!(current_phase(false, false), EnginePhase::STOPPED);
    }
}
