//! `EngineState` — the composite snapshot published once per slow-loop
//! iteration and read by the fast loop and external observers.

use ecu_common::consts::MAX_CYLINDERS;
use ecu_common::error::FaultBitmask;

/// Engine phase/operating-mode flags plus the full set of filtered sensor,
/// wideband, fuel/spark, and fault outputs the slow loop produces each tick.
///
/// `Copy` so the bus can move it in and out of the seqlock-protected cell
/// with a plain `ptr::read`/assignment rather than a field-by-field copy.
#[derive(Debug, Clone, Copy)]
pub struct EngineState {
    /// Engine speed, RPM, clamped to `[0, RPM_MAX]`.
    pub rpm: u32,
    /// Current crank tooth position, `0..total_teeth`.
    pub tooth_position: u32,

    /// Filtered manifold absolute pressure, kPa.
    pub map_kpa: f32,
    /// Filtered throttle position, %.
    pub tps_pct: f32,
    /// Filtered coolant temperature, °F.
    pub clt_f: f32,
    /// Filtered intake air temperature, °F.
    pub iat_f: f32,
    /// Filtered battery voltage, V.
    pub vbat_v: f32,
    /// Filtered oil pressure, PSI.
    pub oil_psi: f32,

    /// Per-bank air-fuel ratio (wideband if `o2_ready`, else narrowband).
    pub afr: [f32; 2],
    /// Per-bank lambda (AFR / stoichiometric).
    pub lambda: [f32; 2],
    /// Per-bank wideband readiness (`heater_state == PID`).
    pub o2_ready: [bool; 2],

    /// Commanded target AFR for the current tick.
    pub target_afr: f32,
    /// Commanded spark advance, degrees BTDC.
    pub spark_advance_deg: f32,
    /// Commanded base injector pulse width, microseconds.
    pub inj_pw_us: f32,
    /// Per-cylinder pulse-width trim multipliers.
    pub inj_trim: [f32; MAX_CYLINDERS],

    /// Engine is running (post-crank, stable combustion).
    pub running: bool,
    /// Engine is cranking (starter-driven).
    pub cranking: bool,
    /// `true` when cam phase is known and sequential injection/spark is used.
    pub sequential_mode: bool,

    /// Limp-mode envelope is active.
    pub limp_mode: bool,
    /// Aggregate fault bitmask (`ecu_common::error::FaultBitmask`).
    pub fault_bits: FaultBitmask,

    /// After-start enrichment is currently applying a multiplier.
    pub ase_active: bool,
    /// Remaining ASE enrichment percentage (decays to 0).
    pub ase_pct_remaining: f32,
    /// Deceleration fuel cutoff (or any fuel-cut condition) is active.
    pub fuel_cut: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            rpm: 0,
            tooth_position: 0,
            map_kpa: 0.0,
            tps_pct: 0.0,
            clt_f: 0.0,
            iat_f: 0.0,
            vbat_v: 0.0,
            oil_psi: 0.0,
            afr: [0.0; 2],
            lambda: [0.0; 2],
            o2_ready: [false; 2],
            target_afr: ecu_common::consts::STOICH_AFR,
            spark_advance_deg: 0.0,
            inj_pw_us: 0.0,
            inj_trim: [1.0; MAX_CYLINDERS],
            running: false,
            cranking: false,
            sequential_mode: false,
            limp_mode: false,
            fault_bits: 0,
            ase_active: false,
            ase_pct_remaining: 0.0,
            fuel_cut: false,
        }
    }
}
