//! FuelSparkCompute: the 10 ms fuel/spark pipeline.
//!
//! Cranking branch short-circuits to a fixed pulse width; otherwise VE/AFR/
//! spark table lookups feed a base pulse width that warmup, acceleration,
//! after-start, and closed-loop O2 corrections adjust in that order, before
//! DFCO and a final clamp.

pub mod accel;
pub mod ase;
pub mod closed_loop;
pub mod dfco;
pub mod warmup;

use accel::AccelEnrichment;
use ase::AseState;
use closed_loop::ClosedLoopTrim;
use dfco::DfcoState;

use ecu_common::config::ProjectConfig;
use ecu_common::consts::{CRANKING_TARGET_AFR, DEFAULT_CRANKING_PW_US, DEFAULT_VE_PCT, PW_CLAMP_MAX_US, PW_CLAMP_MIN_US, STOICH_AFR};
use ecu_tables::TuneTable;

/// VE/AFR/spark lookup tables, owned by the caller; a missing table falls
/// back to a fixed default.
#[derive(Default)]
pub struct FuelSparkTables<'a> {
    /// Volumetric efficiency %, indexed by RPM/MAP.
    pub ve: Option<&'a TuneTable>,
    /// Target AFR, indexed by RPM/MAP.
    pub afr: Option<&'a TuneTable>,
    /// Base spark advance (degrees BTDC), indexed by RPM/MAP.
    pub spark: Option<&'a TuneTable>,
}

/// Per-tick inputs consumed from the shared `EngineState`.
pub struct FuelSparkInput {
    /// Monotonic tick timestamp, ms.
    pub now_ms: u64,
    /// Engine speed, RPM.
    pub rpm: u32,
    /// Manifold absolute pressure, kPa.
    pub map_kpa: f32,
    /// Throttle position, %.
    pub tps_pct: f32,
    /// Coolant temperature, °F.
    pub clt_f: f32,
    /// Engine is running (post-crank, stable combustion).
    pub running: bool,
    /// Engine is cranking.
    pub cranking: bool,
    /// Per-bank actual AFR (wideband if ready, else narrowband).
    pub afr_actual: [f32; 2],
    /// Per-bank readiness of the actual-AFR reading feeding closed loop.
    pub bank_valid: [bool; 2],
}

/// Per-tick outputs written back into the shared `EngineState`.
#[derive(Debug, Clone, Copy)]
pub struct FuelSparkOutput {
    /// Commanded base injector pulse width, µs, clamped to `[0, 25000]`.
    pub inj_pw_us: f32,
    /// Commanded target AFR.
    pub target_afr: f32,
    /// Commanded spark advance, degrees BTDC.
    pub spark_advance_deg: f32,
    /// After-start enrichment is currently active.
    pub ase_active: bool,
    /// Remaining ASE enrichment percentage.
    pub ase_pct_remaining: f32,
    /// Deceleration fuel cutoff (or any fuel-cut condition) is active.
    pub fuel_cut: bool,
}

/// The fuel/spark compute pipeline. Holds the per-tick stateful pieces
/// (accel enrichment pool, ASE decay, DFCO debounce, closed-loop integrals)
/// that the table lookups themselves don't carry.
pub struct FuelSparkCompute {
    req_fuel_ms: f32,
    accel: AccelEnrichment,
    ase: AseState,
    dfco: DfcoState,
    closed_loop: ClosedLoopTrim,
}

impl FuelSparkCompute {
    /// Derive `REQ_FUEL` from engine geometry and injector flow:
    /// `(displacement_cc / cylinders) / flow_cc_min * 60_000`.
    pub fn new(cfg: &ProjectConfig) -> Self {
        let displacement_cc = cfg.engine.displacement_l * 1000.0;
        let cylinders = cfg.engine.cylinders.max(1) as f32;
        let req_fuel_ms = if cfg.injection.injector_flow_cc_min > 0.0 {
            (displacement_cc / cylinders / cfg.injection.injector_flow_cc_min) * 60_000.0
        } else {
            0.0
        };
        Self { req_fuel_ms, accel: AccelEnrichment::default(), ase: AseState::default(), dfco: DfcoState::default(), closed_loop: ClosedLoopTrim::default() }
    }

    /// Run one 10 ms tick of the pipeline.
    pub fn step(&mut self, cfg: &ProjectConfig, tables: &FuelSparkTables, input: &FuelSparkInput) -> FuelSparkOutput {
        if input.cranking {
            // ASE/DFCO/accel state does not advance while cranking.
            return FuelSparkOutput {
                inj_pw_us: DEFAULT_CRANKING_PW_US,
                target_afr: CRANKING_TARGET_AFR,
                spark_advance_deg: 0.0,
                ase_active: false,
                ase_pct_remaining: 0.0,
                fuel_cut: false,
            };
        }

        let ve_pct = tables.ve.map_or(DEFAULT_VE_PCT, |t| t.lookup(input.rpm as f32, input.map_kpa));
        let target_afr = tables.afr.map_or(STOICH_AFR, |t| t.lookup(input.rpm as f32, input.map_kpa));
        let spark_advance_deg = tables.spark.map_or(0.0, |t| t.lookup(input.rpm as f32, input.map_kpa));

        let mut pw = self.req_fuel_ms * 1000.0 * (ve_pct / 100.0) * (STOICH_AFR / target_afr);

        pw *= warmup::warmup_multiplier(input.clt_f);
        pw += self.accel.update(input.tps_pct);

        let ase_status = self.ase.update(input.now_ms, input.running, input.clt_f, &cfg.ase);
        if ase_status.active {
            pw *= 1.0 + ase_status.pct_remaining / 100.0;
        }

        if ClosedLoopTrim::in_window(input.rpm, input.map_kpa, &cfg.closed_loop) {
            let trim = self.closed_loop.update(target_afr, input.afr_actual, input.bank_valid, &cfg.closed_loop);
            pw *= 1.0 + trim;
        }

        let fuel_cut = self.dfco.update(input.now_ms, input.rpm, input.tps_pct, &cfg.dfco);
        if fuel_cut {
            pw = 0.0;
        }

        let inj_pw_us = pw.clamp(PW_CLAMP_MIN_US, PW_CLAMP_MAX_US);

        FuelSparkOutput {
            inj_pw_us,
            target_afr,
            spark_advance_deg,
            ase_active: ase_status.active,
            ase_pct_remaining: ase_status.pct_remaining,
            fuel_cut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ProjectConfig {
        use ecu_common::config::*;
        ProjectConfig {
            engine: EngineGeometry { cylinders: 4, firing_order: vec![1, 3, 4, 2], crank_teeth: 36, crank_missing: 1, has_cam: true, displacement_l: 2.0 },
            injection: InjectionConfig { injector_flow_cc_min: 250.0, injector_dead_time_ms: 1.0 },
            ignition: IgnitionConfig { rev_limit_rpm: 6_000, max_dwell_ms: 4.0 },
            alternator: AlternatorConfig { target_voltage: 14.2, kp: 10.0, ki: 2.0, kd: 0.0 },
            closed_loop: ClosedLoopWindow { min_rpm: 1_200, max_rpm: 4_500, max_map_kpa: 80.0, kp: 0.05, ki: 0.01 },
            ase: AseConfig { initial_pct: 35.0, duration_ms: 10_000, min_clt_f: 100.0 },
            dfco: DfcoConfig { rpm_threshold: 2_500, tps_threshold: 3.0, entry_delay_ms: 500, exit_rpm: 1_800, exit_tps: 5.0 },
            rev_limit_curve: Curve6 { x: [32.0, 60.0, 100.0, 140.0, 180.0, 220.0], y: [3000.0, 4000.0, 5000.0, 6000.0, 6000.0, 6000.0] },
            limp: LimpThresholds {
                limp_rev_limit: 3_000,
                limp_advance_cap: 10.0,
                limp_recovery_ms: 5_000,
                limp_map_min: 10.0,
                limp_map_max: 110.0,
                limp_tps_min: 0.0,
                limp_tps_max: 100.0,
                limp_clt_max: 280.0,
                limp_iat_max: 200.0,
                limp_vbat_min: 9.0,
            },
            oil_pressure: OilPressureConfig { digital_mode: true, active_low: true, pin: 15, adc_channel: 2, min_psi: 0.0, max_psi: 0.0, startup_delay_ms: 3_000 },
            wideband_enabled: true,
            wideband_pins: None,
            transmission: TransmissionType::None,
            fuel_pump_prime_ms: 3_000,
            pins: PinMap { coil_pins: vec![10, 11, 12, 13], injector_pins: vec![20, 21, 22, 23], cel_pin: Some(30) },
        }
    }

    #[test]
    fn cranking_branch_returns_fixed_values() {
        let cfg = sample_config();
        let mut compute = FuelSparkCompute::new(&cfg);
        let input = FuelSparkInput {
            now_ms: 0,
            rpm: 250,
            map_kpa: 95.0,
            tps_pct: 0.0,
            clt_f: 50.0,
            running: false,
            cranking: true,
            afr_actual: [14.7, 14.7],
            bank_valid: [false, false],
        };
        let out = compute.step(&cfg, &FuelSparkTables::default(), &input);
        assert_eq!(out.inj_pw_us, DEFAULT_CRANKING_PW_US);
        assert_eq!(out.target_afr, CRANKING_TARGET_AFR);
    }

    #[test]
    fn target_afr_defaults_to_stoich_without_a_table() {
        let cfg = sample_config();
        let mut compute = FuelSparkCompute::new(&cfg);
        let input = FuelSparkInput {
            now_ms: 0,
            rpm: 2_000,
            map_kpa: 50.0,
            tps_pct: 20.0,
            clt_f: 180.0,
            running: true,
            cranking: false,
            afr_actual: [14.7, 14.7],
            bank_valid: [false, false],
        };
        let out = compute.step(&cfg, &FuelSparkTables::default(), &input);
        assert_eq!(out.target_afr, STOICH_AFR);
    }

    #[test]
    fn pulse_width_is_clamped_within_bounds() {
        let cfg = sample_config();
        let mut compute = FuelSparkCompute::new(&cfg);
        let input = FuelSparkInput {
            now_ms: 0,
            rpm: 2_000,
            map_kpa: 50.0,
            tps_pct: 20.0,
            clt_f: 180.0,
            running: true,
            cranking: false,
            afr_actual: [14.7, 14.7],
            bank_valid: [false, false],
        };
        let out = compute.step(&cfg, &FuelSparkTables::default(), &input);
        assert!(out.inj_pw_us >= PW_CLAMP_MIN_US && out.inj_pw_us <= PW_CLAMP_MAX_US);
    }

    #[test]
    fn dfco_zeros_pulse_width_once_debounced() {
        let cfg = sample_config();
        let mut compute = FuelSparkCompute::new(&cfg);
        let mut input = FuelSparkInput {
            now_ms: 0,
            rpm: 3_000,
            map_kpa: 20.0,
            tps_pct: 0.0,
            clt_f: 180.0,
            running: true,
            cranking: false,
            afr_actual: [14.7, 14.7],
            bank_valid: [false, false],
        };
        let mut last = compute.step(&cfg, &FuelSparkTables::default(), &input);
        assert!(!last.fuel_cut);
        input.now_ms = 600;
        last = compute.step(&cfg, &FuelSparkTables::default(), &input);
        assert!(last.fuel_cut);
        assert_eq!(last.inj_pw_us, 0.0);
    }
}
