//! End-to-end scenarios driving `SlowLoop` directly against `Sim*` HAL
//! backends, the way `ecu_scheduler::runner`'s own tests drive
//! `CrankDecoder::on_tooth_edge` to get a deterministic RPM instead of
//! depending on the background `sim_engine` edge generator's timing.

use std::sync::Arc;

use ecu_common::config::{
    AlternatorConfig, AseConfig, ClosedLoopWindow, Curve6, DfcoConfig, EngineGeometry, IgnitionConfig,
    InjectionConfig, LimpThresholds, OilPressureConfig, PinMap, ProjectConfig, TransmissionType, WidebandPinsConfig,
};
use ecu_common::consts::{CONDENSATION_DURATION_MS, DEFAULT_CRANKING_PW_US, RAMP_END_VOLTAGE, RAMP_RATE_V_PER_SEC, RAMP_START_VOLTAGE, WIDEBAND_TICK_MS};
use ecu_common::error::FaultAction;
use ecu_decoder::{CamDecoder, CrankDecoder};
use ecu_hal::sim::{SimAdc, SimGpio, SimPwm, SimSpi};
use ecu_hal::{GpioMode, GpioPort, Level};
use ecu_sensors::descriptor::{CalKind, EnginePhase, SensorDescriptor, SensorRole, SourceKind};
use ecu_sensors::SensorLayer;
use ecu_state::EngineStateBus;
use ecu_wideband::heater::BankHal;

use ecu_engine::slow_loop::{SlowLoop, SlowLoopHal};

const MAP_CH: u8 = 0;
const TPS_CH: u8 = 1;
const CLT_CH: u8 = 2;
const IAT_CH: u8 = 3;
const VBAT_CH: u8 = 4;
const OIL_PIN: u32 = 50;
const CEL_PIN: u32 = 51;

fn sample_cfg() -> ProjectConfig {
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
        oil_pressure: OilPressureConfig { digital_mode: true, active_low: true, pin: OIL_PIN, adc_channel: 0, min_psi: 0.0, max_psi: 100.0, startup_delay_ms: 0 },
        wideband_enabled: false,
        wideband_pins: None,
        transmission: TransmissionType::None,
        fuel_pump_prime_ms: 3_000,
        pins: PinMap { coil_pins: vec![10, 11, 12, 13], injector_pins: vec![20, 21, 22, 23], cel_pin: Some(CEL_PIN) },
    }
}

const UA_CH: [u8; 2] = [10, 11];
const UR_CH: [u8; 2] = [12, 13];

/// A much bigger injector than `sample_cfg`'s, so `REQ_FUEL` (driven by
/// swept volume vs. flow rate) lands well under `PW_CLAMP_MAX_US` instead
/// of saturating it — leaving headroom for the closed-loop trim test to
/// actually observe pulse width moving.
fn wideband_cfg() -> ProjectConfig {
    ProjectConfig {
        wideband_enabled: true,
        wideband_pins: Some(WidebandPinsConfig { cs_pins: [70, 71], ua_channels: UA_CH, ur_channels: UR_CH }),
        injection: InjectionConfig { injector_flow_cc_min: 1_500_000.0, injector_dead_time_ms: 1.0 },
        ..sample_cfg()
    }
}

fn passthrough(name: &str, role: SensorRole, channel: u8, error_min: Option<f32>, error_max: Option<f32>) -> SensorDescriptor {
    SensorDescriptor {
        name: name.to_string(),
        unit: String::new(),
        role,
        source: SourceKind::OnChipAdc { channel },
        cal: CalKind::Raw,
        ema_alpha: 1.0,
        avg_samples: 1,
        error_min,
        error_max,
        warn_min: None,
        warn_max: None,
        settle_guard: 0.0,
        fault_bit: 0xFF,
        fault_action: FaultAction::None,
        active_states: EnginePhase::ALL,
    }
}

/// A passthrough descriptor whose error-bound breach feeds `LimpArbiter`
/// (`fault_bit` 0 — distinct from the others, which stay unmapped).
fn limp_mapped(name: &str, role: SensorRole, channel: u8, error_min: Option<f32>, error_max: Option<f32>) -> SensorDescriptor {
    SensorDescriptor { fault_bit: 0, fault_action: FaultAction::Limp, ..passthrough(name, role, channel, error_min, error_max) }
}

/// Build a `SlowLoop` over Sim backends, plus the `CrankDecoder` used to
/// drive it to a target RPM and the `SimAdc`/`SimGpio` handles tests seed
/// sensor values through.
fn harness(cfg: ProjectConfig) -> (SlowLoop, Arc<std::sync::Mutex<CrankDecoder>>, SimAdc) {
    let descriptors = vec![
        passthrough("map", SensorRole::MapKpa, MAP_CH, Some(5.0), Some(115.0)),
        passthrough("tps", SensorRole::TpsPct, TPS_CH, None, None),
        limp_mapped("clt", SensorRole::CltF, CLT_CH, Some(-40.0), Some(280.0)),
        passthrough("iat", SensorRole::IatF, IAT_CH, None, None),
        passthrough("vbat", SensorRole::VbatV, VBAT_CH, None, None),
    ];
    let sensor_layer = SensorLayer::new(descriptors, Vec::new());

    let adc = SimAdc::new();
    adc.set_millivolts(MAP_CH, 100.0);
    adc.set_millivolts(TPS_CH, 0.0);
    adc.set_millivolts(CLT_CH, 180.0);
    adc.set_millivolts(IAT_CH, 70.0);
    adc.set_millivolts(VBAT_CH, 14.0);

    let crank_decoder = Arc::new(std::sync::Mutex::new(CrankDecoder::new(cfg.engine.crank_teeth as u32, cfg.engine.crank_missing as u32)));
    let crank_counters = crank_decoder.lock().unwrap().counters();
    let cam_decoder = Arc::new(CamDecoder::new(cfg.engine.crank_teeth as u32, crank_counters.clone()));
    let bus = Arc::new(EngineStateBus::new());

    let hal = SlowLoopHal {
        sensor_hal: ecu_sensors::SensorHal {
            onchip_adc: Box::new(adc.clone()),
            external_adc16: Vec::new(),
            external_adc12: Vec::new(),
            gpio: Box::new(SimAdcGpio::default()),
        },
        wideband_hal: None,
        alternator_pwm: Box::new(ecu_hal::sim::SimPwm::new()),
        oil_gpio: Box::new(fresh_oil_cel_gpio()),
        oil_adc: Box::new(adc.clone()),
        cel_gpio: Box::new(fresh_oil_cel_gpio()),
    };

    let slow_loop = SlowLoop::new(cfg, crank_counters, cam_decoder, bus, sensor_layer, None, None, None, hal);
    (slow_loop, crank_decoder, adc)
}

/// Build a `SlowLoop` wired for both wideband banks, already past
/// `begin()` (heater state machines sitting in `WaitPower`). Shares the
/// same `SimAdc` across sensors, oil, and the UA/UR channels, the way
/// `ecu_engine::run` shares one ADC across its whole HAL.
fn harness_with_wideband(cfg: ProjectConfig) -> (SlowLoop, Arc<std::sync::Mutex<CrankDecoder>>, SimAdc) {
    let descriptors = vec![
        passthrough("map", SensorRole::MapKpa, MAP_CH, Some(5.0), Some(115.0)),
        passthrough("tps", SensorRole::TpsPct, TPS_CH, None, None),
        limp_mapped("clt", SensorRole::CltF, CLT_CH, Some(-40.0), Some(280.0)),
        passthrough("iat", SensorRole::IatF, IAT_CH, None, None),
        passthrough("vbat", SensorRole::VbatV, VBAT_CH, None, None),
    ];
    let sensor_layer = SensorLayer::new(descriptors, Vec::new());

    let adc = SimAdc::new();
    adc.set_millivolts(MAP_CH, 100.0);
    adc.set_millivolts(TPS_CH, 0.0);
    adc.set_millivolts(CLT_CH, 180.0);
    adc.set_millivolts(IAT_CH, 70.0);
    adc.set_millivolts(VBAT_CH, 12.0);

    let crank_decoder = Arc::new(std::sync::Mutex::new(CrankDecoder::new(cfg.engine.crank_teeth as u32, cfg.engine.crank_missing as u32)));
    let crank_counters = crank_decoder.lock().unwrap().counters();
    let cam_decoder = Arc::new(CamDecoder::new(cfg.engine.crank_teeth as u32, crank_counters.clone()));
    let bus = Arc::new(EngineStateBus::new());

    let bank_hals: [BankHal; 2] = std::array::from_fn(|i| BankHal {
        spi: Box::new(SimSpi::default()),
        cs_gpio: Box::new(fresh_oil_cel_gpio()),
        cs_pin: 0,
        ua_adc: Box::new(adc.clone()),
        ua_channel: UA_CH[i],
        ur_adc: Box::new(adc.clone()),
        ur_channel: UR_CH[i],
        heater_pwm: Box::new(SimPwm::new()),
    });

    let hal = SlowLoopHal {
        sensor_hal: ecu_sensors::SensorHal {
            onchip_adc: Box::new(adc.clone()),
            external_adc16: Vec::new(),
            external_adc12: Vec::new(),
            gpio: Box::new(SimAdcGpio::default()),
        },
        wideband_hal: Some(bank_hals),
        alternator_pwm: Box::new(SimPwm::new()),
        oil_gpio: Box::new(fresh_oil_cel_gpio()),
        oil_adc: Box::new(adc.clone()),
        cel_gpio: Box::new(fresh_oil_cel_gpio()),
    };

    let mut slow_loop = SlowLoop::new(cfg, crank_counters, cam_decoder, bus, sensor_layer, None, None, None, hal);
    slow_loop.begin(0).unwrap();
    (slow_loop, crank_decoder, adc)
}

/// `SensorHal::gpio` is never exercised by these tests (no `Digital` source
/// sensors are configured) but the field is mandatory; a no-op stub avoids
/// sharing the real `SimGpio` bank just to satisfy the type.
#[derive(Default, Clone)]
struct SimAdcGpio;

impl GpioPort for SimAdcGpio {
    fn set_mode(&mut self, _pin: u32, _mode: GpioMode) -> Result<(), ecu_hal::HalError> {
        Ok(())
    }
    fn write(&mut self, _pin: u32, _level: Level) -> Result<(), ecu_hal::HalError> {
        Ok(())
    }
    fn read(&self, _pin: u32) -> Result<Level, ecu_hal::HalError> {
        Ok(Level::Low)
    }
    fn attach_edge_interrupt(&mut self, _pin: u32, _edge: ecu_hal::Edge, _handler: ecu_hal::EdgeHandler) -> Result<(), ecu_hal::HalError> {
        Ok(())
    }
}

/// Drive `dec` through two revolutions at the period implying `rpm`, via
/// the same missing-tooth sequence `ecu_scheduler`'s tests use. Two matched
/// gaps are required: one revolution only reaches `Syncing` from `Lost`; a
/// second confirms the tooth count and reaches (or stays) `Synced`. A brand
/// new decoder silently treats its very first edge as a timing reference
/// (no period, no state change) rather than a real tooth — harmless here
/// since `Lost` only acts on the gap edge, not on ordinary tooth count.
///
/// `on_tooth_edge` derives RPM from whatever period it just measured, so a
/// call ending on the inflated gap period would leave `rpm()` reading low;
/// one trailing ordinary-period edge after the last gap restores it to the
/// real per-tooth value before the caller reads it.
fn spin_to_rpm(dec: &std::sync::Mutex<CrankDecoder>, t: &mut u64, rpm: u32, total_teeth: u32, missing: u32) {
    let mut dec = dec.lock().unwrap();
    let period_us = (60_000_000u64 / (rpm as u64 * total_teeth as u64)) as u32;
    let expected_teeth = total_teeth - missing;
    for _ in 0..2 {
        for _ in 0..(expected_teeth - 1) {
            *t += period_us as u64;
            dec.on_tooth_edge(*t);
        }
        *t += (period_us as f32 * 1.8) as u64;
        dec.on_tooth_edge(*t);
    }
    *t += period_us as u64;
    dec.on_tooth_edge(*t);
}

/// `SimGpio` isn't `Clone`; tests only need a bank that already has the
/// oil/CEL pins configured, so build a fresh one with the same fixed setup
/// rather than sharing state across HAL fields.
fn fresh_oil_cel_gpio() -> SimGpio {
    let mut g = SimGpio::new();
    g.set_mode(OIL_PIN, GpioMode::Input).unwrap();
    g.write(OIL_PIN, Level::High).unwrap();
    g.set_mode(CEL_PIN, GpioMode::Output).unwrap();
    g
}

#[test]
fn cold_start_cranking_then_running() {
    let (mut slow_loop, dec, adc) = harness(sample_cfg());
    adc.set_millivolts(CLT_CH, 40.0);
    let mut t = 0u64;

    spin_to_rpm(&dec, &mut t, 250, 36, 1);
    slow_loop.tick(t / 1000);
    let cranking_state = slow_loop_state(&slow_loop);
    assert!(cranking_state.cranking);
    assert!(!cranking_state.running);
    assert!((cranking_state.inj_pw_us - DEFAULT_CRANKING_PW_US).abs() < 1e-3);

    spin_to_rpm(&dec, &mut t, 900, 36, 1);
    slow_loop.tick(t / 1000);
    let running_state = slow_loop_state(&slow_loop);
    assert!(running_state.running);
    assert!(!running_state.cranking);
    assert!(running_state.ase_active);
    assert!((running_state.ase_pct_remaining - 35.0).abs() < 5.0);
}

#[test]
fn dfco_engages_above_threshold_and_releases_on_rpm_drop() {
    let (mut slow_loop, dec, adc) = harness(sample_cfg());
    adc.set_millivolts(TPS_CH, 0.0);
    let mut t = 0u64;

    spin_to_rpm(&dec, &mut t, 3_000, 36, 1);
    slow_loop.tick(t / 1000);

    // Hold rpm=3000/tps=0 across the entry delay.
    for _ in 0..70 {
        spin_to_rpm(&dec, &mut t, 3_000, 36, 1);
        slow_loop.tick(t / 1000);
    }
    assert!(slow_loop_state(&slow_loop).fuel_cut);

    spin_to_rpm(&dec, &mut t, 1_700, 36, 1);
    slow_loop.tick(t / 1000);
    assert!(!slow_loop_state(&slow_loop).fuel_cut);
}

#[test]
fn limp_enters_on_clt_fault_and_recovers_after_dwell() {
    let (mut slow_loop, dec, adc) = harness(sample_cfg());
    let mut t = 0u64;

    spin_to_rpm(&dec, &mut t, 2_000, 36, 1);
    adc.set_millivolts(CLT_CH, 300.0);
    slow_loop.tick(t / 1000);
    assert!(slow_loop_state(&slow_loop).limp_mode);

    adc.set_millivolts(CLT_CH, 180.0);
    for _ in 0..600 {
        t += 10_000;
        slow_loop.tick(t / 1000);
    }
    assert!(!slow_loop_state(&slow_loop).limp_mode);
}

/// Total wall-clock time from `begin()` for a wideband bank to clear
/// condensation and finish its heater voltage ramp into `Pid`.
fn wideband_warmup_ms() -> u64 {
    CONDENSATION_DURATION_MS + ((RAMP_END_VOLTAGE - RAMP_START_VOLTAGE) / RAMP_RATE_V_PER_SEC * 1000.0) as u64
}

#[test]
fn wideband_bank_warms_through_condensation_and_ramp_to_pid() {
    let (mut slow_loop, _dec, adc) = harness_with_wideband(wideband_cfg());
    adc.set_millivolts(UA_CH[0], 1500.5); // lambda ~1.0 once readings start counting
    adc.set_millivolts(UR_CH[0], 500.0);
    // `t` stays in microseconds throughout, same base `spin_to_rpm` uses, so
    // the two can be freely interleaved without skewing the crank decoder.
    let mut t = 0u64;
    let step_us = (WIDEBAND_TICK_MS / 10) * 1_000;

    while t / 1_000 < 4_000 {
        t += step_us;
        slow_loop.tick(t / 1_000);
    }
    assert_eq!(slow_loop.wideband().banks()[0].heater_state, ecu_wideband::HeaterState::Condensation);
    assert!(!slow_loop.wideband().ready(0));

    while t / 1_000 < wideband_warmup_ms() + 3_000 {
        t += step_us;
        slow_loop.tick(t / 1_000);
    }
    assert_eq!(slow_loop.wideband().banks()[0].heater_state, ecu_wideband::HeaterState::Pid);
    assert!(slow_loop.wideband().ready(0));
}

#[test]
fn closed_loop_trim_pulls_pulse_width_down_on_lean_feedback() {
    let (mut slow_loop, dec, adc) = harness_with_wideband(wideband_cfg());
    adc.set_millivolts(UA_CH[0], 1500.5);
    adc.set_millivolts(UR_CH[0], 500.0);
    adc.set_millivolts(UA_CH[1], 1500.5);
    adc.set_millivolts(UR_CH[1], 500.0);

    let mut t = 0u64;
    let step_us = (WIDEBAND_TICK_MS / 10) * 1_000;
    while t / 1_000 < wideband_warmup_ms() + 3_000 {
        t += step_us;
        slow_loop.tick(t / 1_000);
    }
    assert!(slow_loop.wideband().ready(0));

    adc.set_millivolts(MAP_CH, 50.0); // inside the closed-loop window's MAP gate
    spin_to_rpm(&dec, &mut t, 2_000, 36, 1);
    slow_loop.tick(t / 1000);
    let baseline_pw = slow_loop_state(&slow_loop).inj_pw_us;

    adc.set_millivolts(UA_CH[0], 1716.0); // ~15.5:1, leaner than the 14.7 target
    let mut last_pw = baseline_pw;
    for _ in 0..30 {
        spin_to_rpm(&dec, &mut t, 2_000, 36, 1);
        slow_loop.tick(t / 1000);
        last_pw = slow_loop_state(&slow_loop).inj_pw_us;
    }
    assert!(last_pw < baseline_pw);

    let converged = last_pw;
    spin_to_rpm(&dec, &mut t, 2_000, 36, 1);
    slow_loop.tick(t / 1000);
    let next_pw = slow_loop_state(&slow_loop).inj_pw_us;
    assert!((next_pw - converged).abs() < 1.0);
}

/// Reads back the `EngineState` `tick` just published, the same seam any
/// external observer (telemetry, the web UI) would use.
fn slow_loop_state(slow_loop: &SlowLoop) -> ecu_state::EngineState {
    slow_loop.bus().snapshot()
}
