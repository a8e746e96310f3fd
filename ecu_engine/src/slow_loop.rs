//! The ~10ms cooperative slow loop: sensors, wideband heaters, alternator
//! regulation, fuel/spark computation, limp arbitration, then publish.

use std::sync::Arc;

use ecu_common::config::ProjectConfig;
use ecu_common::consts::SLOW_LOOP_PERIOD_MS;
use ecu_common::error::PeripheralFault;
use ecu_decoder::{CamDecoder, CamPhase, CrankCounters, SyncState};
use ecu_fuelspark::{FuelSparkCompute, FuelSparkInput, FuelSparkTables};
use ecu_hal::traits::{AdcReader, GpioPort, PwmChannel};
use ecu_limp::{AlternatorController, LimpArbiter, OilPressureMonitor};
use ecu_sensors::descriptor::SensorRole;
use ecu_sensors::{SensorHal, SensorLayer};
use ecu_state::{EngineState, EngineStateBus};
use ecu_tables::TuneTable;
use ecu_wideband::heater::BankHal;
use ecu_wideband::WidebandHeaterSM;
use tracing::warn;

/// Below this RPM a synced engine is considered cranking rather than
/// running.
const CRANKING_RPM_THRESHOLD: u32 = 400;

/// Everything the slow loop owns and drives once per tick.
pub struct SlowLoop {
    cfg: ProjectConfig,
    crank: Arc<CrankCounters>,
    cam: Arc<CamDecoder>,
    bus: Arc<EngineStateBus>,

    sensor_layer: SensorLayer,
    sensor_hal: SensorHal,

    wideband: WidebandHeaterSM,
    wideband_hal: Option<[BankHal; 2]>,

    alternator: AlternatorController,
    alternator_pwm: Box<dyn PwmChannel>,

    oil_monitor: OilPressureMonitor,
    oil_gpio: Box<dyn GpioPort>,
    oil_adc: Box<dyn AdcReader>,

    fuelspark: FuelSparkCompute,
    ve_table: Option<TuneTable>,
    afr_table: Option<TuneTable>,
    spark_table: Option<TuneTable>,

    limp: LimpArbiter,
    cel_gpio: Box<dyn GpioPort>,
}

/// Bundles the construction-time pieces the binary's wiring hands off to
/// `SlowLoop::new` in one place, since the list is long and purely
/// mechanical.
pub struct SlowLoopHal {
    pub sensor_hal: SensorHal,
    pub wideband_hal: Option<[BankHal; 2]>,
    pub alternator_pwm: Box<dyn PwmChannel>,
    pub oil_gpio: Box<dyn GpioPort>,
    pub oil_adc: Box<dyn AdcReader>,
    pub cel_gpio: Box<dyn GpioPort>,
}

impl SlowLoop {
    pub fn new(
        cfg: ProjectConfig,
        crank: Arc<CrankCounters>,
        cam: Arc<CamDecoder>,
        bus: Arc<EngineStateBus>,
        sensor_layer: SensorLayer,
        ve_table: Option<TuneTable>,
        afr_table: Option<TuneTable>,
        spark_table: Option<TuneTable>,
        hal: SlowLoopHal,
    ) -> Self {
        let fuelspark = FuelSparkCompute::new(&cfg);
        let alternator = AlternatorController::new(
            cfg.alternator.target_voltage,
            cfg.alternator.kp,
            cfg.alternator.ki,
            cfg.alternator.kd,
        );
        Self {
            cfg,
            crank,
            cam,
            bus,
            sensor_layer,
            sensor_hal: hal.sensor_hal,
            wideband: WidebandHeaterSM::default(),
            wideband_hal: hal.wideband_hal,
            alternator,
            alternator_pwm: hal.alternator_pwm,
            oil_monitor: OilPressureMonitor::new(),
            oil_gpio: hal.oil_gpio,
            oil_adc: hal.oil_adc,
            fuelspark,
            ve_table,
            afr_table,
            spark_table,
            limp: LimpArbiter::new(),
            cel_gpio: hal.cel_gpio,
        }
    }

    /// Bring the alternator PWM and (if fitted) wideband heaters to their
    /// initial state. Call once before the first `tick`.
    pub fn begin(&mut self, now_ms: u64) -> Result<(), ecu_hal::HalError> {
        self.alternator.begin(self.alternator_pwm.as_mut())?;
        if let Some(hals) = self.wideband_hal.as_mut() {
            self.wideband.begin(hals, now_ms);
        }
        Ok(())
    }

    /// Run one full slow-loop iteration.
    pub fn tick(&mut self, now_ms: u64) {
        let rpm = self.crank.rpm();
        let synced = self.crank.sync_state() == SyncState::Synced;
        let cranking = synced && rpm > 0 && rpm < CRANKING_RPM_THRESHOLD;
        let running = synced && rpm >= CRANKING_RPM_THRESHOLD;

        self.cam.update(now_ms * 1000);
        let sequential_mode = self.cam.counters().phase() != CamPhase::Unknown;

        let sensor_out = self.sensor_layer.update(&mut self.sensor_hal, now_ms, rpm, cranking, running);

        if let Some(hals) = self.wideband_hal.as_mut() {
            let vbat = self.sensor_layer.value_by_role(SensorRole::VbatV).unwrap_or(0.0);
            self.wideband.tick(hals, now_ms, vbat);
        }

        let battery_v = self.sensor_layer.value_by_role(SensorRole::VbatV).unwrap_or(0.0);
        if let Err(e) = self.alternator.update(self.alternator_pwm.as_mut(), now_ms, battery_v) {
            warn!("alternator PWM update failed: {e}");
        }

        let (oil_reading, oil_fault) =
            self.oil_monitor.update(now_ms, running, &self.cfg.oil_pressure, self.oil_gpio.as_ref(), self.oil_adc.as_mut());

        let mut afr_actual = [ecu_common::consts::STOICH_AFR; 2];
        let mut bank_valid = [false; 2];
        for (bank, out) in self.wideband.banks().iter().enumerate() {
            if self.wideband.ready(bank) {
                afr_actual[bank] = out.afr;
                bank_valid[bank] = true;
            }
        }
        let narrowband_roles = [SensorRole::O2Bank0, SensorRole::O2Bank1];
        for (bank, role) in narrowband_roles.into_iter().enumerate() {
            if !bank_valid[bank] {
                if let Some(v) = self.sensor_layer.value_by_role(role) {
                    afr_actual[bank] = v;
                }
            }
        }

        let map_kpa = self.sensor_layer.value_by_role(SensorRole::MapKpa).unwrap_or(100.0);
        let tps_pct = self.sensor_layer.value_by_role(SensorRole::TpsPct).unwrap_or(0.0);
        let clt_f = self.sensor_layer.value_by_role(SensorRole::CltF).unwrap_or(70.0);

        let tables = FuelSparkTables {
            ve: self.ve_table.as_ref(),
            afr: self.afr_table.as_ref(),
            spark: self.spark_table.as_ref(),
        };
        let fs_input = FuelSparkInput {
            now_ms,
            rpm,
            map_kpa,
            tps_pct,
            clt_f,
            running,
            cranking,
            afr_actual,
            bank_valid,
        };
        let fs_out = self.fuelspark.step(&self.cfg, &tables, &fs_input);

        let mut fault_bits: u32 = sensor_out.limp_bits;
        if oil_fault {
            fault_bits |= PeripheralFault::OIL_PRESSURE.bits();
        }
        if self.wideband.banks()[0].heater_state == ecu_wideband::heater::HeaterState::Error {
            fault_bits |= PeripheralFault::WIDEBAND_BANK0.bits();
        }
        if self.wideband.banks()[1].heater_state == ecu_wideband::heater::HeaterState::Error {
            fault_bits |= PeripheralFault::WIDEBAND_BANK1.bits();
        }

        let limp_out = self.limp.update(now_ms, fault_bits, clt_f, &self.cfg.limp, &self.cfg.rev_limit_curve, None);

        let cel_on = limp_out.cel || sensor_out.cel_bits != 0;
        if let Some(cel_pin) = self.cfg.pins.cel_pin {
            let level = if cel_on { ecu_hal::Level::High } else { ecu_hal::Level::Low };
            if let Err(e) = self.cel_gpio.write(cel_pin, level) {
                warn!("CEL pin write failed: {e}");
            }
        }

        let mut state = EngineState::default();
        state.rpm = rpm;
        state.tooth_position = self.crank.tooth_position();
        state.map_kpa = map_kpa;
        state.tps_pct = tps_pct;
        state.clt_f = clt_f;
        state.iat_f = self.sensor_layer.value_by_role(SensorRole::IatF).unwrap_or(70.0);
        state.vbat_v = battery_v;
        state.oil_psi = oil_reading.psi;
        state.afr = afr_actual;
        state.lambda = [self.wideband.banks()[0].lambda, self.wideband.banks()[1].lambda];
        state.o2_ready = bank_valid;
        state.target_afr = fs_out.target_afr;
        state.spark_advance_deg = fs_out.spark_advance_deg.min(limp_out.advance_cap);
        state.inj_pw_us = fs_out.inj_pw_us;
        state.running = running;
        state.cranking = cranking;
        state.sequential_mode = sequential_mode;
        state.limp_mode = limp_out.limp_mode;
        state.fault_bits = limp_out.fault_bits;
        state.ase_active = fs_out.ase_active;
        state.ase_pct_remaining = fs_out.ase_pct_remaining;
        state.fuel_cut = fs_out.fuel_cut;

        self.bus.publish(state);
    }

    /// The fixed cadence this loop expects to be driven at.
    pub const fn period_ms() -> u64 {
        SLOW_LOOP_PERIOD_MS
    }

    /// The published state bus, for tests and telemetry consumers that
    /// construct a `SlowLoop` directly instead of going through `run()`.
    pub fn bus(&self) -> &Arc<EngineStateBus> {
        &self.bus
    }

    /// The wideband heater state machine, for tests observing bank
    /// progress without waiting on `EngineState.o2_ready` alone.
    pub fn wideband(&self) -> &WidebandHeaterSM {
        &self.wideband
    }
}
