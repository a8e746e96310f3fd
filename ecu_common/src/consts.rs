//! System-wide constants for the EVO-ECU workspace.
//!
//! Single source of truth for numeric limits shared across components.
//! Imported by all crates — no duplication permitted.

/// Maximum number of logical sensor slots.
pub const MAX_SENSOR_SLOTS: usize = 16;

/// Maximum number of fault rules.
pub const MAX_FAULT_RULES: usize = 16;

/// Maximum number of cylinders supported.
pub const MAX_CYLINDERS: usize = 12;

/// Minimum crank tooth period accepted as real (below this, treated as noise).
pub const MIN_TOOTH_PERIOD_US: u32 = 50;

/// Tooth period ring buffer depth used for the rolling average.
pub const TOOTH_PERIOD_RING_LEN: usize = 8;

/// Minimum bounded capacity of the optional tooth capture log.
pub const MIN_CAPTURE_LOG_LEN: usize = 720;

/// Clamp ceiling for computed RPM.
pub const RPM_MAX: u32 = 20_000;

/// Cam signal timeout — no edge within this window forces `phase = UNKNOWN`.
pub const CAM_SIGNAL_TIMEOUT_MS: u64 = 2_000;

/// Slow-loop tick period (SensorLayer → WidebandHeaterSM → FuelSparkCompute → LimpArbiter).
pub const SLOW_LOOP_PERIOD_MS: u64 = 10;

/// Wideband heater tick period, decimated from the slow loop.
pub const WIDEBAND_TICK_MS: u64 = 100;

/// External ADC / SPI conversion budget before a reading is abandoned for the tick.
pub const CONV_TIMEOUT_MS: u64 = 15;

/// Minimum battery voltage required to leave `WAIT_POWER`.
pub const MIN_BATTERY_VOLTAGE: f32 = 11.0;

/// Heater target voltage during CONDENSATION.
pub const CONDENSATION_VOLTAGE: f32 = 2.0;

/// Duration the heater holds at `CONDENSATION_VOLTAGE`.
pub const CONDENSATION_DURATION_MS: u64 = 5_000;

/// Heater ramp start voltage.
pub const RAMP_START_VOLTAGE: f32 = 8.5;

/// Heater ramp end voltage.
pub const RAMP_END_VOLTAGE: f32 = 13.0;

/// Heater ramp rate.
pub const RAMP_RATE_V_PER_SEC: f32 = 0.4;

/// Wideband heater PID proportional gain.
pub const WIDEBAND_PID_P: f32 = 120.0;
/// Wideband heater PID integral gain.
pub const WIDEBAND_PID_I: f32 = 0.8;
/// Wideband heater PID derivative gain.
pub const WIDEBAND_PID_D: f32 = 10.0;
/// Wideband heater PID integral clamp.
pub const WIDEBAND_PID_INTEGRAL_CLAMP: f32 = 250.0;

/// Stoichiometric AFR for gasoline.
pub const STOICH_AFR: f32 = 14.7;

/// Default pulse width while cranking.
pub const DEFAULT_CRANKING_PW_US: f32 = 5_000.0;

/// AFR target while cranking.
pub const CRANKING_TARGET_AFR: f32 = 12.0;

/// Default VE% used when a VE table is not loaded.
pub const DEFAULT_VE_PCT: f32 = 80.0;

/// Closed-loop O2 trim clamp (fractional, e.g. ±0.25).
pub const O2_TRIM_CLAMP: f32 = 0.25;

/// Final injector pulse width clamp, lower bound.
pub const PW_CLAMP_MIN_US: f32 = 0.0;
/// Final injector pulse width clamp, upper bound.
pub const PW_CLAMP_MAX_US: f32 = 25_000.0;

/// Acceleration enrichment trigger threshold, %TPS per tick.
pub const ACCEL_TPS_RATE_TRIGGER: f32 = 5.0;
/// Acceleration enrichment scale, µs added per %TPS/tick above trigger.
pub const ACCEL_ENRICH_SCALE: f32 = 50.0;
/// Acceleration enrichment per-tick decay factor.
pub const ACCEL_ENRICH_DECAY: f32 = 0.8;
/// Acceleration enrichment cutoff — below this the contribution is zeroed.
pub const ACCEL_ENRICH_FLOOR_US: f32 = 10.0;

/// Warmup enrichment: CLT at which full enrichment applies.
pub const WARMUP_COLD_F: f32 = 32.0;
/// Warmup enrichment: CLT at which enrichment reaches zero.
pub const WARMUP_HOT_F: f32 = 160.0;
/// Warmup enrichment fraction at `WARMUP_COLD_F`.
pub const WARMUP_MAX_PCT: f32 = 40.0;

/// Default oil-pressure startup delay before faulting is evaluated.
pub const OIL_PRESSURE_STARTUP_MS_DEFAULT: u64 = 3_000;

/// Oil pressure analog sender: voltage at 0 PSI.
pub const OIL_PRESSURE_ANALOG_V_MIN: f32 = 0.5;
/// Oil pressure analog sender: voltage at `max_psi`.
pub const OIL_PRESSURE_ANALOG_V_MAX: f32 = 4.5;

/// Alternator field control: battery voltage above which the field is
/// forced off regardless of target.
pub const ALTERNATOR_OVERVOLTAGE_CUTOFF_V: f32 = 15.0;
/// Alternator field control: PWM duty ceiling, percent.
pub const ALTERNATOR_MAX_DUTY_PCT: f32 = 95.0;
/// Alternator field PWM switching frequency.
pub const ALTERNATOR_PWM_FREQUENCY_HZ: u32 = 25_000;
/// Alternator field PWM duty resolution, bits.
pub const ALTERNATOR_PWM_RESOLUTION_BITS: u8 = 8;

/// Crank trigger input pin. Fixed by the board's interrupt wiring, not
/// user-configurable.
pub const CRANK_PIN: u32 = 1;
/// Cam phase input pin. Fixed by the board's interrupt wiring.
pub const CAM_PIN: u32 = 2;

/// Wire-level SPI command words for the wideband IC (CJ125-style transport).
pub mod wideband_spi {
    /// Identify request.
    pub const IDENT_REG_REQUEST: u16 = 0x4800;
    /// Diagnostic request.
    pub const DIAG_REG_REQUEST: u16 = 0x7800;
    /// Set mode: calibrate.
    pub const INIT_REG1_MODE_CALIBRATE: u16 = 0x569D;
    /// Set mode: normal (V=8 amplification).
    pub const INIT_REG1_MODE_NORMAL_V8: u16 = 0x5688;
    /// Diagnostic status: OK.
    pub const DIAG_REG_STATUS_OK: u16 = 0x28FF;
    /// High byte shared by all "informational" diagnostic patterns.
    pub const DIAG_STATUS_INFO_MASK: u16 = 0xFF00;
    /// High-byte value of the informational pattern (`0x28xx`).
    pub const DIAG_STATUS_INFO_VALUE: u16 = 0x2800;
}
