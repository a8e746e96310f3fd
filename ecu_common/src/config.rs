//! `ProjectConfig` and the shared TOML `ConfigLoader` pattern.
//!
//! `SensorDescriptor`, `FaultRule`, and `TuneTable` have their own on-disk
//! shapes owned by `ecu_sensors` and `ecu_tables` respectively, persisted
//! as separate records; this module only owns the engine-geometry /
//! tuning-constant record, `ProjectConfig`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for any `serde::de::DeserializeOwned` type so a
/// bare `MyConfig::load(path)` works without boilerplate.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`ConfigError::FileNotFound`] if the file does not exist, or
    /// [`ConfigError::ParseError`] if the TOML cannot be parsed into `Self`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// `[engine]` — cylinder geometry and crank/cam trigger-wheel layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineGeometry {
    /// Cylinder count.
    pub cylinders: u8,
    /// 1-indexed firing order; length must equal `cylinders`.
    pub firing_order: Vec<u8>,
    /// Total crank-wheel teeth (N of an N−M wheel).
    pub crank_teeth: u8,
    /// Missing teeth at the sync gap (M of an N−M wheel).
    pub crank_missing: u8,
    /// Whether a cam phase sensor is fitted.
    pub has_cam: bool,
    /// Displacement, liters.
    pub displacement_l: f32,
}

/// `[injection]` — injector sizing and dead time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectionConfig {
    /// Injector static flow, cc/min.
    pub injector_flow_cc_min: f32,
    /// Injector dead time, ms.
    pub injector_dead_time_ms: f32,
}

/// `[ignition]` — dwell and rev-limit bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnitionConfig {
    /// Hard rev limit, RPM.
    pub rev_limit_rpm: u32,
    /// Maximum allowed dwell, ms (safety cutoff).
    pub max_dwell_ms: f32,
}

/// `[alternator]` — field-control PID terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternatorConfig {
    /// Target regulated voltage.
    pub target_voltage: f32,
    /// Proportional gain.
    pub kp: f32,
    /// Integral gain.
    pub ki: f32,
    /// Derivative gain.
    pub kd: f32,
}

/// `[closed_loop]` — activation window for O2 closed-loop trim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClosedLoopWindow {
    /// Minimum RPM for closed-loop activation.
    pub min_rpm: u32,
    /// Maximum RPM for closed-loop activation.
    pub max_rpm: u32,
    /// Maximum MAP (kPa) for closed-loop activation.
    pub max_map_kpa: f32,
    /// Proportional gain on AFR error.
    pub kp: f32,
    /// Integral gain on AFR error.
    pub ki: f32,
}

/// `[ase]` — after-start enrichment parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AseConfig {
    /// Initial enrichment percentage applied at the moment the engine starts running.
    #[serde(default = "default_ase_initial_pct")]
    pub initial_pct: f32,
    /// Duration over which `initial_pct` decays linearly to zero, ms.
    #[serde(default = "default_ase_duration_ms")]
    pub duration_ms: u32,
    /// ASE only begins if CLT is below this threshold, °F.
    #[serde(default = "default_ase_min_clt_f")]
    pub min_clt_f: f32,
}

fn default_ase_initial_pct() -> f32 {
    35.0
}
fn default_ase_duration_ms() -> u32 {
    10_000
}
fn default_ase_min_clt_f() -> f32 {
    100.0
}

/// `[dfco]` — deceleration fuel cutoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DfcoConfig {
    /// RPM above which DFCO may engage.
    #[serde(default = "default_dfco_rpm")]
    pub rpm_threshold: u32,
    /// TPS% below which DFCO may engage.
    #[serde(default = "default_dfco_tps")]
    pub tps_threshold: f32,
    /// Entry condition must hold continuously this long before cutting fuel, ms.
    #[serde(default = "default_dfco_entry_delay_ms")]
    pub entry_delay_ms: u32,
    /// RPM below which DFCO exits regardless of TPS.
    #[serde(default = "default_dfco_exit_rpm")]
    pub exit_rpm: u32,
    /// TPS% above which DFCO exits regardless of RPM.
    #[serde(default = "default_dfco_exit_tps")]
    pub exit_tps: f32,
}

fn default_dfco_rpm() -> u32 {
    2_500
}
fn default_dfco_tps() -> f32 {
    3.0
}
fn default_dfco_entry_delay_ms() -> u32 {
    500
}
fn default_dfco_exit_rpm() -> u32 {
    1_800
}
fn default_dfco_exit_tps() -> f32 {
    5.0
}

/// A 6-point piecewise-linear curve, e.g. the CLT-indexed rev-limit curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Curve6 {
    /// Monotonic x-axis (6 points).
    pub x: [f32; 6],
    /// Corresponding y-values (6 points).
    pub y: [f32; 6],
}

impl Curve6 {
    /// Piecewise-linear interpolation with edge clamping.
    pub fn interpolate(&self, x: f32) -> f32 {
        if x <= self.x[0] {
            return self.y[0];
        }
        let last = self.x.len() - 1;
        if x >= self.x[last] {
            return self.y[last];
        }
        for i in 0..last {
            if x >= self.x[i] && x <= self.x[i + 1] {
                let range = self.x[i + 1] - self.x[i];
                if range.abs() < 1e-3 {
                    return self.y[i];
                }
                let frac = (x - self.x[i]) / range;
                return self.y[i] + frac * (self.y[i + 1] - self.y[i]);
            }
        }
        self.y[last]
    }
}

/// `[limp]` — thresholds gating limp entry, and the degraded envelope itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimpThresholds {
    /// Rev limit while in limp mode.
    pub limp_rev_limit: u32,
    /// Spark advance cap while in limp mode, degrees.
    pub limp_advance_cap: f32,
    /// Time the aggregate fault bitmask must stay zero before limp exits, ms.
    pub limp_recovery_ms: u64,
    /// MAP range considered valid (kPa); outside this is a limp fault.
    pub limp_map_min: f32,
    /// See [`Self::limp_map_min`].
    pub limp_map_max: f32,
    /// TPS range considered valid (%); outside this is a limp fault.
    pub limp_tps_min: f32,
    /// See [`Self::limp_tps_min`].
    pub limp_tps_max: f32,
    /// CLT above this is a limp fault, °F.
    pub limp_clt_max: f32,
    /// IAT above this is a limp fault, °F.
    pub limp_iat_max: f32,
    /// VBAT below this is a limp fault, volts.
    pub limp_vbat_min: f32,
}

/// `[oil_pressure]` — sensing mode and fault thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OilPressureConfig {
    /// `true` for a digital switch, `false` for an analog sender.
    pub digital_mode: bool,
    /// Digital mode: `true` if the switch reads active-low.
    #[serde(default)]
    pub active_low: bool,
    /// Digital mode: GPIO pin the switch is wired to.
    #[serde(default)]
    pub pin: u32,
    /// Analog mode: ADC channel the sender is wired to.
    #[serde(default)]
    pub adc_channel: u8,
    /// Analog mode: fault threshold, PSI.
    #[serde(default)]
    pub min_psi: f32,
    /// Analog mode: pressure at 4.5 V, PSI.
    #[serde(default)]
    pub max_psi: f32,
    /// Startup delay before faulting is evaluated, ms.
    #[serde(default = "default_oil_pressure_startup_ms")]
    pub startup_delay_ms: u64,
}

fn default_oil_pressure_startup_ms() -> u64 {
    crate::consts::OIL_PRESSURE_STARTUP_MS_DEFAULT
}

/// `[transmission]` — selector for the out-of-scope shift-program collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionType {
    /// No automatic transmission control.
    None,
    /// 4-speed hydraulic automatic.
    FourSpeedAuto,
    /// 6-speed hydraulic automatic.
    SixSpeedAuto,
}

/// Fuel-pump priming duration at key-on, ms.
fn default_fuel_pump_prime_ms() -> u32 {
    3_000
}

/// `[pins]` — coil/injector GPIO pin map, cylinder-indexed.
///
/// Both vectors are indexed `[cylinder_number - 1]`; length must equal
/// `engine.cylinders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinMap {
    /// Ignition coil output pin per cylinder.
    pub coil_pins: Vec<u32>,
    /// Injector output pin per cylinder.
    pub injector_pins: Vec<u32>,
    /// Check-engine-light indicator output pin, driven by `LimpArbiter`.
    #[serde(default)]
    pub cel_pin: Option<u32>,
}

/// `[wideband_pins]` — chip-select and ADC channel wiring for the two
/// wideband banks. Only meaningful while `wideband_enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidebandPinsConfig {
    /// Chip-select GPIO pin, per bank.
    pub cs_pins: [u32; 2],
    /// Pump-current (UA) ADC channel, per bank.
    pub ua_channels: [u8; 2],
    /// Nernst-cell (UR) ADC channel, per bank.
    pub ur_channels: [u8; 2],
}

/// Top-level, immutable-during-operation project configuration.
///
/// Loaded once at startup by the external storage collaborator;
/// the core never mutates it except through explicit tune-table mutators
/// which operate on `ecu_tables::TuneTable`, not on this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Engine geometry.
    pub engine: EngineGeometry,
    /// Injector sizing.
    pub injection: InjectionConfig,
    /// Ignition bounds.
    pub ignition: IgnitionConfig,
    /// Alternator field-control PID.
    pub alternator: AlternatorConfig,
    /// Closed-loop O2 trim activation window and gains.
    pub closed_loop: ClosedLoopWindow,
    /// After-start enrichment.
    #[serde(default = "default_ase")]
    pub ase: AseConfig,
    /// Deceleration fuel cutoff.
    #[serde(default = "default_dfco")]
    pub dfco: DfcoConfig,
    /// CLT-indexed rev-limit curve (6 points).
    pub rev_limit_curve: Curve6,
    /// Limp-mode thresholds and envelope.
    pub limp: LimpThresholds,
    /// Oil pressure sensing.
    pub oil_pressure: OilPressureConfig,
    /// Whether wideband O2 is fitted/enabled.
    pub wideband_enabled: bool,
    /// Wideband bank chip-select/ADC wiring; required if `wideband_enabled`.
    #[serde(default)]
    pub wideband_pins: Option<WidebandPinsConfig>,
    /// Transmission type selector.
    pub transmission: TransmissionType,
    /// Fuel-pump prime duration at key-on, ms.
    #[serde(default = "default_fuel_pump_prime_ms")]
    pub fuel_pump_prime_ms: u32,
    /// Coil/injector GPIO pin map.
    pub pins: PinMap,
}

fn default_ase() -> AseConfig {
    AseConfig {
        initial_pct: default_ase_initial_pct(),
        duration_ms: default_ase_duration_ms(),
        min_clt_f: default_ase_min_clt_f(),
    }
}

fn default_dfco() -> DfcoConfig {
    DfcoConfig {
        rpm_threshold: default_dfco_rpm(),
        tps_threshold: default_dfco_tps(),
        entry_delay_ms: default_dfco_entry_delay_ms(),
        exit_rpm: default_dfco_exit_rpm(),
        exit_tps: default_dfco_exit_tps(),
    }
}

impl ProjectConfig {
    /// Validate the structural invariants `ProjectConfig` must hold.
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] on any violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.firing_order.len() != self.engine.cylinders as usize {
            return Err(ConfigError::ValidationError(format!(
                "firing_order has {} entries, expected {} (cylinders)",
                self.engine.firing_order.len(),
                self.engine.cylinders
            )));
        }
        if self.engine.crank_missing >= self.engine.crank_teeth {
            return Err(ConfigError::ValidationError(format!(
                "crank_missing ({}) must be < crank_teeth ({})",
                self.engine.crank_missing, self.engine.crank_teeth
            )));
        }
        if self.engine.cylinders == 0 || self.engine.cylinders as usize > crate::consts::MAX_CYLINDERS {
            return Err(ConfigError::ValidationError(format!(
                "cylinders={} out of range (1..={})",
                self.engine.cylinders,
                crate::consts::MAX_CYLINDERS
            )));
        }
        if self.closed_loop.min_rpm >= self.closed_loop.max_rpm {
            return Err(ConfigError::ValidationError(
                "closed_loop.min_rpm must be < closed_loop.max_rpm".into(),
            ));
        }
        if self.pins.coil_pins.len() != self.engine.cylinders as usize
            || self.pins.injector_pins.len() != self.engine.cylinders as usize
        {
            return Err(ConfigError::ValidationError(format!(
                "pins.coil_pins/injector_pins must each have {} entries (cylinders)",
                self.engine.cylinders
            )));
        }
        Ok(())
    }

    /// Per-tooth angle in degrees, always derived from `crank_teeth` — never
    /// a fixed 36-tooth assumption.
    pub fn degrees_per_tooth(&self) -> f32 {
        360.0 / self.engine.crank_teeth as f32
    }
}

/// Load `project.toml` from a directory and validate it in one step — the
/// entry point the external storage collaborator uses at startup.
///
/// # Errors
/// Propagates [`ConfigError`] from either the load or the validation step.
pub fn load_project(dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let cfg = ProjectConfig::load(&dir.join("project.toml"))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_toml() -> &'static str {
        r#"
[engine]
cylinders = 4
firing_order = [1, 3, 4, 2]
crank_teeth = 36
crank_missing = 1
has_cam = true
displacement_l = 2.0

[injection]
injector_flow_cc_min = 250.0
injector_dead_time_ms = 1.0

[ignition]
rev_limit_rpm = 6000
max_dwell_ms = 4.0

[alternator]
target_voltage = 14.2
kp = 10.0
ki = 2.0
kd = 0.0

[closed_loop]
min_rpm = 1200
max_rpm = 4500
max_map_kpa = 80.0
kp = 0.05
ki = 0.01

[rev_limit_curve]
x = [32, 60, 100, 140, 180, 220]
y = [3000, 4000, 5000, 6000, 6000, 6000]

[limp]
limp_rev_limit = 3000
limp_advance_cap = 10.0
limp_recovery_ms = 5000
limp_map_min = 10.0
limp_map_max = 110.0
limp_tps_min = 0.0
limp_tps_max = 100.0
limp_clt_max = 280.0
limp_iat_max = 200.0
limp_vbat_min = 9.0

[oil_pressure]
digital_mode = true
active_low = true

[pins]
coil_pins = [10, 11, 12, 13]
injector_pins = [20, 21, 22, 23]

wideband_enabled = true
transmission = "four_speed_auto"
"#
    }

    #[test]
    fn parses_and_validates_sample_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", sample_toml()).unwrap();
        file.flush().unwrap();

        let cfg = ProjectConfig::load(file.path()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.engine.cylinders, 4);
        assert_eq!(cfg.ase.initial_pct, 35.0); // default applied
        assert_eq!(cfg.dfco.rpm_threshold, 2500); // default applied
        assert!((cfg.degrees_per_tooth() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_firing_order_length_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        let bad = sample_toml().replace("[1, 3, 4, 2]", "[1, 3, 4]");
        write!(file, "{bad}").unwrap();
        file.flush().unwrap();

        let cfg = ProjectConfig::load(file.path()).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn rejects_missing_teeth_not_less_than_total() {
        let mut file = NamedTempFile::new().unwrap();
        let bad = sample_toml().replace("crank_missing = 1", "crank_missing = 36");
        write!(file, "{bad}").unwrap();
        file.flush().unwrap();

        let cfg = ProjectConfig::load(file.path()).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn curve6_interpolates_and_clamps() {
        let curve = Curve6 {
            x: [32.0, 60.0, 100.0, 140.0, 180.0, 220.0],
            y: [3000.0, 4000.0, 5000.0, 6000.0, 6000.0, 6000.0],
        };
        assert_eq!(curve.interpolate(0.0), 3000.0);
        assert_eq!(curve.interpolate(300.0), 6000.0);
        assert!((curve.interpolate(46.0) - 3500.0).abs() < 1e-3);
    }

    #[test]
    fn load_missing_file_reports_not_found() {
        let result = ProjectConfig::load(Path::new("/nonexistent/project.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
