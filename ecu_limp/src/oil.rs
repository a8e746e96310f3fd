//! Oil-pressure monitor: converts the configured digital switch or analog
//! sender into PSI plus a fault flag, gated by an engine-run startup delay.

use ecu_common::config::OilPressureConfig;
use ecu_common::consts::{OIL_PRESSURE_ANALOG_V_MAX, OIL_PRESSURE_ANALOG_V_MIN};
use ecu_hal::{AdcReader, GpioPort, Level};

/// One tick's oil-pressure reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct OilPressureReading {
    /// Converted pressure, PSI (`0.0` while disabled or within the startup delay).
    pub psi: f32,
    /// `true` when pressure is below the configured fault threshold.
    pub low: bool,
}

/// Tracks the engine-run startup delay and reads the configured oil-pressure
/// source each tick. Faulting is suppressed until the engine has been
/// running continuously for `OilPressureConfig::startup_delay_ms`, avoiding
/// cold-start false positives before oil pressure has built up.
#[derive(Default)]
pub struct OilPressureMonitor {
    was_running: bool,
    run_start_ms: u64,
}

impl OilPressureMonitor {
    /// Create a monitor with no run history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configured source and apply the startup-delay gate.
    /// Returns the reading and whether it should feed the limp bitmask.
    pub fn update(
        &mut self,
        now_ms: u64,
        running: bool,
        cfg: &OilPressureConfig,
        gpio: &dyn GpioPort,
        adc: &mut dyn AdcReader,
    ) -> (OilPressureReading, bool) {
        if !running {
            self.was_running = false;
            return (OilPressureReading::default(), false);
        }
        if !self.was_running {
            self.run_start_ms = now_ms;
            self.was_running = true;
        }
        if now_ms.saturating_sub(self.run_start_ms) < cfg.startup_delay_ms {
            return (OilPressureReading::default(), false);
        }

        if cfg.digital_mode {
            let level = match gpio.read(cfg.pin) {
                Ok(level) => level,
                Err(err) => {
                    tracing::warn!(%err, "oil pressure switch read failed");
                    Level::Low
                }
            };
            let low = if cfg.active_low { !level.is_high() } else { level.is_high() };
            let psi = if low { 0.0 } else { cfg.max_psi };
            (OilPressureReading { psi, low }, low)
        } else {
            let volts = match adc.read_millivolts(cfg.adc_channel) {
                Ok(mv) => mv / 1000.0,
                Err(err) => {
                    tracing::warn!(%err, "oil pressure sender read failed");
                    0.0
                }
            };
            let span = OIL_PRESSURE_ANALOG_V_MAX - OIL_PRESSURE_ANALOG_V_MIN;
            let psi = ((volts - OIL_PRESSURE_ANALOG_V_MIN) / span * cfg.max_psi).clamp(0.0, cfg.max_psi);
            let low = psi < cfg.min_psi;
            (OilPressureReading { psi, low }, low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_hal::sim::{SimAdc, SimGpio};
    use ecu_hal::GpioMode;

    fn digital_cfg() -> OilPressureConfig {
        OilPressureConfig { digital_mode: true, active_low: true, pin: 9, adc_channel: 0, min_psi: 10.0, max_psi: 100.0, startup_delay_ms: 3_000 }
    }

    fn analog_cfg() -> OilPressureConfig {
        OilPressureConfig { digital_mode: false, active_low: false, pin: 0, adc_channel: 2, min_psi: 10.0, max_psi: 100.0, startup_delay_ms: 3_000 }
    }

    #[test]
    fn not_running_resets_and_never_faults() {
        let mut mon = OilPressureMonitor::new();
        let cfg = digital_cfg();
        let mut gpio = SimGpio::new();
        gpio.set_mode(cfg.pin, GpioMode::Input).unwrap();
        let mut adc = SimAdc::new();
        let (reading, fault) = mon.update(0, false, &cfg, &gpio, &mut adc);
        assert_eq!(reading.psi, 0.0);
        assert!(!fault);
    }

    #[test]
    fn digital_fault_suppressed_within_startup_delay() {
        let mut mon = OilPressureMonitor::new();
        let cfg = digital_cfg();
        let mut gpio = SimGpio::new();
        gpio.set_mode(cfg.pin, GpioMode::Input).unwrap();
        // Active-low switch reading LOW == low pressure, but still within
        // the 3s startup delay from the first running tick.
        let mut adc = SimAdc::new();
        let (_, fault) = mon.update(0, true, &cfg, &gpio, &mut adc);
        assert!(!fault);
        let (_, fault) = mon.update(2_999, true, &cfg, &gpio, &mut adc);
        assert!(!fault);
    }

    #[test]
    fn digital_fault_after_startup_delay() {
        let mut mon = OilPressureMonitor::new();
        let cfg = digital_cfg();
        let mut gpio = SimGpio::new();
        gpio.set_mode(cfg.pin, GpioMode::Input).unwrap();
        // Level defaults to Low, active_low => low pressure.
        let mut adc = SimAdc::new();
        mon.update(0, true, &cfg, &gpio, &mut adc);
        let (reading, fault) = mon.update(3_000, true, &cfg, &gpio, &mut adc);
        assert!(fault);
        assert_eq!(reading.psi, 0.0);
    }

    #[test]
    fn digital_no_fault_once_switch_reads_high() {
        let mut mon = OilPressureMonitor::new();
        let cfg = digital_cfg();
        let mut gpio = SimGpio::new();
        gpio.set_mode(cfg.pin, GpioMode::Input).unwrap();
        gpio.write(cfg.pin, Level::High).unwrap();
        let mut adc = SimAdc::new();
        mon.update(0, true, &cfg, &gpio, &mut adc);
        let (reading, fault) = mon.update(3_000, true, &cfg, &gpio, &mut adc);
        assert!(!fault);
        assert_eq!(reading.psi, cfg.max_psi);
    }

    #[test]
    fn analog_converts_linear_0_5v_to_0_psi() {
        let mut mon = OilPressureMonitor::new();
        let cfg = analog_cfg();
        let gpio = SimGpio::new();
        let mut adc = SimAdc::new();
        adc.set_millivolts(cfg.adc_channel, 500.0);
        mon.update(0, true, &cfg, &gpio, &mut adc);
        let (reading, fault) = mon.update(3_000, true, &cfg, &gpio, &mut adc);
        assert!((reading.psi - 0.0).abs() < 1e-3);
        assert!(fault); // below min_psi
    }

    #[test]
    fn analog_converts_linear_4_5v_to_max_psi() {
        let mut mon = OilPressureMonitor::new();
        let cfg = analog_cfg();
        let gpio = SimGpio::new();
        let mut adc = SimAdc::new();
        adc.set_millivolts(cfg.adc_channel, 4_500.0);
        mon.update(0, true, &cfg, &gpio, &mut adc);
        let (reading, fault) = mon.update(3_000, true, &cfg, &gpio, &mut adc);
        assert!((reading.psi - cfg.max_psi).abs() < 1e-3);
        assert!(!fault);
    }
}
