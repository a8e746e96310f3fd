//! Per-bank CJ125-style heater PID state machine.

use ecu_common::consts::{
    wideband_spi, CONDENSATION_DURATION_MS, CONDENSATION_VOLTAGE, MIN_BATTERY_VOLTAGE, RAMP_END_VOLTAGE,
    RAMP_RATE_V_PER_SEC, RAMP_START_VOLTAGE, STOICH_AFR, WIDEBAND_PID_D, WIDEBAND_PID_I, WIDEBAND_PID_INTEGRAL_CLAMP,
    WIDEBAND_PID_P, WIDEBAND_TICK_MS,
};
use ecu_hal::error::HalError;
use ecu_hal::traits::{AdcReader, GpioPort, Level, PwmChannel, SpiBus};

use crate::lambda::adc_to_lambda;

/// Heater/IC state for one wideband bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterState {
    /// Not yet begun.
    Idle,
    /// Waiting for battery voltage to clear `MIN_BATTERY_VOLTAGE`.
    WaitPower,
    /// Sending the calibrate command and capturing reference readings.
    Calibrating,
    /// Holding the heater at a fixed low voltage to boil off condensation.
    Condensation,
    /// Ramping heater voltage up to operating level.
    RampUp,
    /// Closed-loop heater control around the calibrated UR reference.
    Pid,
    /// Diagnostic fault; heater forced off until re-begin.
    Error,
}

/// Hardware bound to one bank: SPI transport, chip-select line, the two
/// ADC channels (pump current, Nernst cell), and the heater PWM output.
pub struct BankHal {
    /// SPI transport to the wideband IC.
    pub spi: Box<dyn SpiBus>,
    /// GPIO used to drive this bank's chip-select.
    pub cs_gpio: Box<dyn GpioPort>,
    /// Chip-select pin number on `cs_gpio`.
    pub cs_pin: u32,
    /// ADC backing the pump-current (UA) channel.
    pub ua_adc: Box<dyn AdcReader>,
    /// Channel index on `ua_adc`.
    pub ua_channel: u8,
    /// ADC backing the Nernst-cell (UR) channel.
    pub ur_adc: Box<dyn AdcReader>,
    /// Channel index on `ur_adc`.
    pub ur_channel: u8,
    /// Heater PWM output.
    pub heater_pwm: Box<dyn PwmChannel>,
}

impl BankHal {
    fn spi_transfer(&mut self, word: u16) -> Result<u16, HalError> {
        self.cs_gpio.write(self.cs_pin, Level::Low)?;
        let reply = self.spi.transfer16(word);
        self.cs_gpio.write(self.cs_pin, Level::High)?;
        reply
    }

    fn read_ua_10bit(&mut self) -> u16 {
        let mv = self.ua_adc.read_millivolts(self.ua_channel).unwrap_or(0.0);
        (mv * 1023.0 / 5000.0).clamp(0.0, 1023.0) as u16
    }

    fn read_ur_10bit(&mut self) -> u16 {
        let mv = self.ur_adc.read_millivolts(self.ur_channel).unwrap_or(0.0);
        (mv * 1023.0 / 5000.0).clamp(0.0, 1023.0) as u16
    }
}

/// Runtime state plus derived readings for one wideband bank.
pub struct WidebandBank {
    /// Current heater/IC state.
    pub heater_state: HeaterState,
    ua_ref: u16,
    ur_ref: u16,
    /// Last computed lambda (valid only once `ready()`).
    pub lambda: f32,
    /// Last computed AFR, `lambda * STOICH_AFR`.
    pub afr: f32,
    /// Last computed O2 percentage.
    pub oxygen_pct: f32,
    /// Current heater duty, 0..100%.
    pub heater_duty_pct: f32,
    ur_value: u16,
    ua_value: u16,
    diag_status: u16,
    heater_pwm_count: i32,
    pid_integral: f32,
    pid_prev_error: i32,
    ramp_voltage: f32,
    state_start_ms: u64,
}

impl Default for WidebandBank {
    fn default() -> Self {
        Self {
            heater_state: HeaterState::Idle,
            ua_ref: 0,
            ur_ref: 0,
            lambda: 0.0,
            afr: STOICH_AFR,
            oxygen_pct: 0.0,
            heater_duty_pct: 0.0,
            ur_value: 0,
            ua_value: 0,
            diag_status: 0,
            heater_pwm_count: 0,
            pid_integral: 0.0,
            pid_prev_error: 0,
            ramp_voltage: 0.0,
            state_start_ms: 0,
        }
    }
}

impl WidebandBank {
    /// Identify the IC, configure the heater PWM channel, and enter
    /// `WaitPower`.
    pub fn begin(&mut self, hal: &mut BankHal, now_ms: u64) {
        let _ = hal.heater_pwm.configure(100, 8);
        let _ = hal.heater_pwm.write_duty(0);
        if let Ok(ident) = hal.spi_transfer(wideband_spi::IDENT_REG_REQUEST) {
            tracing::info!(ident, "wideband IC identified");
        }
        *self = Self::default();
        self.heater_state = HeaterState::WaitPower;
        self.state_start_ms = now_ms;
    }

    /// `true` once the bank is producing a valid lambda reading.
    pub fn ready(&self) -> bool {
        self.heater_state == HeaterState::Pid
    }

    fn set_heater_voltage(&mut self, hal: &mut BankHal, target_v: f32, battery_v: f32) {
        let battery_v = battery_v.max(1.0);
        let duty = (target_v / battery_v).clamp(0.0, 1.0);
        self.heater_pwm_count = (duty * 255.0) as i32;
        self.heater_duty_pct = duty * 100.0;
        let _ = hal.heater_pwm.write_duty(self.heater_pwm_count as u32);
    }

    fn read_sensors(&mut self, hal: &mut BankHal) {
        self.ua_value = hal.read_ua_10bit();
        self.ur_value = hal.read_ur_10bit();
        self.diag_status = hal.spi_transfer(wideband_spi::DIAG_REG_REQUEST).unwrap_or(self.diag_status);
        if self.heater_state == HeaterState::Pid {
            self.lambda = adc_to_lambda(self.ua_value);
            self.afr = self.lambda * STOICH_AFR;
            self.oxygen_pct = if self.lambda > 1.0 { (1.0 - 1.0 / self.lambda) * 20.95 } else { 0.0 };
        }
    }

    fn diag_is_error(&self) -> bool {
        self.diag_status != wideband_spi::DIAG_REG_STATUS_OK
            && self.diag_status != 0
            && (self.diag_status & wideband_spi::DIAG_STATUS_INFO_MASK) != wideband_spi::DIAG_STATUS_INFO_VALUE
    }

    /// Advance the state machine by one 100 ms wideband tick.
    pub fn update(&mut self, hal: &mut BankHal, now_ms: u64, battery_v: f32) {
        let elapsed = now_ms.saturating_sub(self.state_start_ms);
        match self.heater_state {
            HeaterState::Idle => {}

            HeaterState::WaitPower => {
                if battery_v >= MIN_BATTERY_VOLTAGE {
                    self.heater_state = HeaterState::Calibrating;
                    self.state_start_ms = now_ms;
                    tracing::info!(battery_v, "wideband bank power ok, calibrating");
                }
            }

            HeaterState::Calibrating => {
                let _ = hal.spi_transfer(wideband_spi::INIT_REG1_MODE_CALIBRATE);
                self.ua_ref = hal.read_ua_10bit();
                self.ur_ref = hal.read_ur_10bit();
                let _ = hal.spi_transfer(wideband_spi::INIT_REG1_MODE_NORMAL_V8);
                tracing::info!(ua_ref = self.ua_ref, ur_ref = self.ur_ref, "wideband bank calibrated");
                self.heater_state = HeaterState::Condensation;
                self.state_start_ms = now_ms;
            }

            HeaterState::Condensation => {
                self.set_heater_voltage(hal, CONDENSATION_VOLTAGE, battery_v);
                if elapsed >= CONDENSATION_DURATION_MS {
                    self.ramp_voltage = RAMP_START_VOLTAGE;
                    self.heater_state = HeaterState::RampUp;
                    self.state_start_ms = now_ms;
                    tracing::info!("wideband bank condensation complete, ramping");
                }
            }

            HeaterState::RampUp => {
                self.read_sensors(hal);
                self.ramp_voltage += RAMP_RATE_V_PER_SEC * (WIDEBAND_TICK_MS as f32 / 1000.0);
                if self.ramp_voltage >= RAMP_END_VOLTAGE {
                    self.ramp_voltage = RAMP_END_VOLTAGE;
                    self.heater_state = HeaterState::Pid;
                    self.state_start_ms = now_ms;
                    self.pid_integral = 0.0;
                    self.pid_prev_error = 0;
                    tracing::info!("wideband bank entering PID heater control");
                }
                self.set_heater_voltage(hal, self.ramp_voltage, battery_v);
            }

            HeaterState::Pid => {
                self.read_sensors(hal);
                if self.diag_is_error() {
                    tracing::warn!(diag = self.diag_status, "wideband bank diagnostic error");
                    self.heater_state = HeaterState::Error;
                    self.heater_pwm_count = 0;
                    self.heater_duty_pct = 0.0;
                    let _ = hal.heater_pwm.write_duty(0);
                    return;
                }

                let error = self.ur_value as i32 - self.ur_ref as i32;
                self.pid_integral = (self.pid_integral + error as f32).clamp(-WIDEBAND_PID_INTEGRAL_CLAMP, WIDEBAND_PID_INTEGRAL_CLAMP);
                let derivative = error - self.pid_prev_error;
                self.pid_prev_error = error;

                let pid_output = WIDEBAND_PID_P * error as f32 + WIDEBAND_PID_I * self.pid_integral + WIDEBAND_PID_D * derivative as f32;
                self.heater_pwm_count = (self.heater_pwm_count + pid_output as i32).clamp(0, 255);
                self.heater_duty_pct = self.heater_pwm_count as f32 * 100.0 / 255.0;
                let _ = hal.heater_pwm.write_duty(self.heater_pwm_count as u32);
            }

            HeaterState::Error => {
                let _ = hal.heater_pwm.write_duty(0);
                self.heater_duty_pct = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_hal::sim::{SimAdc, SimGpio, SimPwm, SimSpi};

    fn hal() -> BankHal {
        let mut spi = SimSpi::default();
        spi.scripted_replies.push_back(0x1234); // ident
        BankHal {
            spi: Box::new(spi),
            cs_gpio: Box::new(SimGpio::new()),
            cs_pin: 0,
            ua_adc: Box::new(SimAdc::new()),
            ua_channel: 0,
            ur_adc: Box::new(SimAdc::new()),
            ur_channel: 0,
            heater_pwm: Box::new(SimPwm::default()),
        }
    }

    #[test]
    fn begins_in_wait_power() {
        let mut bank = WidebandBank::default();
        let mut hal = hal();
        bank.begin(&mut hal, 0);
        assert_eq!(bank.heater_state, HeaterState::WaitPower);
        assert!(!bank.ready());
    }

    #[test]
    fn progresses_to_pid_after_ramp_and_becomes_ready() {
        let mut bank = WidebandBank::default();
        let mut hal = hal();
        bank.begin(&mut hal, 0);

        bank.update(&mut hal, 100, 12.0); // WaitPower -> Calibrating
        assert_eq!(bank.heater_state, HeaterState::Calibrating);
        bank.update(&mut hal, 200, 12.0); // Calibrating -> Condensation
        assert_eq!(bank.heater_state, HeaterState::Condensation);

        let mut now = 200;
        while bank.heater_state == HeaterState::Condensation {
            now += WIDEBAND_TICK_MS;
            bank.update(&mut hal, now, 12.0);
        }
        assert_eq!(bank.heater_state, HeaterState::RampUp);

        while bank.heater_state == HeaterState::RampUp {
            now += WIDEBAND_TICK_MS;
            bank.update(&mut hal, now, 12.0);
        }
        assert_eq!(bank.heater_state, HeaterState::Pid);
        assert!(bank.ready());
    }

    #[test]
    fn condensation_holds_for_five_seconds() {
        let mut bank = WidebandBank::default();
        let mut hal = hal();
        bank.begin(&mut hal, 0);
        bank.update(&mut hal, 100, 12.0);
        bank.update(&mut hal, 200, 12.0);
        assert_eq!(bank.heater_state, HeaterState::Condensation);
        bank.update(&mut hal, 200 + CONDENSATION_DURATION_MS - 100, 12.0);
        assert_eq!(bank.heater_state, HeaterState::Condensation);
        bank.update(&mut hal, 200 + CONDENSATION_DURATION_MS, 12.0);
        assert_eq!(bank.heater_state, HeaterState::RampUp);
    }

    #[test]
    fn diag_error_forces_heater_off() {
        let mut bank = WidebandBank::default();
        bank.heater_state = HeaterState::Pid;
        bank.pid_prev_error = 0;
        let mut spi = SimSpi::default();
        spi.scripted_replies.push_back(0xDEAD); // diag read returns a non-OK, non-informational word
        let mut hal = BankHal {
            spi: Box::new(spi),
            cs_gpio: Box::new(SimGpio::new()),
            cs_pin: 0,
            ua_adc: Box::new(SimAdc::new()),
            ua_channel: 0,
            ur_adc: Box::new(SimAdc::new()),
            ur_channel: 0,
            heater_pwm: Box::new(SimPwm::default()),
        };
        bank.update(&mut hal, 0, 12.0);
        assert_eq!(bank.heater_state, HeaterState::Error);
        assert_eq!(bank.heater_duty_pct, 0.0);
    }
}
