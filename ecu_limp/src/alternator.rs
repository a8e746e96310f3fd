//! Alternator field-coil PID controller with an overvoltage interlock.

use ecu_common::consts::{
    ALTERNATOR_MAX_DUTY_PCT, ALTERNATOR_OVERVOLTAGE_CUTOFF_V, ALTERNATOR_PWM_FREQUENCY_HZ,
    ALTERNATOR_PWM_RESOLUTION_BITS,
};
use ecu_hal::{HalError, PwmChannel};

/// Drives the alternator field coil to hold battery voltage at a target,
/// forcing the field off above `ALTERNATOR_OVERVOLTAGE_CUTOFF_V` regardless
/// of the PID output.
pub struct AlternatorController {
    target_voltage: f32,
    kp: f32,
    ki: f32,
    kd: f32,
    integral: f32,
    prev_error: f32,
    duty_pct: f32,
    overvoltage: bool,
    last_update_ms: Option<u64>,
}

impl AlternatorController {
    pub fn new(target_voltage: f32, kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            target_voltage,
            kp,
            ki,
            kd,
            integral: 0.0,
            prev_error: 0.0,
            duty_pct: 0.0,
            overvoltage: false,
            last_update_ms: None,
        }
    }

    /// Configure the PWM channel and drive the field fully off.
    pub fn begin(&mut self, pwm: &mut dyn PwmChannel) -> Result<(), HalError> {
        pwm.configure(ALTERNATOR_PWM_FREQUENCY_HZ, ALTERNATOR_PWM_RESOLUTION_BITS)?;
        self.set_duty(pwm, 0.0)
    }

    pub fn duty_pct(&self) -> f32 {
        self.duty_pct
    }

    pub fn is_overvoltage(&self) -> bool {
        self.overvoltage
    }

    /// Run one control tick against the measured battery voltage.
    pub fn update(&mut self, pwm: &mut dyn PwmChannel, now_ms: u64, battery_v: f32) -> Result<(), HalError> {
        if battery_v > ALTERNATOR_OVERVOLTAGE_CUTOFF_V {
            self.overvoltage = true;
            self.integral = 0.0;
            self.last_update_ms = Some(now_ms);
            return self.set_duty(pwm, 0.0);
        }
        self.overvoltage = false;

        let mut dt = match self.last_update_ms {
            Some(prev) => (now_ms.saturating_sub(prev)) as f32 / 1000.0,
            None => 0.1,
        };
        if !(0.0..=1.0).contains(&dt) {
            dt = 0.1;
        }
        self.last_update_ms = Some(now_ms);

        let error = self.target_voltage - battery_v;
        self.integral += error * dt;
        if self.ki.abs() > 1e-6 {
            let bound = (ALTERNATOR_MAX_DUTY_PCT / self.ki).abs();
            self.integral = self.integral.clamp(-bound, bound);
        }
        let derivative = if dt > 1e-3 { (error - self.prev_error) / dt } else { 0.0 };
        self.prev_error = error;

        let output =
            (self.kp * error + self.ki * self.integral + self.kd * derivative).clamp(0.0, ALTERNATOR_MAX_DUTY_PCT);
        self.set_duty(pwm, output)
    }

    fn set_duty(&mut self, pwm: &mut dyn PwmChannel, percent: f32) -> Result<(), HalError> {
        self.duty_pct = percent.clamp(0.0, ALTERNATOR_MAX_DUTY_PCT);
        let max_count = (1u32 << ALTERNATOR_PWM_RESOLUTION_BITS) - 1;
        let count = (self.duty_pct / 100.0 * max_count as f32).round() as u32;
        pwm.write_duty(count)
    }
}
