//! `SensorSlot` — runtime state for one [`SensorDescriptor`]: the
//! moving-average + EMA filter chain, calibration, and validation
//!.

use ecu_common::error::FaultAction;

use crate::descriptor::{EnginePhase, SensorDescriptor};

/// One configured sensor slot plus its runtime filter/validation state.
pub struct SensorSlot {
    /// The slot's configuration.
    pub descriptor: SensorDescriptor,
    avg_buf: Vec<f32>,
    avg_idx: usize,
    avg_filled: usize,
    ema: f32,
    /// Calibrated engineering-unit value.
    pub value: f32,
    /// Last raw millivolt reading, pre-filter.
    pub raw_mv: f32,
    /// Filtered (moving-average + EMA) millivolt reading.
    pub filtered_raw_mv: f32,
    /// `true` while the value breaches its error bounds in an active phase.
    pub in_error: bool,
    /// `true` while the value breaches its warn bounds in an active phase.
    pub in_warning: bool,
}

impl SensorSlot {
    /// Build runtime state for a descriptor, zero-initialized.
    pub fn new(descriptor: SensorDescriptor) -> Self {
        let n = descriptor.avg_samples.clamp(1, 32);
        Self {
            descriptor,
            avg_buf: vec![0.0; n],
            avg_idx: 0,
            avg_filled: 0,
            ema: 0.0,
            value: 0.0,
            raw_mv: 0.0,
            filtered_raw_mv: 0.0,
            in_error: false,
            in_warning: false,
        }
    }

    fn filter(&mut self, raw_mv: f32) -> f32 {
        self.avg_buf[self.avg_idx] = raw_mv;
        self.avg_idx = (self.avg_idx + 1) % self.avg_buf.len();
        if self.avg_filled < self.avg_buf.len() {
            self.avg_filled += 1;
        }
        let window = &self.avg_buf[..self.avg_filled];
        let avg = window.iter().sum::<f32>() / window.len() as f32;
        let alpha = self.descriptor.ema_alpha.clamp(0.0, 1.0);
        self.ema = alpha * avg + (1.0 - alpha) * self.ema;
        self.ema
    }

    /// Feed one new raw millivolt reading through filter → calibrate →
    /// validate, given the current engine phase.
    pub fn update(&mut self, raw_mv: f32, phase: EnginePhase) {
        self.raw_mv = raw_mv;
        self.filtered_raw_mv = self.filter(raw_mv);
        self.value = self.descriptor.cal.calibrate(self.filtered_raw_mv);
        self.validate(phase);
    }

    fn validate(&mut self, phase: EnginePhase) {
        let phase_active = self.descriptor.active_states.contains(phase);
        if !phase_active || self.filtered_raw_mv.abs() <= self.descriptor.settle_guard {
            self.in_error = false;
            self.in_warning = false;
            return;
        }
        self.in_error = Self::breaches(self.value, self.descriptor.error_min, self.descriptor.error_max);
        self.in_warning = Self::breaches(self.value, self.descriptor.warn_min, self.descriptor.warn_max);
    }

    fn breaches(value: f32, min: Option<f32>, max: Option<f32>) -> bool {
        match (min, max) {
            (Some(min), Some(max)) => value < min || value > max,
            (Some(min), None) => value < min,
            (None, Some(max)) => value > max,
            (None, None) => false,
        }
    }

    /// This slot's contribution to the limp/CEL fault bitmasks, per its
    /// `fault_action`. `(0, 0)` if not in error or
    /// unmapped (`fault_bit == 0xFF`).
    pub fn fault_contribution(&self) -> (u32, u32) {
        if !self.in_error || self.descriptor.fault_bit == 0xFF {
            return (0, 0);
        }
        let bit = 1u32 << self.descriptor.fault_bit;
        match self.descriptor.fault_action {
            FaultAction::None => (0, 0),
            FaultAction::Limp | FaultAction::Shutdown => (bit, 0),
            FaultAction::Cel => (0, bit),
        }
    }
}
