//! Capability traits the ECU core consumes from its surroundings.
//!
//! The core never cares which concrete peripheral backs a capability —
//! native GPIO vs. an expander, a 16-bit I²C ADC vs. a 12-bit SPI ADC are
//! all the same trait object from the core's point of view.

use crate::error::HalError;

/// Digital pin direction/mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioMode {
    /// Digital input.
    Input,
    /// Digital output.
    Output,
}

/// Digital level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Logic low.
    Low,
    /// Logic high.
    High,
}

impl Level {
    /// `true` for `High`.
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Edge direction for interrupt attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Rising edge (low → high).
    Rising,
    /// Falling edge (high → low).
    Falling,
}

/// Edge-interrupt callback. Invoked from whatever context the backend uses
/// to detect the edge — a dedicated OS thread under the `rt` backend, the
/// simulation's edge generator otherwise. Bodies registered here must be
/// bounded and touch only the owning component's lock-free state.
pub type EdgeHandler = Box<dyn Fn() + Send + Sync>;

/// GPIO capability: native pins or pins behind an expander — the core
/// never cares which.
pub trait GpioPort: Send + Sync {
    /// Configure a pin as input or output.
    fn set_mode(&mut self, pin: u32, mode: GpioMode) -> Result<(), HalError>;
    /// Drive an output pin.
    fn write(&mut self, pin: u32, level: Level) -> Result<(), HalError>;
    /// Read the current level of a pin.
    fn read(&self, pin: u32) -> Result<Level, HalError>;
    /// Register an edge-triggered handler on an input pin.
    fn attach_edge_interrupt(&mut self, pin: u32, edge: Edge, handler: EdgeHandler) -> Result<(), HalError>;
}

/// ADC capability. Two real variants exist (16-bit differential I²C,
/// 12-bit SPI); both present the same millivolt-reading interface.
pub trait AdcReader: Send + Sync {
    /// Begin a conversion on `channel`.
    fn start_conversion(&mut self, channel: u8) -> Result<(), HalError>;
    /// Poll whether the last-started conversion has completed.
    fn conversion_ready(&self, channel: u8) -> bool;
    /// Read the converted value in millivolts. Blocks up to the caller's
    /// `CONV_TIMEOUT_MS` budget; returns [`HalError::Timeout`] past it.
    fn read_millivolts(&mut self, channel: u8) -> Result<f32, HalError>;
}

/// PWM output capability (heater duty, alternator field, coil/injector
/// drive where the platform exposes them as PWM channels rather than raw
/// GPIO).
pub trait PwmChannel: Send + Sync {
    /// Configure frequency and duty resolution.
    fn configure(&mut self, freq_hz: u32, resolution_bits: u8) -> Result<(), HalError>;
    /// Write the duty count (0..2^resolution_bits - 1).
    fn write_duty(&mut self, count: u32) -> Result<(), HalError>;
}

/// SPI capability for the wideband IC transport: 16-bit words, 125 kHz,
/// mode 1; chip-select is driven separately via [`GpioPort`].
pub trait SpiBus: Send + Sync {
    /// Exchange one 16-bit word, returning the word clocked back in.
    fn transfer16(&mut self, word: u16) -> Result<u16, HalError>;
}

/// Monotonic microsecond clock capability.
pub trait Clock: Send + Sync {
    /// Monotonic timestamp in microseconds.
    fn now_us(&self) -> u64;
}
