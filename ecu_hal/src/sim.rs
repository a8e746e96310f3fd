//! Simulation backends for every capability trait: one small struct per
//! capability, each holding pre-seeded in-memory state instead of a real
//! hardware handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::HalError;
use crate::traits::{AdcReader, Clock, Edge, EdgeHandler, GpioMode, GpioPort, Level, PwmChannel, SpiBus};

/// In-memory [`GpioPort`]. Edge handlers are invoked synchronously by
/// [`SimGpio::fire_edge`], which a test harness or the scheduler's edge
/// generator thread calls in place of a real interrupt.
#[derive(Default)]
pub struct SimGpio {
    modes: HashMap<u32, GpioMode>,
    levels: HashMap<u32, Level>,
    handlers: HashMap<u32, (Edge, EdgeHandler)>,
}

impl SimGpio {
    /// Create an empty simulated GPIO bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive `pin` to `level` and, if it crosses the registered edge
    /// direction, invoke the attached handler. Used by test fixtures and
    /// the crank/cam tooth generators to synthesize edges.
    pub fn fire_edge(&mut self, pin: u32, level: Level) {
        let prev = self.levels.get(&pin).copied();
        self.levels.insert(pin, level);
        if let Some((edge, handler)) = self.handlers.get(&pin) {
            let crossed = match (prev, edge, level) {
                (Some(Level::Low), Edge::Rising, Level::High) => true,
                (Some(Level::High), Edge::Falling, Level::Low) => true,
                (None, Edge::Rising, Level::High) => true,
                (None, Edge::Falling, Level::Low) => true,
                _ => false,
            };
            if crossed {
                handler();
            }
        }
    }
}

impl GpioPort for SimGpio {
    fn set_mode(&mut self, pin: u32, mode: GpioMode) -> Result<(), HalError> {
        self.modes.insert(pin, mode);
        Ok(())
    }

    fn write(&mut self, pin: u32, level: Level) -> Result<(), HalError> {
        self.levels.insert(pin, level);
        Ok(())
    }

    fn read(&self, pin: u32) -> Result<Level, HalError> {
        Ok(self.levels.get(&pin).copied().unwrap_or(Level::Low))
    }

    fn attach_edge_interrupt(&mut self, pin: u32, edge: Edge, handler: EdgeHandler) -> Result<(), HalError> {
        self.handlers.insert(pin, (edge, handler));
        Ok(())
    }
}

/// In-memory [`AdcReader`] with a test-settable millivolt value per channel.
/// Conversions complete immediately; [`Self::set_millivolts`] is the seam
/// tests use to drive sensor-layer behavior end-to-end.
#[derive(Clone, Default)]
pub struct SimAdc {
    inner: Arc<Mutex<HashMap<u8, f32>>>,
}

impl SimAdc {
    /// Create a simulated ADC with all channels defaulting to 0 mV.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the millivolt reading a subsequent `read_millivolts` will return.
    pub fn set_millivolts(&self, channel: u8, mv: f32) {
        self.inner.lock().unwrap().insert(channel, mv);
    }
}

impl AdcReader for SimAdc {
    fn start_conversion(&mut self, _channel: u8) -> Result<(), HalError> {
        Ok(())
    }

    fn conversion_ready(&self, _channel: u8) -> bool {
        true
    }

    fn read_millivolts(&mut self, channel: u8) -> Result<f32, HalError> {
        Ok(self.inner.lock().unwrap().get(&channel).copied().unwrap_or(0.0))
    }
}

/// In-memory [`PwmChannel`] that records the last configured/written values.
#[derive(Default)]
pub struct SimPwm {
    /// Last configured frequency, Hz.
    pub freq_hz: u32,
    /// Last configured resolution, bits.
    pub resolution_bits: u8,
    /// Last written duty count.
    pub duty: u32,
}

impl SimPwm {
    /// Create a simulated PWM channel, unconfigured and at zero duty.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PwmChannel for SimPwm {
    fn configure(&mut self, freq_hz: u32, resolution_bits: u8) -> Result<(), HalError> {
        self.freq_hz = freq_hz;
        self.resolution_bits = resolution_bits;
        Ok(())
    }

    fn write_duty(&mut self, count: u32) -> Result<(), HalError> {
        self.duty = count;
        Ok(())
    }
}

/// In-memory [`SpiBus`] for the wideband IC transport. Tests enqueue the
/// words the IC would clock back (identify/diagnostic/UR/UA samples).
#[derive(Default)]
pub struct SimSpi {
    /// Words to return, in order, one per `transfer16` call.
    pub scripted_replies: std::collections::VecDeque<u16>,
}

impl SpiBus for SimSpi {
    fn transfer16(&mut self, _word: u16) -> Result<u16, HalError> {
        Ok(self.scripted_replies.pop_front().unwrap_or(0))
    }
}

/// Monotonic simulated clock, backed by [`Instant`].
#[derive(Clone)]
pub struct SimClock {
    start: Instant,
}

impl Default for SimClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl SimClock {
    /// Create a clock whose epoch is "now".
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn sim_gpio_fires_handler_on_matching_edge() {
        let mut gpio = SimGpio::new();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        gpio.attach_edge_interrupt(
            3,
            Edge::Falling,
            Box::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        gpio.fire_edge(3, Level::High);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        gpio.fire_edge(3, Level::Low);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        gpio.fire_edge(3, Level::High);
        gpio.fire_edge(3, Level::Low);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sim_adc_returns_seeded_value() {
        let mut adc = SimAdc::new();
        adc.set_millivolts(1, 2500.0);
        assert_eq!(adc.read_millivolts(1).unwrap(), 2500.0);
        assert_eq!(adc.read_millivolts(2).unwrap(), 0.0);
    }

    #[test]
    fn sim_spi_replays_scripted_words() {
        let mut spi = SimSpi::default();
        spi.scripted_replies.push_back(0x28FF);
        spi.scripted_replies.push_back(0x0000);
        assert_eq!(spi.transfer16(0x7800).unwrap(), 0x28FF);
        assert_eq!(spi.transfer16(0x7800).unwrap(), 0x0000);
        assert_eq!(spi.transfer16(0x7800).unwrap(), 0x0000);
    }

    #[test]
    fn sim_clock_is_monotonic() {
        let clock = SimClock::new();
        let a = clock.now_us();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = clock.now_us();
        assert!(b >= a);
    }
}
