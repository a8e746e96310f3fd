//! A `GpioPort` over a shared `SimGpio`, so the fast loop, the slow loop's
//! digital sensor/oil-pressure reads, and the crank/cam edge generator can
//! each hold their own `Box<dyn GpioPort>` backed by one pin bank instead of
//! each requiring exclusive ownership of it.

use std::sync::{Arc, Mutex};

use ecu_hal::sim::SimGpio;
use ecu_hal::{Edge, EdgeHandler, GpioMode, GpioPort, HalError, Level};

/// Clone-able `GpioPort` handle over a `Mutex`-guarded `SimGpio`.
#[derive(Clone)]
pub struct SharedGpio(Arc<Mutex<SimGpio>>);

impl SharedGpio {
    /// Wrap an existing shared pin bank.
    pub fn new(inner: Arc<Mutex<SimGpio>>) -> Self {
        Self(inner)
    }
}

impl GpioPort for SharedGpio {
    fn set_mode(&mut self, pin: u32, mode: GpioMode) -> Result<(), HalError> {
        self.0.lock().unwrap().set_mode(pin, mode)
    }

    fn write(&mut self, pin: u32, level: Level) -> Result<(), HalError> {
        self.0.lock().unwrap().write(pin, level)
    }

    fn read(&self, pin: u32) -> Result<Level, HalError> {
        self.0.lock().unwrap().read(pin)
    }

    fn attach_edge_interrupt(&mut self, pin: u32, edge: Edge, handler: EdgeHandler) -> Result<(), HalError> {
        self.0.lock().unwrap().attach_edge_interrupt(pin, edge, handler)
    }
}
