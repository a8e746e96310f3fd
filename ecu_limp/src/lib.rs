//! Fault arbitration and the two peripherals it directly governs: the
//! oil-pressure monitor and the alternator field controller.
//!
//! `LimpArbiter` owns the degraded-envelope state machine; it does not poll
//! hardware itself. The caller (the slow-loop executor) folds
//! `SensorLayerOutput::limp_bits`, `WidebandHeaterSM` heater faults, and
//! `OilPressureMonitor`'s fault flag into one [`ecu_common::error::FaultBitmask`]
//! and passes it to [`LimpArbiter::update`] each tick.

pub mod alternator;
pub mod arbiter;
pub mod oil;

pub use alternator::AlternatorController;
pub use arbiter::{LimpArbiter, LimpOutput};
pub use oil::{OilPressureMonitor, OilPressureReading};
