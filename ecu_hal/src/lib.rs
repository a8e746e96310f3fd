//! Hardware abstraction: the capability traits the ECU core consumes and a
//! simulation backend for each, so the core runs end-to-end without real
//! silicon.
//!
//! # Module Structure
//!
//! - [`traits`] - `GpioPort`, `AdcReader`, `PwmChannel`, `SpiBus`, `Clock`
//! - [`error`] - `HalError`
//! - [`sim`] - one `Sim*` implementation per capability

pub mod error;
pub mod sim;
pub mod traits;

pub use error::HalError;
pub use traits::{AdcReader, Clock, Edge, EdgeHandler, GpioMode, GpioPort, Level, PwmChannel, SpiBus};
