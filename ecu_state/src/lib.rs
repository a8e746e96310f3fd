//! Shared `EngineState` snapshot and the cross-loop publish bus.

pub mod bus;
pub mod state;

pub use bus::EngineStateBus;
pub use state::EngineState;
