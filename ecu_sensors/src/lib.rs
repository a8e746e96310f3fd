//! SensorLayer: per-slot calibration/filtering/validation plus cross-sensor
//! fault rules.

pub mod config_load;
pub mod descriptor;
pub mod fault_rule;
pub mod layer;
pub mod slot;

pub use config_load::load_sensors;
pub use descriptor::{CalKind, EnginePhase, SensorDescriptor, SensorRole, SourceKind, VirtualChannel};
pub use fault_rule::{FaultContext, FaultRule, FaultSource, RuleOperator};
pub use layer::{SensorHal, SensorLayer, SensorLayerOutput};
pub use slot::SensorSlot;
