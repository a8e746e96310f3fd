//! Convenience re-exports: `use ecu_common::prelude::*;`

pub use crate::config::{load_project, ConfigError, ConfigLoader, ProjectConfig};
pub use crate::error::{FaultAction, FaultBitmask, FaultCallback, FaultEvent, PeripheralFault, report_fault};
