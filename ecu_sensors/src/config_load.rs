//! Loading the `SensorDescriptor`/`FaultRule` arrays from `sensors.toml`
//!, mirroring
//! `ecu_common::config`'s load-then-validate shape.

use std::path::Path;

use ecu_common::config::ConfigError;
use serde::Deserialize;

use crate::descriptor::SensorDescriptor;
use crate::fault_rule::FaultRule;

#[derive(Debug, Deserialize)]
struct SensorsFile {
    #[serde(default, rename = "sensor")]
    sensors: Vec<SensorDescriptor>,
    #[serde(default, rename = "rule")]
    rules: Vec<FaultRule>,
}

/// Load the `[[sensor]]`/`[[rule]]` arrays from `<dir>/sensors.toml`.
///
/// # Errors
/// Returns [`ConfigError::FileNotFound`] or [`ConfigError::ParseError`] on
/// I/O or TOML failure.
pub fn load_sensors(dir: &Path) -> Result<(Vec<SensorDescriptor>, Vec<FaultRule>), ConfigError> {
    let path = dir.join("sensors.toml");
    let content = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.display().to_string())
        } else {
            ConfigError::ParseError(format!("{}: {e}", path.display()))
        }
    })?;
    let file: SensorsFile =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
    Ok((file.sensors, file.rules))
}
