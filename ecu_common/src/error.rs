//! Fault bitmask, fault actions, and the cross-component fault callback.
//!
//! Every component that can detect a fault (`SensorLayer`, `WidebandHeaterSM`,
//! `LimpArbiter`) folds it into one of these bitmasks and, for persistent
//! faults, reports it through [`FaultCallback`].

use bitflags::bitflags;

bitflags! {
    /// Peripheral-health fault bits that feed `LimpArbiter` independently of
    /// any single `SensorDescriptor` (expander readback, wideband IC, oil
    /// pressure). Per-sensor fault bits occupy the low 16 bits of a
    /// `FaultBitmask`; this flag set documents the well-known high bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PeripheralFault: u32 {
        /// GPIO expander readback mismatch.
        const EXPANDER = 1 << 16;
        /// Wideband IC bank 0 entered `ERROR`.
        const WIDEBAND_BANK0 = 1 << 17;
        /// Wideband IC bank 1 entered `ERROR`.
        const WIDEBAND_BANK1 = 1 << 18;
        /// Oil pressure below `min_psi` past the startup delay.
        const OIL_PRESSURE = 1 << 19;
    }
}

/// A 32-bit fault bitmask. Bits 0..16 are per-`SensorDescriptor` fault bits
/// (assigned by config); bits 16..32 are [`PeripheralFault`] bits.
pub type FaultBitmask = u32;

/// What a fault does to the operating envelope once it is debounced active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultAction {
    /// Recorded but does not affect the operating envelope.
    #[default]
    None,
    /// Feeds the limp bitmask — triggers `LimpArbiter` entry.
    Limp,
    /// Feeds the limp bitmask and is also treated as fuel-cut worthy by the
    /// consuming application (the core itself never stops fueling outright).
    Shutdown,
    /// CEL indicator only; does not feed the limp bitmask.
    Cel,
}

/// Structured fault event passed to [`FaultCallback`].
#[derive(Debug, Clone)]
pub struct FaultEvent {
    /// Stable fault name (sensor name or rule name).
    pub name: String,
    /// Human-readable detail.
    pub message: String,
    /// `true` on entry, `false` on clear.
    pub active: bool,
}

/// `on_fault(name, message, active)` — the external interface's fault callback.
pub type FaultCallback = Box<dyn Fn(&str, &str, bool) + Send + Sync>;

/// Invoke a fault callback if present, logging unconditionally.
pub fn report_fault(cb: Option<&FaultCallback>, event: &FaultEvent) {
    if event.active {
        tracing::warn!(name = %event.name, message = %event.message, "fault active");
    } else {
        tracing::info!(name = %event.name, message = %event.message, "fault cleared");
    }
    if let Some(cb) = cb {
        cb(&event.name, &event.message, event.active);
    }
}
