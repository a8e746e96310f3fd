//! Crank and cam position decoding and sync.

pub mod cam;
pub mod crank;

pub use cam::{CamCounters, CamDecoder, CamPhase};
pub use crank::{CrankCounters, CrankDecoder, SyncState, ToothLogEntry};
