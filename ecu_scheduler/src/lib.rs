//! RealtimeScheduler: the angle-accurate fast loop.
//!
//! Drives ignition dwell/spark and injector open/close directly against
//! `CrankDecoder`'s published tooth position. Runs continuously at high
//! priority; the loop itself never blocks mid-cylinder-pass, only between
//! iterations.

pub mod cylinder;
pub mod runner;

pub use runner::{rt_setup, RealtimeScheduler, SchedulerError, SchedulerRunner};
