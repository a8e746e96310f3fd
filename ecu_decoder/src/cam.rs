//! CamDecoder — half-wheel phase detection from a single cam tooth, latched
//! against the crank's tooth position. Mirrors `CamSensor::processPulse` /
//! `CamSensor::update`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use ecu_common::consts::CAM_SIGNAL_TIMEOUT_MS;

use crate::crank::CrankCounters;

/// Cam phase relative to the crank's tooth wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CamPhase {
    /// No cam edge within the timeout window.
    Unknown = 0,
    /// Latched tooth position fell in the first half of the wheel.
    FirstHalf = 1,
    /// Latched tooth position fell in the second half of the wheel.
    SecondHalf = 2,
}

impl CamPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CamPhase::FirstHalf,
            2 => CamPhase::SecondHalf,
            _ => CamPhase::Unknown,
        }
    }
}

/// Lock-free handle external readers use for the resolved phase.
pub struct CamCounters {
    phase: AtomicU8,
    last_pulse_time_us: AtomicU64,
}

impl Default for CamCounters {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(CamPhase::Unknown as u8),
            last_pulse_time_us: AtomicU64::new(0),
        }
    }
}

impl CamCounters {
    /// Current resolved phase.
    pub fn phase(&self) -> CamPhase {
        CamPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Timestamp (µs) of the last cam pulse.
    pub fn last_pulse_time_us(&self) -> u64 {
        self.last_pulse_time_us.load(Ordering::Acquire)
    }
}

/// CamDecoder: a rising-edge handler latches the crank's current tooth
/// position and timestamp; a periodic `update()` call from the slow loop
/// resolves that latch into a phase, applying the no-signal timeout.
pub struct CamDecoder {
    total_teeth: u32,
    counters: Arc<CamCounters>,
    crank: Arc<CrankCounters>,
    latched_tooth: AtomicU64,
}

impl CamDecoder {
    /// Create a decoder for a crank wheel of `total_teeth` teeth, reading
    /// tooth position from `crank`.
    pub fn new(total_teeth: u32, crank: Arc<CrankCounters>) -> Self {
        Self {
            total_teeth,
            counters: Arc::new(CamCounters::default()),
            crank,
            latched_tooth: AtomicU64::new(u64::MAX),
        }
    }

    /// A cloneable, lock-free handle other components use to read `phase`.
    pub fn counters(&self) -> Arc<CamCounters> {
        self.counters.clone()
    }

    /// Rising-edge handler: latch the crank's tooth position and the edge
    /// timestamp. Call only from the single edge-handling context.
    pub fn on_cam_edge(&self, now_us: u64) {
        let tooth = self.crank.tooth_position();
        self.latched_tooth.store(tooth as u64, Ordering::Release);
        self.counters.last_pulse_time_us.store(now_us, Ordering::Release);
    }

    /// Periodic poll from the slow loop: resolves the latch into a phase,
    /// forcing `Unknown` if no edge has arrived within the timeout window.
    pub fn update(&self, now_us: u64) {
        let last = self.counters.last_pulse_time_us();
        let timed_out = last == 0 || now_us.saturating_sub(last) > CAM_SIGNAL_TIMEOUT_MS * 1000;
        if timed_out {
            self.counters.phase.store(CamPhase::Unknown as u8, Ordering::Release);
            return;
        }
        let latched = self.latched_tooth.load(Ordering::Acquire);
        if latched == u64::MAX {
            self.counters.phase.store(CamPhase::Unknown as u8, Ordering::Release);
            return;
        }
        let half = self.total_teeth as u64 / 2;
        let phase = if latched < half { CamPhase::FirstHalf } else { CamPhase::SecondHalf };
        self.counters.phase.store(phase as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_first_half_phase_from_latch() {
        let crank = Arc::new(CrankCounters::default());
        crank.tooth_position.store(5, Ordering::SeqCst);
        let cam = CamDecoder::new(36, crank);
        cam.on_cam_edge(1_000);
        cam.update(1_500);
        assert_eq!(cam.counters().phase(), CamPhase::FirstHalf);
    }

    #[test]
    fn resolves_second_half_phase_from_latch() {
        let crank = Arc::new(CrankCounters::default());
        crank.tooth_position.store(30, Ordering::SeqCst);
        let cam = CamDecoder::new(36, crank);
        cam.on_cam_edge(1_000);
        cam.update(1_500);
        assert_eq!(cam.counters().phase(), CamPhase::SecondHalf);
    }

    #[test]
    fn times_out_to_unknown_without_recent_edge() {
        let crank = Arc::new(CrankCounters::default());
        crank.tooth_position.store(5, Ordering::SeqCst);
        let cam = CamDecoder::new(36, crank);
        cam.on_cam_edge(0);
        cam.update(CAM_SIGNAL_TIMEOUT_MS * 1000 + 1);
        assert_eq!(cam.counters().phase(), CamPhase::Unknown);
    }

    #[test]
    fn stays_unknown_before_first_edge() {
        let crank = Arc::new(CrankCounters::default());
        let cam = CamDecoder::new(36, crank);
        cam.update(100);
        assert_eq!(cam.counters().phase(), CamPhase::Unknown);
    }
}
