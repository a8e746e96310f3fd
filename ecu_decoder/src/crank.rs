//! CrankDecoder — interrupt-driven missing-tooth crank position decoder.
//!
//! Mirrors `CrankSensor::processTooth`: a ring-buffered rolling average
//! locates the missing-tooth gap, drives a three-state sync machine, and
//! derives RPM from the last tooth period.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use ecu_common::consts::{MIN_TOOTH_PERIOD_US, RPM_MAX, TOOTH_PERIOD_RING_LEN};

/// Crank sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    /// No gap has been seen since the last loss of sync.
    Lost = 0,
    /// One gap seen; confirming tooth count before declaring sync.
    Syncing = 1,
    /// Tooth count has matched the expected gap interval twice in a row.
    Synced = 2,
}

impl SyncState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SyncState::Lost,
            1 => SyncState::Syncing,
            _ => SyncState::Synced,
        }
    }
}

/// The lock-free fields external components read concurrently with the
/// tooth-edge processing thread. RPM and tooth position are the only
/// values read outside CrankDecoder's own processing path;
/// both are single-word atomics.
pub struct CrankCounters {
    rpm: AtomicU32,
    pub(crate) tooth_position: AtomicU32,
    sync_state: AtomicU8,
    last_edge_time_us: AtomicU64,
}

impl Default for CrankCounters {
    fn default() -> Self {
        Self {
            rpm: AtomicU32::new(0),
            tooth_position: AtomicU32::new(0),
            sync_state: AtomicU8::new(SyncState::Lost as u8),
            last_edge_time_us: AtomicU64::new(0),
        }
    }
}

impl CrankCounters {
    /// Current RPM, clamped to `[0, RPM_MAX]`.
    pub fn rpm(&self) -> u32 {
        self.rpm.load(Ordering::Acquire)
    }

    /// Current tooth position, `0..total_teeth`.
    pub fn tooth_position(&self) -> u32 {
        self.tooth_position.load(Ordering::Acquire)
    }

    /// Current sync state.
    pub fn sync_state(&self) -> SyncState {
        SyncState::from_u8(self.sync_state.load(Ordering::Acquire))
    }

    /// Timestamp (µs, monotonic) of the last processed tooth edge.
    pub fn last_edge_time_us(&self) -> u64 {
        self.last_edge_time_us.load(Ordering::Acquire)
    }
}

/// One captured `(period_us, tooth_num)` pair, as logged while a capture is
/// active (diagnostic/tuning aid; not part of the hot path).
#[derive(Debug, Clone, Copy)]
pub struct ToothLogEntry {
    /// Measured tooth period, microseconds.
    pub period_us: u32,
    /// Tooth number at capture time.
    pub tooth_num: u32,
}

#[derive(Default)]
struct CaptureLog {
    entries: Vec<ToothLogEntry>,
    capacity: usize,
    capturing: bool,
    complete: bool,
}

/// CrankDecoder: owned and mutated only by the single thread that calls
/// [`CrankDecoder::on_tooth_edge`] — the Rust realization of "ISR, single
/// writer" for a hosted Linux process. Readers use the cheaply cloneable
/// [`CrankCounters`] handle instead of touching this struct directly.
pub struct CrankDecoder {
    total_teeth: u32,
    missing_teeth: u32,
    counters: Arc<CrankCounters>,
    periods: [u32; TOOTH_PERIOD_RING_LEN],
    period_idx: usize,
    tooth_count: u32,
    capture: Mutex<CaptureLog>,
}

impl CrankDecoder {
    /// Create a decoder for an N-tooth, M-missing trigger wheel.
    pub fn new(total_teeth: u32, missing_teeth: u32) -> Self {
        Self {
            total_teeth,
            missing_teeth,
            counters: Arc::new(CrankCounters::default()),
            periods: [0; TOOTH_PERIOD_RING_LEN],
            period_idx: 0,
            tooth_count: 0,
            capture: Mutex::new(CaptureLog::default()),
        }
    }

    /// A cloneable, lock-free handle other components use to read
    /// `rpm`/`tooth_position`/`sync_state` concurrently.
    pub fn counters(&self) -> Arc<CrankCounters> {
        self.counters.clone()
    }

    /// Start capturing `(period_us, tooth_num)` pairs into a bounded log of
    /// at least 720 entries. Stops automatically when full.
    pub fn start_capture(&self, capacity: usize) {
        let mut log = self.capture.lock().unwrap();
        log.entries.clear();
        log.capacity = capacity.max(720);
        log.capturing = true;
        log.complete = false;
    }

    /// Stop capturing early.
    pub fn stop_capture(&self) {
        self.capture.lock().unwrap().capturing = false;
    }

    /// `true` once the capture buffer has filled.
    pub fn capture_complete(&self) -> bool {
        self.capture.lock().unwrap().complete
    }

    /// Snapshot the captured log so far.
    pub fn captured_log(&self) -> Vec<ToothLogEntry> {
        self.capture.lock().unwrap().entries.clone()
    }

    fn rolling_average(&self) -> u32 {
        let mut sum: u64 = 0;
        let mut count: u32 = 0;
        for &p in &self.periods {
            if p > 0 {
                sum += p as u64;
                count += 1;
            }
        }
        if count > 0 { (sum / count as u64) as u32 } else { 0 }
    }

    /// Process one tooth edge at monotonic time `now_us`. Call this only
    /// from the single edge-handling context — it is the component's
    /// entire "ISR" surface.
    pub fn on_tooth_edge(&mut self, now_us: u64) {
        let last = self.counters.last_edge_time_us();
        if last == 0 {
            self.counters.last_edge_time_us.store(now_us, Ordering::Release);
            return;
        }
        let period_us = now_us.saturating_sub(last) as u32;
        self.counters.last_edge_time_us.store(now_us, Ordering::Release);

        if period_us < MIN_TOOTH_PERIOD_US {
            return; // noise
        }

        self.periods[self.period_idx] = period_us;
        self.period_idx = (self.period_idx + 1) % TOOTH_PERIOD_RING_LEN;

        let avg = self.rolling_average();
        let is_gap = avg > 0 && period_us > avg + avg / 2;
        let expected_teeth = self.total_teeth - self.missing_teeth;

        let sync_state = self.counters.sync_state();
        let new_state = match sync_state {
            SyncState::Lost => {
                if is_gap {
                    self.tooth_count = 0;
                    SyncState::Syncing
                } else {
                    SyncState::Lost
                }
            }
            SyncState::Syncing => {
                self.tooth_count += 1;
                let state = if is_gap {
                    let matched = self.tooth_count == expected_teeth;
                    self.tooth_count = 0;
                    if matched { SyncState::Synced } else { SyncState::Syncing }
                } else {
                    SyncState::Syncing
                };
                state
            }
            SyncState::Synced => {
                self.tooth_count += 1;
                if is_gap {
                    let matched = self.tooth_count == expected_teeth;
                    self.tooth_count = 0;
                    if matched {
                        SyncState::Synced
                    } else {
                        self.counters.rpm.store(0, Ordering::Release);
                        tracing::warn!("crank sync lost: gap at wrong tooth count");
                        SyncState::Lost
                    }
                } else {
                    SyncState::Synced
                }
            }
        };

        if new_state != sync_state {
            tracing::info!(?new_state, "crank sync state transition");
        }
        self.counters.sync_state.store(new_state as u8, Ordering::Release);
        self.counters.tooth_position.store(self.tooth_count, Ordering::Release);

        if new_state != SyncState::Lost && period_us > 0 {
            let rpm_calc = 60_000_000u64 / (period_us as u64 * self.total_teeth as u64);
            if rpm_calc < RPM_MAX as u64 {
                self.counters.rpm.store(rpm_calc as u32, Ordering::Release);
            }
        }

        let mut log = self.capture.lock().unwrap();
        if log.capturing && log.entries.len() < log.capacity {
            log.entries.push(ToothLogEntry {
                period_us,
                tooth_num: self.tooth_count,
            });
            if log.entries.len() >= log.capacity {
                log.capturing = false;
                log.complete = true;
            }
        }
    }
}
