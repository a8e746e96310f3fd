//! `EngineStateBus` — double-buffered slots for composite reads across the
//! fast/slow loop boundary.
//!
//! Uses the same odd/even `write_seq` seqlock protocol cross-process SHM
//! headers use to guard raw bytes behind a pointer the reader doesn't own,
//! adapted here to guard a plain `UnsafeCell<EngineState>` instead — the
//! ECU core is single-process, so one writer (the slow loop) and any
//! number of readers share it with no syscalls either side.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::state::EngineState;

/// Lock-free single-writer/multi-reader publish point for [`EngineState`].
///
/// `write_seq` follows the standard seqlock convention: odd means a write
/// is in progress, even means the payload is stable. A reader that
/// observes an odd sequence, or whose before/after sequence numbers
/// differ, retries.
pub struct EngineStateBus {
    data: UnsafeCell<EngineState>,
    write_seq: AtomicU32,
}

// SAFETY: `data` is written only by the single slow-loop thread holding
// `&EngineStateBus` via `publish`; readers only ever read through the
// seqlock protocol in `snapshot`, never taking a reference into `data`
// directly.
unsafe impl Sync for EngineStateBus {}

impl Default for EngineStateBus {
    fn default() -> Self {
        Self {
            data: UnsafeCell::new(EngineState::default()),
            write_seq: AtomicU32::new(0),
        }
    }
}

impl EngineStateBus {
    /// Create a bus seeded with the zero-initialized `EngineState`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new snapshot. Call only from the single slow-loop writer.
    pub fn publish(&self, state: EngineState) {
        let seq = self.write_seq.load(Ordering::Relaxed);
        self.write_seq.store(seq.wrapping_add(1), Ordering::Release);
        // SAFETY: write_seq is now odd; any concurrent reader will observe
        // that and retry rather than read `data` mid-write.
        unsafe {
            *self.data.get() = state;
        }
        self.write_seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Read the latest committed snapshot, retrying across a torn write.
    pub fn snapshot(&self) -> EngineState {
        loop {
            let before = self.write_seq.load(Ordering::Acquire);
            if before % 2 != 0 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: `before` was even, so the writer is not currently
            // inside `publish`'s critical section (or just finished one);
            // worst case this read races a subsequent write and `after`
            // catches it below.
            let snapshot = unsafe { *self.data.get() };
            let after = self.write_seq.load(Ordering::Acquire);
            if before == after {
                return snapshot;
            }
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reads_zero_initialized_state_before_any_publish() {
        let bus = EngineStateBus::new();
        let snap = bus.snapshot();
        assert_eq!(snap.rpm, 0);
        assert!(!snap.running);
    }

    #[test]
    fn snapshot_reflects_latest_publish() {
        let bus = EngineStateBus::new();
        let mut s = EngineState::default();
        s.rpm = 3500;
        s.running = true;
        bus.publish(s);
        let snap = bus.snapshot();
        assert_eq!(snap.rpm, 3500);
        assert!(snap.running);
    }

    #[test]
    fn concurrent_publish_and_read_never_observes_torn_state() {
        let bus = Arc::new(EngineStateBus::new());
        let writer_bus = bus.clone();
        let writer = thread::spawn(move || {
            for rpm in 0..5000u32 {
                let mut s = EngineState::default();
                s.rpm = rpm;
                s.tooth_position = rpm % 36;
                writer_bus.publish(s);
            }
        });

        for _ in 0..2000 {
            let snap = bus.snapshot();
            // Torn-state detector: these two fields are always written
            // together from the same loop index in the writer above.
            assert!(snap.tooth_position == snap.rpm % 36);
        }
        writer.join().unwrap();
    }
}
