//! Synthesizes crank/cam GPIO edges at a configurable target RPM.
//!
//! Nothing in this workspace has a real trigger-wheel driver, so the
//! binary itself stands in for one in simulation, advancing its own
//! physical state on a fixed tick instead of reading real feedback.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ecu_hal::sim::SimGpio;
use ecu_hal::Level;

/// Shared target engine speed the generator thread reads every tooth period.
#[derive(Default)]
pub struct SimEngineThrottle {
    target_rpm: AtomicU32,
}

impl SimEngineThrottle {
    /// Start the throttle at `initial_rpm` (0 parks the generator).
    pub fn new(initial_rpm: u32) -> Self {
        Self { target_rpm: AtomicU32::new(initial_rpm) }
    }

    /// Command a new target RPM; 0 stops tooth generation entirely.
    pub fn set_rpm(&self, rpm: u32) {
        self.target_rpm.store(rpm, Ordering::Relaxed);
    }

    /// The currently commanded target RPM.
    pub fn rpm(&self) -> u32 {
        self.target_rpm.load(Ordering::Relaxed)
    }
}

/// Spawn the background thread that drives `crank_pin`/`cam_pin` on `gpio`
/// at `throttle`'s current target RPM, until `running` clears.
///
/// One missing-tooth window per revolution is produced by simply not
/// firing the crank pin during the last `missing_teeth` tooth slots —
/// `CrankDecoder`'s gap detector needs nothing more than the resulting long
/// period between real edges. A cam pulse fires at tooth 0 every other
/// revolution, giving `CamDecoder` a once-per-720-degrees reference edge.
pub fn spawn(
    gpio: Arc<Mutex<SimGpio>>,
    crank_pin: u32,
    cam_pin: u32,
    total_teeth: u32,
    missing_teeth: u32,
    throttle: Arc<SimEngineThrottle>,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let teeth_present = total_teeth.saturating_sub(missing_teeth);
        let mut tooth = 0u32;
        let mut revolution = 0u32;

        while running.load(Ordering::Relaxed) {
            let rpm = throttle.rpm();
            if rpm == 0 {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }

            let period_us = 60_000_000u64 / (rpm as u64 * total_teeth as u64);
            std::thread::sleep(Duration::from_micros(period_us.max(1)));

            if tooth < teeth_present {
                let mut g = gpio.lock().unwrap();
                g.fire_edge(crank_pin, Level::Low);
                g.fire_edge(crank_pin, Level::High);
                if tooth == 0 && revolution % 2 == 0 {
                    g.fire_edge(cam_pin, Level::Low);
                    g.fire_edge(cam_pin, Level::High);
                }
            }

            tooth += 1;
            if tooth >= total_teeth {
                tooth = 0;
                revolution = revolution.wrapping_add(1);
            }
        }
    })
}
