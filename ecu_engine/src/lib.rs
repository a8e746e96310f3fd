//! # ECU Engine
//!
//! The core binary: loads `project.toml`/`sensors.toml`/`tables/*.toml`,
//! wires the configured HAL backends, and runs the two loops the rest of
//! this workspace's peripherals observe over `EngineStateBus`:
//!
//! ```text
//! fast loop  (SchedulerRunner, busy-polls the crank/cam decoders)
//! slow loop  (SlowLoop, ~10 ms: sensors → wideband → alternator →
//!             fuel/spark → limp → publish)
//! ```
//!
//! Only the simulated HAL backend is wired up today (also the default in
//! `--sim`-less operation); a real backend plugs in at the same
//! `GpioPort`/`AdcReader`/`SpiBus`/`PwmChannel`/`Clock` seams. Split into a
//! library so `tests/` can drive `SlowLoop` and the decoder wiring directly,
//! the way `ecu_watchdog` separates its CLI shell from `supervisor`.

pub mod error;
pub mod shared_hal;
pub mod sim_engine;
pub mod slow_loop;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use ecu_common::config::load_project;
use ecu_common::consts::{CAM_PIN, CRANK_PIN};
use ecu_decoder::{CamDecoder, CrankDecoder};
use ecu_hal::sim::{SimAdc, SimClock, SimGpio, SimPwm, SimSpi};
use ecu_hal::{Edge, GpioPort};
use ecu_scheduler::{rt_setup, RealtimeScheduler, SchedulerRunner};
use ecu_sensors::{load_sensors, SensorHal, SensorLayer};
use ecu_state::EngineStateBus;
use ecu_tables::TuneTable;
use ecu_wideband::heater::BankHal;

pub use error::EngineError;
use shared_hal::SharedGpio;
use sim_engine::SimEngineThrottle;
use slow_loop::{SlowLoop, SlowLoopHal};

/// ECU Engine - crank/cam decode, fuel/spark compute, ignition scheduling
#[derive(Parser, Debug)]
#[command(name = "ecu_engine")]
#[command(author = "EVO-ECU")]
#[command(version)]
#[command(about = "Runs the ECU's fast and slow control loops")]
pub struct Args {
    /// Directory holding project.toml, sensors.toml, tables/
    #[arg(short, long, default_value = "/etc/ecu")]
    pub config_dir: PathBuf,

    /// Run the fast loop under a real-time scheduling policy
    #[arg(long)]
    pub rt: bool,

    /// CPU core to pin the fast loop to when `--rt` is set
    #[arg(long, default_value_t = 0)]
    pub rt_core: usize,

    /// Real-time priority to request when `--rt` is set
    #[arg(long, default_value_t = 80)]
    pub rt_priority: i32,

    /// Target RPM for the built-in trigger-wheel simulator
    #[arg(long, default_value_t = 800)]
    pub sim_rpm: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Configure `tracing-subscriber` from `args`, same shape as `ecu_watchdog`.
pub fn setup_tracing(args: &Args) {
    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load configuration, wire the simulated HAL, and run both loops until
/// `ctrlc` (or `running` going false) signals shutdown.
pub fn run(args: &Args) -> Result<(), EngineError> {
    let cfg = load_project(&args.config_dir)?;
    let (sensor_descriptors, fault_rules) = load_sensors(&args.config_dir)?;

    let ve_table = load_table_or_warn(&args.config_dir, "ve");
    let afr_table = load_table_or_warn(&args.config_dir, "afr");
    let spark_table = load_table_or_warn(&args.config_dir, "spark");

    let gpio_bank = Arc::new(Mutex::new(SimGpio::new()));
    let shared_adc = SimAdc::new();
    let clock = SimClock::new();

    let crank_decoder = Arc::new(Mutex::new(CrankDecoder::new(
        cfg.engine.crank_teeth as u32,
        cfg.engine.crank_missing as u32,
    )));
    let crank_counters = crank_decoder.lock().unwrap().counters();
    let cam_decoder = Arc::new(CamDecoder::new(cfg.engine.crank_teeth as u32, crank_counters.clone()));

    {
        let crank_decoder = crank_decoder.clone();
        let clock = clock.clone();
        gpio_bank.lock().unwrap().attach_edge_interrupt(
            CRANK_PIN,
            Edge::Rising,
            Box::new(move || {
                let now_us = clock.now_us();
                crank_decoder.lock().unwrap().on_tooth_edge(now_us);
            }),
        )?;
    }
    if cfg.engine.has_cam {
        let cam_decoder = cam_decoder.clone();
        let clock = clock.clone();
        gpio_bank.lock().unwrap().attach_edge_interrupt(
            CAM_PIN,
            Edge::Rising,
            Box::new(move || {
                cam_decoder.on_cam_edge(clock.now_us());
            }),
        )?;
    }

    let bus = Arc::new(EngineStateBus::new());
    let running = Arc::new(AtomicBool::new(true));

    let sim_throttle = Arc::new(SimEngineThrottle::new(0));
    let sim_handle = sim_engine::spawn(
        gpio_bank.clone(),
        CRANK_PIN,
        CAM_PIN,
        cfg.engine.crank_teeth as u32,
        cfg.engine.crank_missing as u32,
        sim_throttle.clone(),
        running.clone(),
    );
    sim_throttle.set_rpm(args.sim_rpm);

    let scheduler = RealtimeScheduler::new(&cfg)?;
    let mut scheduler_runner = SchedulerRunner::new(scheduler, crank_counters.clone(), bus.clone());

    if args.rt {
        rt_setup(args.rt_core, args.rt_priority)?;
    }

    let fast_loop_running = running.clone();
    let fast_loop_cfg = cfg.clone();
    let fast_loop_clock = clock.clone();
    let mut fast_loop_gpio = SharedGpio::new(gpio_bank.clone());
    let fast_loop_handle = std::thread::spawn(move || {
        while fast_loop_running.load(Ordering::Relaxed) {
            if let Err(e) = scheduler_runner.run_once(&mut fast_loop_gpio, &fast_loop_clock, &fast_loop_cfg) {
                error!("fast loop error: {e}");
            }
        }
    });

    let sensor_layer = SensorLayer::new(sensor_descriptors, fault_rules);
    let sensor_hal = SensorHal {
        onchip_adc: Box::new(shared_adc.clone()),
        external_adc16: Vec::new(),
        external_adc12: Vec::new(),
        gpio: Box::new(SharedGpio::new(gpio_bank.clone())),
    };

    let wideband_hal = if cfg.wideband_enabled {
        cfg.wideband_pins.as_ref().map(|pins| {
            [
                BankHal {
                    spi: Box::new(SimSpi::default()),
                    cs_gpio: Box::new(SharedGpio::new(gpio_bank.clone())),
                    cs_pin: pins.cs_pins[0],
                    ua_adc: Box::new(shared_adc.clone()),
                    ua_channel: pins.ua_channels[0],
                    ur_adc: Box::new(shared_adc.clone()),
                    ur_channel: pins.ur_channels[0],
                    heater_pwm: Box::new(SimPwm::new()),
                },
                BankHal {
                    spi: Box::new(SimSpi::default()),
                    cs_gpio: Box::new(SharedGpio::new(gpio_bank.clone())),
                    cs_pin: pins.cs_pins[1],
                    ua_adc: Box::new(shared_adc.clone()),
                    ua_channel: pins.ua_channels[1],
                    ur_adc: Box::new(shared_adc.clone()),
                    ur_channel: pins.ur_channels[1],
                    heater_pwm: Box::new(SimPwm::new()),
                },
            ]
        })
    } else {
        None
    };

    let slow_loop_hal = SlowLoopHal {
        sensor_hal,
        wideband_hal,
        alternator_pwm: Box::new(SimPwm::new()),
        oil_gpio: Box::new(SharedGpio::new(gpio_bank.clone())),
        oil_adc: Box::new(shared_adc.clone()),
        cel_gpio: Box::new(SharedGpio::new(gpio_bank.clone())),
    };

    let mut slow_loop = SlowLoop::new(
        cfg.clone(),
        crank_counters,
        cam_decoder,
        bus.clone(),
        sensor_layer,
        ve_table,
        afr_table,
        spark_table,
        slow_loop_hal,
    );
    slow_loop.begin(clock.now_us() / 1000)?;

    let running_handler = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        running_handler.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to install signal handler: {e}");
    }

    info!("entering slow loop at {} ms period", SlowLoop::period_ms());
    while running.load(Ordering::SeqCst) {
        let now_ms = clock.now_us() / 1000;
        slow_loop.tick(now_ms);
        std::thread::sleep(Duration::from_millis(SlowLoop::period_ms()));
    }

    info!("shutting down");
    let _ = fast_loop_handle.join();
    let _ = sim_handle.join();
    info!("ECU Engine shutdown complete");
    Ok(())
}

fn load_table_or_warn(dir: &std::path::Path, name: &str) -> Option<TuneTable> {
    match TuneTable::load(dir, name) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("tune table '{name}' unavailable, using pipeline defaults: {e}");
            None
        }
    }
}
