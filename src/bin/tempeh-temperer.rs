//! # Tempeh Temperer
//!
//! Firmware for a fermentation incubator. On a host the control core runs
//! against a simulated incubator and prints telemetry.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
use panic_probe as _; // global panic handler

use tempeh_temperer::settings::Settings;

/// Telemetry is emitted every this many ticks.
const TELEMETRY_TICKS: u32 = 10;

#[cfg(not(target_os = "none"))]
fn main() {
    use core::cell::Cell;
    use tempeh_temperer::persistence::RamStorage;
    use tempeh_temperer::sim::{Plant, SimBus, SimHeater};
    use tempeh_temperer::Incubator;

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(json) => Settings::from_json(&json).unwrap_or_else(|e| {
            eprintln!("Invalid settings: {e:?}");
            std::process::exit(2)
        }),
        None => Settings {
            heater_enabled: true,
            ..Default::default()
        },
    };
    let ticks: u32 = args.next().and_then(|n| n.parse().ok()).unwrap_or(6 * 3600);

    let plant = Cell::new(Plant::default());
    let duty = Cell::new(0);
    let mut incubator = Incubator::new(
        SimBus::new(&plant, 2),
        SimHeater::new(&duty),
        RamStorage::<32>::new(),
        settings,
    );
    if let Err(fault) = incubator.initialize() {
        eprintln!("Sensor fault: {fault:?}");
    }

    for tick in 1..=ticks {
        incubator.tick();
        let mut p = plant.get();
        p.step(duty.get(), 1e-3 * tempeh_temperer::incubator::TICK_PERIOD_MS as f32);
        plant.set(p);

        if tick % (TELEMETRY_TICKS * 60) == 0 {
            match serde_json_core::to_string::<_, 512>(&incubator.telemetry()) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Telemetry serialization error: {e:?}"),
            }
        }
    }
}

#[cfg(target_os = "none")]
#[cfg_attr(target_os = "none", rtic::app(device = tempeh_temperer::hardware::hal::stm32, peripherals = true, dispatchers=[DCMI]))]
mod app {
    use super::*;
    use fugit::ExtU32;
    use rtic_monotonics::Monotonic;
    use tempeh_temperer::hardware::{setup::setup, BoardIncubator, Systick};
    use tempeh_temperer::incubator::{Incubator, TICK_PERIOD_MS};

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        incubator: BoardIncubator,
    }

    fn settings() -> Settings {
        let Some(json) = option_env!("TEMPEH_SETTINGS") else {
            return Settings::default();
        };
        Settings::from_json(json).unwrap_or_else(|e| {
            log::error!("Invalid settings, using defaults: {:?}", e);
            Settings::default()
        })
    }

    #[init]
    fn init(c: init::Context) -> (Shared, Local) {
        let devices = setup(c.core, c.device).unwrap();

        let mut incubator =
            Incubator::new(devices.bus, devices.heater, devices.storage, settings());
        if let Err(fault) = incubator.initialize() {
            log::warn!("Starting without sensors: {:?}", fault);
        }

        control::spawn().unwrap();

        (Shared {}, Local { incubator })
    }

    #[task(priority = 1, local=[incubator])]
    async fn control(c: control::Context) {
        let incubator = c.local.incubator;
        let mut next = Systick::now();
        let mut ticks = 0u32;
        loop {
            let tick = incubator.tick();
            log::debug!("{:?}", tick);

            ticks = ticks.wrapping_add(1);
            if ticks % TELEMETRY_TICKS == 0 {
                match serde_json_core::to_string::<_, 512>(&incubator.telemetry()) {
                    Ok(json) => log::info!("{}", json),
                    Err(e) => log::error!("Telemetry serialization error: {:?}", e),
                }
            }

            next += TICK_PERIOD_MS.millis();
            Systick::delay_until(next).await;
        }
    }
}
