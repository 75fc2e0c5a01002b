//! Board bring-up: clocks, logging, sensor bus, heater and flash.

use log::info;
use one_wire_bus::OneWire;
use rtt_logger::RTTLogger;

use super::{
    delay::AsmDelay,
    flash::FlashStorage,
    hal::{self, flash::FlashExt, prelude::*},
    onewire::Ds18x20Bus,
    pwm, HeaterDrive, Sensors, Systick,
};

pub struct IncubatorDevices {
    pub bus: Sensors,
    pub heater: HeaterDrive,
    pub storage: FlashStorage,
}

#[derive(Debug)]
pub enum Error {
    /// The one-wire line is held low.
    BusNotHigh,
    /// The part has a single flash bank.
    NoSecondBank,
}

pub fn setup(
    core: rtic::export::Peripherals,
    device: hal::stm32::Peripherals,
) -> Result<IncubatorDevices, Error> {
    static LOGGER: RTTLogger = RTTLogger::new(log::LevelFilter::Info);
    rtt_target::rtt_init_print!();
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Info))
        .ok();
    info!("---Starting Hardware Setup");

    let pwr = device.PWR.constrain();
    let vos = pwr.freeze();
    let rcc = device.RCC.constrain();
    let ccdr = rcc
        .use_hse(8.MHz())
        .sys_ck(400.MHz())
        .hclk(200.MHz())
        .freeze(vos, &device.SYSCFG);

    Systick::start(core.SYST, ccdr.clocks.sysclk().to_Hz());

    let gpiob = device.GPIOB.split(ccdr.peripheral.GPIOB);
    let gpioc = device.GPIOC.split(ccdr.peripheral.GPIOC);

    let delay = AsmDelay::new(ccdr.clocks.c_ck().to_Hz());
    let wire = OneWire::new(gpiob.pb9.into_open_drain_output()).map_err(|_| Error::BusNotHigh)?;
    let bus = Ds18x20Bus::new(wire, delay);

    let heater = pwm::heater(
        &ccdr.clocks,
        ccdr.peripheral.TIM3,
        device.TIM3,
        gpioc.pc7.into_alternate(),
    );

    let (_, bank2) = device.FLASH.split();
    let storage = FlashStorage::new(bank2.ok_or(Error::NoSecondBank)?);

    info!("---Hardware Setup done");
    Ok(IncubatorDevices {
        bus,
        heater,
        storage,
    })
}
