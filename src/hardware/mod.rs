//! # Tempeh Temperer firmware
//!
//! Hardware specific setup etc.

pub use stm32h7xx_hal as hal;

pub mod delay;
pub mod flash;
pub mod onewire;
pub mod pwm;
pub mod setup;

/// System timer (RTIC Monotonic) tick frequency
pub const MONOTONIC_FREQUENCY: u32 = 1_000;
rtic_monotonics::systick_monotonic!(Systick, MONOTONIC_FREQUENCY);

/// One-wire data line, open drain with external pull-up.
pub type OneWirePin = hal::gpio::gpiob::PB9<hal::gpio::Output<hal::gpio::OpenDrain>>;

pub type Sensors = onewire::Ds18x20Bus<OneWirePin, delay::AsmDelay>;

pub type HeaterDrive = crate::heater::PwmHeater<pwm::HeaterPwm>;

pub type BoardIncubator = crate::incubator::Incubator<Sensors, HeaterDrive, flash::FlashStorage>;
