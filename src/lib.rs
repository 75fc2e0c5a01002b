#![no_std]

#[cfg(target_os = "none")]
pub mod hardware;

pub mod controller;
pub mod filter;
pub mod fixed;
pub mod heater;
pub mod incubator;
pub mod persistence;
pub mod sensor;
pub mod settings;
pub mod sim;
pub mod statistics;
pub mod telemetry;

pub use fixed::Fixed;
pub use incubator::{ControllerState, Incubator, Tick};
pub use sensor::{SensorBus, SensorFault, SensorMode};
