//! # Simulated incubator
//!
//! A lumped two-node thermal model: the heater warms the air, the air warms the
//! product (probe), both lose heat towards the ambient. Good enough to close the
//! loop on a host without hardware.

use core::cell::Cell;

use crate::heater::HeaterOutput;
use crate::sensor::{SensorBus, SensorFault};

/// Thermal model, temperatures in °C, time in seconds.
#[derive(Copy, Clone, Debug)]
pub struct Plant {
    pub ambient: f32,
    pub air: f32,
    pub probe: f32,
    /// Air warming rate at full duty, K/s.
    pub heater_gain: f32,
    /// Air to ambient coupling, 1/s.
    pub air_loss: f32,
    /// Air to probe coupling, 1/s.
    pub probe_coupling: f32,
    /// Probe self-heating, K/s. Fermenting tempeh produces heat.
    pub probe_heat: f32,
}

impl Default for Plant {
    fn default() -> Self {
        Self {
            ambient: 20.0,
            air: 20.0,
            probe: 20.0,
            heater_gain: 0.05,
            air_loss: 0.002,
            probe_coupling: 0.004,
            probe_heat: 0.0,
        }
    }
}

impl Plant {
    /// Advance by `dt` seconds with the heater at `duty`.
    pub fn step(&mut self, duty: u8, dt: f32) {
        let heat = self.heater_gain * duty as f32 / u8::MAX as f32;
        let to_probe = (self.air - self.probe) * self.probe_coupling;
        self.air += (heat - (self.air - self.ambient) * self.air_loss - to_probe) * dt;
        self.probe += (to_probe + self.probe_heat) * dt;
    }
}

/// Raw Q4 sample of `temperature`, as a DS18x20 at 12 bit would report it.
pub fn raw(temperature: f32) -> i16 {
    (temperature * 16.0) as i16
}

/// Sensor bus reading from a shared [`Plant`].
///
/// Sensor 0 is in the air, sensor 1 in the product.
#[derive(Debug)]
pub struct SimBus<'a> {
    plant: &'a Cell<Plant>,
    sensors: usize,
    /// Fault returned by the next bus operations until cleared.
    pub fault: Option<SensorFault>,
    latched: [i16; 2],
}

impl<'a> SimBus<'a> {
    pub fn new(plant: &'a Cell<Plant>, sensors: usize) -> Self {
        Self {
            plant,
            sensors,
            fault: None,
            latched: [0; 2],
        }
    }

    fn check(&self) -> Result<(), SensorFault> {
        self.fault.map_or(Ok(()), Err)
    }
}

impl SensorBus for SimBus<'_> {
    fn probe(&mut self) -> Result<usize, SensorFault> {
        self.check()?;
        Ok(self.sensors)
    }

    fn start_conversion(&mut self) -> Result<(), SensorFault> {
        self.check()?;
        let plant = self.plant.get();
        self.latched = [raw(plant.air), raw(plant.probe)];
        Ok(())
    }

    fn read_channel(&mut self, index: usize) -> Result<i16, SensorFault> {
        self.check()?;
        self.latched
            .get(index)
            .copied()
            .filter(|_| index < self.sensors)
            .ok_or(SensorFault::ReadTimeout)
    }
}

/// Heater driving a shared [`Plant`] for one tick.
#[derive(Debug)]
pub struct SimHeater<'a> {
    duty: &'a Cell<u8>,
}

impl<'a> SimHeater<'a> {
    pub fn new(duty: &'a Cell<u8>) -> Self {
        Self { duty }
    }
}

impl HeaterOutput for SimHeater<'_> {
    fn set_duty(&mut self, duty: u8) {
        self.duty.set(duty);
    }
}
