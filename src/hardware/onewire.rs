//! DS18x20 temperature sensors on a one-wire bus.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;
use one_wire_bus::{crc, Address, OneWire, OneWireError};

use crate::sensor::{SensorBus, SensorFault};

const CONVERT_T: u8 = 0x44;
const WRITE_SCRATCHPAD: u8 = 0x4E;
const READ_SCRATCHPAD: u8 = 0xBE;

/// DS18S20, 9 bit, half degree steps.
pub const FAMILY_DS18S20: u8 = 0x10;
pub const FAMILY_DS1822: u8 = 0x22;
pub const FAMILY_DS18B20: u8 = 0x28;

/// Configuration register value for 12 bit resolution (750 ms conversion).
const RESOLUTION_12BIT: u8 = 0x7F;

/// Maximum number of sensors taken from the bus.
pub const MAX_SENSORS: usize = 2;

fn fault<E>(err: OneWireError<E>) -> SensorFault {
    match err {
        OneWireError::CrcMismatch => SensorFault::IntegrityCheck,
        OneWireError::FamilyCodeMismatch => SensorFault::UnknownFamily,
        OneWireError::Timeout => SensorFault::ReadTimeout,
        _ => SensorFault::BusAbsent,
    }
}

/// Scratchpad temperature to 1/16 °C.
fn to_raw(family: u8, scratchpad: &[u8; 9]) -> i16 {
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    if family == FAMILY_DS18S20 {
        raw << 3
    } else {
        raw
    }
}

pub struct Ds18x20Bus<P, D> {
    wire: OneWire<P>,
    delay: D,
    sensors: Vec<Address, MAX_SENSORS>,
}

impl<P, D, E> Ds18x20Bus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    pub fn new(wire: OneWire<P>, delay: D) -> Self {
        Self {
            wire,
            delay,
            sensors: Vec::new(),
        }
    }

    /// Reset pulse, fails without a presence pulse.
    fn reset(&mut self) -> Result<(), SensorFault> {
        match self.wire.reset(&mut self.delay) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SensorFault::BusAbsent),
            Err(e) => Err(fault(e)),
        }
    }

    fn configure(&mut self) -> Result<(), SensorFault> {
        for address in self.sensors.clone() {
            self.reset()?;
            self.wire
                .match_address(&address, &mut self.delay)
                .map_err(fault)?;
            self.wire
                .write_byte(WRITE_SCRATCHPAD, &mut self.delay)
                .map_err(fault)?;
            // Alarm thresholds unused.
            let config: &[u8] = if address.family_code() == FAMILY_DS18S20 {
                &[0, 0]
            } else {
                &[0, 0, RESOLUTION_12BIT]
            };
            self.wire
                .write_bytes(config, &mut self.delay)
                .map_err(fault)?;
        }
        Ok(())
    }
}

impl<P, D, E> SensorBus for Ds18x20Bus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    fn probe(&mut self) -> Result<usize, SensorFault> {
        self.sensors.clear();
        self.reset()?;
        for device in self.wire.devices(false, &mut self.delay) {
            let address = device.map_err(|_| SensorFault::SearchFailed)?;
            match address.family_code() {
                FAMILY_DS18S20 | FAMILY_DS1822 | FAMILY_DS18B20 => {}
                family => {
                    log::warn!("Unsupported family {:#04x} at {:?}", family, address);
                    return Err(SensorFault::UnknownFamily);
                }
            }
            if self.sensors.push(address).is_err() {
                log::warn!("Ignoring extra sensor {:?}", address);
            }
        }
        log::info!("Found {} sensor(s): {:?}", self.sensors.len(), self.sensors);
        self.configure()?;
        Ok(self.sensors.len())
    }

    fn start_conversion(&mut self) -> Result<(), SensorFault> {
        self.reset()?;
        self.wire.skip_address(&mut self.delay).map_err(fault)?;
        self.wire
            .write_byte(CONVERT_T, &mut self.delay)
            .map_err(fault)
    }

    fn read_channel(&mut self, index: usize) -> Result<i16, SensorFault> {
        let address = *self.sensors.get(index).ok_or(SensorFault::ReadTimeout)?;
        self.reset()?;
        self.wire
            .match_address(&address, &mut self.delay)
            .map_err(fault)?;
        self.wire
            .write_byte(READ_SCRATCHPAD, &mut self.delay)
            .map_err(fault)?;
        let mut scratchpad = [0u8; 9];
        self.wire
            .read_bytes(&mut scratchpad, &mut self.delay)
            .map_err(fault)?;
        crc::check_crc8::<E>(&scratchpad).map_err(fault)?;
        Ok(to_raw(address.family_code(), &scratchpad))
    }
}
