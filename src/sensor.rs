//! # Sensor acquisition
//!
//! Every tick the result of the conversion started on the previous tick is read
//! from each present channel, then the next bus-wide conversion is started right
//! away. The conversion time (up to 750 ms at 12 bit) thus overlaps the control
//! period and reads never wait on it.
//!
//! A single failing read or conversion start faults the whole tick. The cascade
//! needs both channels in dual mode, so there is no partial result.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::filter::{MovingAverage, N_AVG};
use crate::fixed::Fixed;

/// Failure classes reported by the sensor bus. Zero is reserved for "healthy".
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, AsRefStr, Serialize,
)]
#[repr(u8)]
pub enum SensorFault {
    /// No presence pulse after a bus reset.
    BusAbsent = 1,
    /// Device search found nothing or aborted.
    SearchFailed = 2,
    /// ROM or scratchpad CRC mismatch.
    IntegrityCheck = 3,
    /// Family code is not a DS18x20.
    UnknownFamily = 4,
    /// Device did not answer a read in time.
    ReadTimeout = 5,
}

impl SensorFault {
    /// Code shown by the display and serial collaborators.
    pub fn code(self) -> u8 {
        self.into()
    }
}

/// The sensor bus as seen by the controller.
///
/// Channels are addressed by discovery index. Raw values are signed Q4 degrees
/// Celsius as found in a DS18x20 scratchpad.
pub trait SensorBus {
    /// (Re-)initialize the bus and enumerate devices. Returns the channel count.
    fn probe(&mut self) -> Result<usize, SensorFault>;

    /// Start a conversion on all devices at once.
    fn start_conversion(&mut self) -> Result<(), SensorFault>;

    /// Fetch the result of the last conversion of device `index`.
    fn read_channel(&mut self, index: usize) -> Result<i16, SensorFault>;
}

impl<T: SensorBus + ?Sized> SensorBus for &mut T {
    fn probe(&mut self) -> Result<usize, SensorFault> {
        (**self).probe()
    }

    fn start_conversion(&mut self) -> Result<(), SensorFault> {
        (**self).start_conversion()
    }

    fn read_channel(&mut self, index: usize) -> Result<i16, SensorFault> {
        (**self).read_channel(index)
    }
}

/// Role of a sensor channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, AsRefStr)]
#[repr(u8)]
pub enum Channel {
    Air = 0,
    Probe = 1,
}

/// Number of sensors found on the bus, fixed for the run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SensorMode {
    /// Only the air sensor. The outer loop is bypassed.
    Single,
    /// Air and probe sensors, full cascade.
    Dual,
}

impl SensorMode {
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(Self::Single),
            2 => Some(Self::Dual),
            _ => None,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Dual => 2,
        }
    }
}

/// Mapping of discovery order to channel roles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// First discovered device is the air sensor.
    #[default]
    Discovery,
    /// First discovered device is the probe sensor.
    Swapped,
}

impl ChannelOrder {
    /// Bus index of `channel` in `mode`, `None` if the channel is absent.
    ///
    /// With a single sensor there is nothing to swap: index 0 is the air sensor.
    pub fn index(self, channel: Channel, mode: SensorMode) -> Option<usize> {
        match (mode, self, channel) {
            (SensorMode::Single, _, Channel::Air) => Some(0),
            (SensorMode::Single, _, Channel::Probe) => None,
            (SensorMode::Dual, Self::Discovery, ch) => Some(ch as usize),
            (SensorMode::Dual, Self::Swapped, ch) => Some(1 - ch as usize),
        }
    }
}

/// Per-channel state.
#[derive(Copy, Clone, Debug, Default)]
pub struct ChannelState {
    pub filter: MovingAverage,
    /// Filtered temperature.
    pub value: Fixed,
    pub fault: Option<SensorFault>,
}

/// Outcome of one acquisition step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// Fresh filtered values, but the window is not populated yet.
    WarmingUp,
    /// Fresh filtered values, ready for control.
    Ready,
}

/// Sensor channel bookkeeping and the read/start pipeline.
#[derive(Clone, Debug)]
pub struct Acquisition {
    order: ChannelOrder,
    mode: Option<SensorMode>,
    channels: [ChannelState; 2],
    warmup: usize,
    linked: bool,
}

impl Acquisition {
    pub fn new(order: ChannelOrder) -> Self {
        Self {
            order,
            mode: None,
            channels: Default::default(),
            warmup: 0,
            linked: false,
        }
    }

    /// Sensor mode, `None` until the first successful probe.
    pub fn mode(&self) -> Option<SensorMode> {
        self.mode
    }

    /// Whether the bus is probed and a conversion is in flight.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn channel(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel as usize]
    }

    /// Filtered value of `channel`, `None` if that sensor is not present.
    pub fn value(&self, channel: Channel) -> Option<Fixed> {
        let mode = self.mode?;
        self.order
            .index(channel, mode)
            .map(|_| self.channels[channel as usize].value)
    }

    /// Probe the bus, reset channel state and start the first conversion.
    ///
    /// The channel count of the first successful probe is kept for the whole
    /// run. A later probe that finds a different count is a fault.
    pub fn link<B: SensorBus>(&mut self, bus: &mut B) -> Result<SensorMode, SensorFault> {
        self.linked = false;
        let count = bus.probe()?;
        let found = SensorMode::from_count(count).ok_or(if count == 0 {
            SensorFault::BusAbsent
        } else {
            SensorFault::SearchFailed
        })?;
        let mode = match self.mode {
            Some(mode) if mode != found => {
                log::warn!("Sensor count changed from {} to {}", mode.channels(), count);
                return Err(SensorFault::SearchFailed);
            }
            Some(mode) => mode,
            None => {
                log::info!("Found {} temperature sensor(s)", count);
                self.mode = Some(found);
                found
            }
        };

        for ch in self.channels.iter_mut() {
            *ch = ChannelState::default();
        }
        self.warmup = 0;

        bus.start_conversion()?;
        self.linked = true;
        Ok(mode)
    }

    /// Drop the link after a faulted cycle. [`Self::link`] has to succeed before
    /// the next acquisition.
    pub fn unlink(&mut self) {
        self.linked = false;
    }

    /// Read all present channels, then start the next conversion.
    ///
    /// Filters are only updated if every bus operation succeeded.
    pub fn acquire<B: SensorBus>(&mut self, bus: &mut B) -> Result<Acquired, SensorFault> {
        let mode = match (self.mode, self.linked) {
            (Some(mode), true) => mode,
            _ => return Err(SensorFault::BusAbsent),
        };

        let mut raw = [None; 2];
        let mut first_fault = None;
        for ch in [Channel::Air, Channel::Probe] {
            let Some(index) = self.order.index(ch, mode) else {
                continue;
            };
            let state = &mut self.channels[ch as usize];
            match bus.read_channel(index) {
                Ok(value) => {
                    state.fault = None;
                    raw[ch as usize] = Some(value);
                }
                Err(fault) => {
                    state.fault = Some(fault);
                    first_fault.get_or_insert(fault);
                }
            }
        }

        // Keep the pipeline going even after a failed read, the start result
        // only matters if the reads were fine.
        let started = bus.start_conversion();

        if let Some(fault) = first_fault {
            return Err(fault);
        }
        started?;

        for (state, sample) in self.channels.iter_mut().zip(raw) {
            if let Some(sample) = sample {
                state.value = state.filter.update(sample);
            }
        }

        if self.warmup < N_AVG {
            self.warmup += 1;
            Ok(Acquired::WarmingUp)
        } else {
            Ok(Acquired::Ready)
        }
    }
}
