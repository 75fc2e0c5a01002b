//! # Incubator control core
//!
//! [`Incubator`] owns the collaborators and the [`ControllerState`] and runs one
//! acquisition, control and actuation cycle per [`Incubator::tick`]. The caller
//! schedules ticks at a fixed rate ([`TICK_PERIOD_MS`]) from a single context.

use core::fmt::Debug;

use embedded_storage::Storage;

use crate::controller::{AirLoop, Cascade, Inputs, Outputs, ProbeLoop};
use crate::fixed::Fixed;
use crate::heater::{Heater, HeaterOutput};
use crate::persistence::{self, Slot};
use crate::sensor::{Acquired, Acquisition, Channel, SensorBus, SensorFault, SensorMode};
use crate::settings::{is_valid_target, Settings};
use crate::statistics::Buffer;
use crate::telemetry::Telemetry;

/// Nominal tick period.
pub const TICK_PERIOD_MS: u32 = 1_000;

/// Shared state read (and partly written) by the UI and serial collaborators.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub measured_air: Fixed,
    /// `None` without a probe sensor.
    pub measured_probe: Option<Fixed>,
    pub target_probe: Fixed,
    pub target_air: Fixed,
    /// Commanded heater power, zero while faulted.
    pub heater_power: Fixed,
    pub heater_enabled: bool,
    pub fault: Option<SensorFault>,
}

/// Result of a tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// The bus was (re-)probed and the first conversion started.
    Linked(SensorMode),
    /// Filters are filling, no control action.
    WarmingUp,
    /// Both loops ran, `duty` was written to the heater.
    Controlled { duty: u8 },
    /// The heater was switched off and disabled.
    Faulted(SensorFault),
}

/// Rejected probe set-point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidTarget;

pub struct Incubator<B, H, S> {
    bus: B,
    heater: Heater<H>,
    storage: S,
    settings: Settings,
    acquisition: Acquisition,
    cascade: Cascade,
    state: ControllerState,
    statistics: Buffer,
    cycle: u32,
}

impl<B, H, S> Incubator<B, H, S>
where
    B: SensorBus,
    H: HeaterOutput,
    S: Storage,
    S::Error: Debug,
{
    /// Take over the collaborators. The heater is switched off.
    ///
    /// A configured set-point outside the valid range is replaced by the default.
    pub fn new(bus: B, heater: H, storage: S, settings: Settings) -> Self {
        let target = if is_valid_target(settings.target) {
            settings.target
        } else {
            log::warn!("Ignoring configured set-point {}", settings.target);
            Settings::default().target
        };
        Self {
            bus,
            heater: Heater::new(heater),
            storage,
            acquisition: Acquisition::new(settings.channel_order),
            cascade: Cascade::new(ProbeLoop::default(), AirLoop::default()),
            state: ControllerState {
                target_probe: Fixed::from_f32(target),
                heater_enabled: settings.heater_enabled,
                ..Default::default()
            },
            settings,
            statistics: Buffer::default(),
            cycle: 0,
        }
    }

    /// Restore persisted state and probe the sensors.
    ///
    /// Missing slots fall back to the configured set-point and zero integrals.
    /// A failed probe leaves the heater off and is retried by [`Self::tick`].
    pub fn initialize(&mut self) -> Result<SensorMode, SensorFault> {
        match persistence::load(&mut self.storage, Slot::ProbeSetpoint).map(Fixed::from_bits) {
            Some(target) if is_valid_target(target.to_f32()) => self.state.target_probe = target,
            Some(target) => log::warn!("Ignoring stored set-point {}", target),
            None => {}
        }
        log::info!("Probe set-point {}", self.state.target_probe);

        let outer = persistence::load(&mut self.storage, Slot::OuterIntegral).unwrap_or(0);
        let inner = persistence::load(&mut self.storage, Slot::InnerIntegral).unwrap_or(0);
        self.cascade = Cascade::new(ProbeLoop::new(outer), AirLoop::new(Fixed::from_bits(inner)));

        self.heater.off();
        self.cycle = 0;
        match self.acquisition.link(&mut self.bus) {
            Ok(mode) => {
                self.cascade.warm_up();
                self.bypass();
                Ok(mode)
            }
            Err(fault) => {
                self.fail_safe(fault);
                Err(fault)
            }
        }
    }

    /// Run one cycle.
    pub fn tick(&mut self) -> Tick {
        if !self.acquisition.is_linked() {
            return match self.acquisition.link(&mut self.bus) {
                Ok(mode) => {
                    log::info!("Sensor bus recovered");
                    self.cascade.warm_up();
                    self.bypass();
                    Tick::Linked(mode)
                }
                Err(fault) => {
                    self.fail_safe(fault);
                    Tick::Faulted(fault)
                }
            };
        }

        let acquired = match self.acquisition.acquire(&mut self.bus) {
            Ok(acquired) => acquired,
            Err(fault) => {
                self.fail_safe(fault);
                // Re-probe right away so the next tick can read again.
                if let Err(fault) = self.acquisition.link(&mut self.bus) {
                    log::warn!("Re-probe failed: {:?}", fault);
                }
                return Tick::Faulted(fault);
            }
        };

        self.state.fault = None;
        self.state.measured_air = self.acquisition.value(Channel::Air).unwrap_or_default();
        self.state.measured_probe = self.acquisition.value(Channel::Probe);
        self.statistics
            .update(self.state.measured_probe.unwrap_or(self.state.measured_air));

        let Some(mode) = self.acquisition.mode() else {
            return Tick::WarmingUp;
        };
        if acquired == Acquired::WarmingUp {
            self.cascade.warm_up();
            self.bypass();
            return Tick::WarmingUp;
        }

        let Outputs { target_air, power } = self.cascade.update(
            mode,
            Inputs {
                target_probe: self.state.target_probe,
                measured_probe: self.state.measured_probe,
                measured_air: self.state.measured_air,
            },
        );
        self.state.target_air = target_air;
        self.state.heater_power = power;
        let duty = self.heater.apply(power, self.state.heater_enabled);

        self.cycle = self.cycle.wrapping_add(1);
        let period = self.settings.checkpoint_period;
        if period != 0 && self.cycle % period == 0 {
            self.checkpoint(mode);
        }

        Tick::Controlled { duty }
    }

    /// Persist the integrals of the active loops.
    pub fn checkpoint(&mut self, mode: SensorMode) {
        let outer = self.cascade.probe.integral();
        if mode == SensorMode::Dual && outer != 0 {
            persistence::save(&mut self.storage, Slot::OuterIntegral, outer).ok();
        }
        let inner = self.cascade.air.integral().to_bits();
        if inner != 0 {
            persistence::save(&mut self.storage, Slot::InnerIntegral, inner).ok();
        }
    }

    /// Change and persist the probe set-point.
    pub fn set_target_probe(&mut self, target: Fixed) -> Result<(), InvalidTarget> {
        if !is_valid_target(target.to_f32()) {
            return Err(InvalidTarget);
        }
        log::info!("New set-point {}", target);
        self.state.target_probe = target;
        self.bypass();
        persistence::save(&mut self.storage, Slot::ProbeSetpoint, target.to_bits()).ok();
        Ok(())
    }

    /// Enable or disable the heater. A sensor fault disables it again.
    pub fn set_heater_enabled(&mut self, enabled: bool) {
        if enabled != self.state.heater_enabled {
            log::info!("{} heater", if enabled { "Enabling" } else { "Disabling" });
        }
        self.state.heater_enabled = enabled;
        if !enabled {
            self.heater.apply(self.state.heater_power, false);
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn heater(&self) -> &Heater<H> {
        &self.heater
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Snapshot the shared state and drain the statistics buffer.
    pub fn telemetry(&mut self) -> Telemetry {
        Telemetry {
            mode: self.acquisition.mode(),
            air: self.state.measured_air.to_f32(),
            probe: self.state.measured_probe.map(Fixed::to_f32),
            target_probe: self.state.target_probe.to_f32(),
            target_air: self.state.target_air.to_f32(),
            power: self.state.heater_power.to_f32(),
            duty: self.heater.duty(),
            enabled: self.state.heater_enabled,
            fault: self.state.fault.map_or(0, SensorFault::code),
            outer: self.cascade.probe.phase,
            inner: self.cascade.air.phase,
            statistics: core::mem::take(&mut self.statistics).into(),
        }
    }

    /// Single sensor: the air set-point is the probe set-point.
    fn bypass(&mut self) {
        if self.acquisition.mode() == Some(SensorMode::Single) {
            self.state.target_air = self.state.target_probe;
        }
    }

    fn fail_safe(&mut self, fault: SensorFault) {
        log::warn!("Sensor fault {} ({:?}), heater off", fault.code(), fault);
        self.state.heater_enabled = false;
        self.state.heater_power = Fixed::ZERO;
        self.state.fault = Some(fault);
        self.heater.off();
        self.acquisition.unlink();
        self.bypass();
    }
}
