//! # Cascaded PI temperature control
//!
//! The outer loop turns the probe error into an air temperature set-point, the
//! inner loop turns the air error into heater power. With only an air sensor
//! the outer loop is bypassed and the probe set-point drives the inner loop
//! directly, which then integrates on its own.
//!
//! The two loops wind down differently: the outer integral snaps to the probe
//! set-point while the error is large, the inner integral snaps to the middle of
//! the power range.

use serde::Serialize;
use strum::AsRefStr;

use crate::fixed::Fixed;
use crate::sensor::SensorMode;

/// Probe error to air set-point gain, °C / °C.
pub const PROBE_KP: Fixed = Fixed::from_milli(10_000);
/// Outer integral is reset while the probe error exceeds this.
pub const PROBE_RESET_THRESHOLD: Fixed = Fixed::from_milli(300);
/// Resolution multiplier of the outer integral accumulator.
pub const PROBE_I_SCALE: i32 = 8;

/// Air set-point limits.
pub const AIR_MIN_LIMIT: Fixed = Fixed::from_milli(20_000);
pub const AIR_MAX_LIMIT: Fixed = Fixed::from_milli(38_000);

/// Inner integral is centered while the air error exceeds this.
pub const AIR_RESET_THRESHOLD: Fixed = Fixed::from_milli(1_500);

/// Heater power limits in duty units. Not zero at the bottom so the supply
/// (a USB power bank) does not switch itself off.
pub const POWER_MIN_LIMIT: Fixed = Fixed::from_int(4);
pub const POWER_MAX_LIMIT: Fixed = Fixed::from_int(0xff);

/// Inner loop gains, PWM units per °C and per °C·s.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AirGains {
    pub kp: Fixed,
    pub ki: Fixed,
}

impl AirGains {
    /// The outer loop integrates, the inner one only needs to be stiff.
    pub const DUAL: Self = Self {
        kp: Fixed::from_milli(200_000),
        ki: Fixed::ZERO,
    };

    /// No cascade, the inner loop carries the integral action.
    pub const SINGLE: Self = Self {
        kp: Fixed::from_milli(150_000),
        ki: Fixed::from_milli(500),
    };

    pub fn for_mode(mode: SensorMode) -> Self {
        match mode {
            SensorMode::Dual => Self::DUAL,
            SensorMode::Single => Self::SINGLE,
        }
    }
}

/// Loop phase.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, AsRefStr, Serialize)]
pub enum Phase {
    /// Waiting for the sensor filters to fill.
    #[default]
    WarmingUp,
    /// Error within the reset threshold, integrating.
    Tracking,
    /// Error beyond the reset threshold, integral pinned.
    SaturatedReset,
}

/// Contributions of the last step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Terms {
    pub error: Fixed,
    pub proportional: Fixed,
    pub integral: Fixed,
}

/// Probe temperature to air set-point.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProbeLoop {
    /// Integral in units of `1 / (64 * PROBE_I_SCALE)` °C.
    integral: i32,
    pub phase: Phase,
    pub terms: Terms,
}

impl ProbeLoop {
    pub fn new(integral: i32) -> Self {
        Self {
            integral,
            ..Default::default()
        }
    }

    /// Accumulator at [`PROBE_I_SCALE`] times the [`Fixed`] resolution.
    pub fn integral(&self) -> i32 {
        self.integral
    }

    pub fn set_integral(&mut self, integral: i32) {
        self.integral = integral;
    }

    /// Compute the air set-point.
    pub fn update(&mut self, target: Fixed, measured: Fixed) -> Fixed {
        let error = target - measured;
        let proportional = error.mul(PROBE_KP);

        if error.abs() > PROBE_RESET_THRESHOLD {
            self.integral = target.to_bits() * PROBE_I_SCALE;
            self.phase = Phase::SaturatedReset;
        } else {
            // Fixed unit step, slew limited regardless of the error magnitude.
            self.integral += error.to_bits().signum();
            self.integral = crate::fixed::limit(
                self.integral,
                AIR_MIN_LIMIT.to_bits() * PROBE_I_SCALE,
                AIR_MAX_LIMIT.to_bits() * PROBE_I_SCALE,
            );
            self.phase = Phase::Tracking;
        }

        let integral = Fixed::from_bits(self.integral / PROBE_I_SCALE);
        self.terms = Terms {
            error,
            proportional,
            integral,
        };
        (proportional + integral).clamp(AIR_MIN_LIMIT, AIR_MAX_LIMIT)
    }
}

/// Air temperature to heater power.
#[derive(Copy, Clone, Debug, Default)]
pub struct AirLoop {
    integral: Fixed,
    pub phase: Phase,
    pub terms: Terms,
}

impl AirLoop {
    pub fn new(integral: Fixed) -> Self {
        Self {
            integral,
            ..Default::default()
        }
    }

    pub fn integral(&self) -> Fixed {
        self.integral
    }

    pub fn set_integral(&mut self, integral: Fixed) {
        self.integral = integral;
    }

    /// Compute the heater power.
    pub fn update(&mut self, gains: AirGains, target: Fixed, measured: Fixed) -> Fixed {
        let error = target - measured;
        let proportional = error.mul(gains.kp);

        if error.abs() > AIR_RESET_THRESHOLD {
            self.integral = POWER_MIN_LIMIT.midpoint(POWER_MAX_LIMIT);
            self.phase = Phase::SaturatedReset;
        } else {
            self.integral = (self.integral + error.mul(gains.ki))
                .clamp(POWER_MIN_LIMIT, POWER_MAX_LIMIT);
            self.phase = Phase::Tracking;
        }

        self.terms = Terms {
            error,
            proportional,
            integral: self.integral,
        };
        (proportional + self.integral).clamp(POWER_MIN_LIMIT, POWER_MAX_LIMIT)
    }
}

/// Set-points and measurements going into a cascade step.
#[derive(Copy, Clone, Debug)]
pub struct Inputs {
    pub target_probe: Fixed,
    pub measured_probe: Option<Fixed>,
    pub measured_air: Fixed,
}

/// Result of a cascade step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Outputs {
    pub target_air: Fixed,
    pub power: Fixed,
}

/// Both loops and the mode they run in.
#[derive(Copy, Clone, Debug)]
pub struct Cascade {
    pub probe: ProbeLoop,
    pub air: AirLoop,
}

impl Cascade {
    pub fn new(probe: ProbeLoop, air: AirLoop) -> Self {
        Self { probe, air }
    }

    /// Run the outer loop (if a probe sensor is present) and the inner loop.
    pub fn update(&mut self, mode: SensorMode, inputs: Inputs) -> Outputs {
        let target_air = match (mode, inputs.measured_probe) {
            (SensorMode::Dual, Some(measured)) => {
                self.probe.update(inputs.target_probe, measured)
            }
            _ => inputs.target_probe,
        };
        let power = self
            .air
            .update(AirGains::for_mode(mode), target_air, inputs.measured_air);
        log::debug!(
            "target air {} power {} (p {} i {})",
            target_air,
            power,
            self.air.terms.proportional,
            self.air.terms.integral
        );
        Outputs { target_air, power }
    }

    /// Mark both loops as waiting for sensor data.
    pub fn warm_up(&mut self) {
        self.probe.phase = Phase::WarmingUp;
        self.air.phase = Phase::WarmingUp;
    }
}
