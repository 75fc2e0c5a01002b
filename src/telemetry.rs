//! # Telemetry snapshot
//!
//! What the display and serial collaborators show, in SI-ish units.

use serde::Serialize;

use crate::controller::Phase;
use crate::sensor::SensorMode;
use crate::statistics::Statistics;

#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct Telemetry {
    /// `None` until the sensors have been probed.
    pub mode: Option<SensorMode>,
    /// Filtered air temperature, °C.
    pub air: f32,
    /// Filtered probe temperature, °C. `None` without a probe sensor.
    pub probe: Option<f32>,
    pub target_probe: f32,
    pub target_air: f32,
    /// Commanded heater power in duty units.
    pub power: f32,
    /// Duty actually written, 0 while disabled or faulted.
    pub duty: u8,
    pub enabled: bool,
    /// Sensor fault code, 0 when healthy.
    pub fault: u8,
    pub outer: Phase,
    pub inner: Phase,
    /// Controlled temperature over the telemetry period.
    pub statistics: Option<Statistics>,
}
