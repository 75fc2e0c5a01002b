//! Run-time configuration.

use serde::{Deserialize, Serialize};

use crate::sensor::ChannelOrder;

/// Lowest accepted probe set-point, °C (exclusive).
pub const MIN_TARGET: f32 = 0.0;
/// Highest accepted probe set-point, °C (exclusive).
pub const MAX_TARGET: f32 = 50.0;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Probe set-point in °C used when none is stored.
    pub target: f32,

    /// Which discovered sensor is the air sensor.
    pub channel_order: ChannelOrder,

    /// Heater enable flag at boot. The heater stays off until enabled.
    pub heater_enabled: bool,

    /// Ticks between integral checkpoints. Bounds flash/EEPROM wear.
    pub checkpoint_period: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target: 32.0,
            channel_order: ChannelOrder::Discovery,
            heater_enabled: false,
            checkpoint_period: 600,
        }
    }
}

impl Settings {
    /// Parse JSON settings, missing fields keep their default.
    pub fn from_json(json: &str) -> Result<Self, serde_json_core::de::Error> {
        serde_json_core::from_str(json).map(|(settings, _)| settings)
    }
}

/// Whether `target` is an acceptable probe set-point.
pub fn is_valid_target(target: f32) -> bool {
    target > MIN_TARGET && target < MAX_TARGET
}
