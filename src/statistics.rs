//! # Temperature statistics over a telemetry period

use num_traits::Float;
use serde::Serialize;

use crate::fixed::{Fixed, SCALE};

/// Mean, peak-to-peak and standard deviation in °C.
#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct Statistics {
    pub mean: f32,
    pub ptp: f32,
    pub std: f32,
}

impl From<Buffer> for Option<Statistics> {
    /// `None` for an empty buffer.
    fn from(buff: Buffer) -> Self {
        if buff.counter == 0 {
            return None;
        }
        let n = buff.counter as f32;
        let scale = SCALE as f32;
        // Sums are offset by the first sample to keep the variance well conditioned.
        let mean = buff.m1 as f32 / n;
        let var = (buff.m2 as f32 / n - mean * mean).max(0.0);
        Some(Statistics {
            mean: (mean + buff.x0.to_bits() as f32) / scale,
            ptp: (buff.max - buff.min).to_f32(),
            std: var.sqrt() / scale,
        })
    }
}

/// Accumulator, exact in the [`Fixed`] domain.
#[derive(Copy, Clone, Debug)]
pub struct Buffer {
    min: Fixed,
    max: Fixed,
    x0: Fixed,
    m1: i64,
    m2: i64,
    counter: u32,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            min: Fixed::from_bits(i32::MAX),
            max: Fixed::from_bits(i32::MIN),
            x0: Fixed::ZERO,
            m1: 0,
            m2: 0,
            counter: 0,
        }
    }
}

impl Buffer {
    pub fn update(&mut self, x: Fixed) {
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        if self.counter == 0 {
            self.x0 = x;
        }
        self.counter += 1;
        let t = (x - self.x0).to_bits() as i64;
        self.m1 += t;
        self.m2 += t * t;
    }

    pub fn len(&self) -> u32 {
        self.counter
    }

    pub fn is_empty(&self) -> bool {
        self.counter == 0
    }
}
