//! # Q-format fixed-point numbers
//!
//! Every temperature, gain and power value in the controller is a signed integer
//! scaled by `2^FRAC_BITS`. Products are rounded by adding half a unit of the
//! scale before the arithmetic right shift. The integral terms accumulate these
//! rounded products over hours, so the bias must stay exactly as is.

use core::fmt;
use core::ops::{Add, Neg, Sub};

use num_traits::float::Float;
use serde::{Deserialize, Serialize};

/// Number of fractional bits.
pub const FRAC_BITS: u32 = 6;
/// `1.0` in raw units.
pub const SCALE: i32 = 1 << FRAC_BITS;
/// Rounding bias added before every down-shift.
pub const ROUND: i32 = 1 << (FRAC_BITS - 1);

/// A fixed-point value with [`FRAC_BITS`] fractional bits.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Self = Self(0);

    /// Wrap a raw, already scaled value.
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// The raw scaled value.
    pub const fn to_bits(self) -> i32 {
        self.0
    }

    /// Whole units, e.g. `Fixed::from_int(4)` is `4.0`.
    pub const fn from_int(value: i32) -> Self {
        Self(value << FRAC_BITS)
    }

    /// Convert thousandths, rounding half away from zero.
    ///
    /// This is `round(v * 64)` for `v = milli / 1000` and is usable in constants.
    pub const fn from_milli(milli: i32) -> Self {
        let scaled = milli * SCALE;
        if scaled >= 0 {
            Self((scaled + 500) / 1000)
        } else {
            Self((scaled - 500) / 1000)
        }
    }

    /// Convert a real value, `round(v * 64)`.
    pub fn from_f32(value: f32) -> Self {
        Self((value * SCALE as f32).round() as i32)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / SCALE as f32
    }

    /// Fixed-point product, `(a * b + ROUND) >> FRAC_BITS`.
    pub const fn mul(self, rhs: Self) -> Self {
        Self(Self::round_shift(self.0 * rhs.0))
    }

    /// Round a value carrying `2 * FRAC_BITS` fractional bits down to [`FRAC_BITS`].
    pub const fn round_shift(wide: i32) -> i32 {
        (wide + ROUND) >> FRAC_BITS
    }

    /// Round to the nearest whole unit using the shared bias.
    pub const fn round_to_int(self) -> i32 {
        Self::round_shift(self.0)
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self(limit(self.0, min.0, max.0))
    }

    /// Midpoint of `[self, other]`, truncating.
    pub const fn midpoint(self, other: Self) -> Self {
        Self((self.0 + other.0) / 2)
    }
}

/// Limit `value` to `[min, max]`.
///
/// Unlike [`Ord::clamp`] this never panics on an inverted range; `min` wins.
pub fn limit(value: i32, min: i32, max: i32) -> i32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

impl Add for Fixed {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Fixed {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Fixed {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Fixed {
    /// Two decimals, e.g. `35.00`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int = abs >> FRAC_BITS;
        let frac = ((abs & (SCALE as u32 - 1)) * 100 + ROUND as u32) >> FRAC_BITS;
        write!(f, "{sign}{int}.{frac:02}")
    }
}
