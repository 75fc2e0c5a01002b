//! Rolling average over the last [`N_AVG`] raw sensor samples.

use crate::fixed::{Fixed, FRAC_BITS};

/// Window length in samples.
pub const N_AVG: usize = 4;

/// Fractional bits of the raw sensor samples (DS18x20 scratchpad format).
pub const RAW_FRAC_BITS: u32 = 4;

/// FIFO low-pass filter for one sensor channel.
///
/// Only the previous `N_AVG - 1` samples are kept, the newest one is passed in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MovingAverage {
    history: [i16; N_AVG - 1],
}

impl MovingAverage {
    pub const fn new() -> Self {
        Self {
            history: [0; N_AVG - 1],
        }
    }

    /// Add `sample` (Q4) and return the window average in the shared [`Fixed`] scale.
    pub fn update(&mut self, sample: i16) -> Fixed {
        let sum: i32 = self.history.iter().map(|&h| h as i32).sum::<i32>() + sample as i32;

        self.history.copy_within(..N_AVG - 2, 1);
        self.history[0] = sample;

        Fixed::from_bits((sum / N_AVG as i32) << (FRAC_BITS - RAW_FRAC_BITS))
    }

    /// Previous samples, newest first.
    pub fn history(&self) -> &[i16; N_AVG - 1] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history = [0; N_AVG - 1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q4(deg: i16) -> i16 {
        deg << RAW_FRAC_BITS
    }

    #[test]
    fn averages_the_last_four_samples() {
        let mut f = MovingAverage::new();
        for s in [q4(100), q4(-40), q4(7), q4(20), q4(22), q4(24), q4(26)] {
            f.update(s);
        }
        // window is 22, 24, 26 and the newest 28
        assert_eq!(f.update(q4(28)), Fixed::from_int(25));
    }

    #[test]
    fn division_truncates_before_rescaling() {
        let mut f = MovingAverage::new();
        for s in [1, 1, 1] {
            f.update(s);
        }
        // (1 + 1 + 1 + 2) / 4 == 1 in Q4, i.e. 4 in Q6
        assert_eq!(f.update(2).to_bits(), 4);
        // (1 + 1 + 2 + -9) / 4 == -1 (toward zero)
        assert_eq!(f.update(-9).to_bits(), -4);
    }

    #[test]
    fn history_shifts_towards_higher_index() {
        let mut f = MovingAverage::new();
        f.update(1);
        f.update(2);
        f.update(3);
        assert_eq!(f.history(), &[3, 2, 1]);
        f.update(4);
        assert_eq!(f.history(), &[4, 3, 2]);
    }

    #[test]
    fn cold_history_drags_the_average() {
        let mut f = MovingAverage::new();
        assert_eq!(f.update(q4(32)), Fixed::from_int(8));
        f.clear();
        assert_eq!(f.history(), &[0; N_AVG - 1]);
    }
}
