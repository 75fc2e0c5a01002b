use embedded_hal::blocking::delay::DelayUs;

/// Busy-wait delay for one-wire slot timing.
pub struct AsmDelay {
    cyc_per_us_corrected: u32,
}

impl AsmDelay {
    pub fn new(freq: u32) -> AsmDelay {
        AsmDelay {
            // Corrected value for cortex_m::asm::delay cycles per us.
            // See https://github.com/rust-embedded/cortex-m/issues/430
            cyc_per_us_corrected: (freq / 1_000_000) * 2,
        }
    }
}

impl DelayUs<u16> for AsmDelay {
    fn delay_us(&mut self, us: u16) {
        cortex_m::asm::delay(self.cyc_per_us_corrected * us as u32)
    }
}
