//! # Heater actuator
//!
//! Turns the commanded power into an 8 bit duty and writes it to the heater
//! output. A disabled heater always gets 0, whatever was commanded.

use embedded_hal::PwmPin;

use crate::fixed::Fixed;

/// Something that drives the heater with a duty from 0 (off) to 255 (full).
pub trait HeaterOutput {
    fn set_duty(&mut self, duty: u8);
}

impl<T: HeaterOutput + ?Sized> HeaterOutput for &mut T {
    fn set_duty(&mut self, duty: u8) {
        (**self).set_duty(duty)
    }
}

/// Duty for a commanded `power`.
pub fn duty(power: Fixed, enabled: bool) -> u8 {
    if !enabled {
        return 0;
    }
    power.round_to_int().clamp(0, u8::MAX as i32) as u8
}

/// Heater output with the enable gate in front.
#[derive(Debug)]
pub struct Heater<H> {
    output: H,
    duty: u8,
}

impl<H: HeaterOutput> Heater<H> {
    /// Take over `output` and switch it off.
    pub fn new(mut output: H) -> Self {
        output.set_duty(0);
        Self { output, duty: 0 }
    }

    /// Apply `power` and return the duty written.
    pub fn apply(&mut self, power: Fixed, enabled: bool) -> u8 {
        self.duty = duty(power, enabled);
        self.output.set_duty(self.duty);
        self.duty
    }

    /// Switch off.
    pub fn off(&mut self) {
        self.apply(Fixed::ZERO, false);
    }

    /// The last duty written.
    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn output(&self) -> &H {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut H {
        &mut self.output
    }
}

/// Heater on a PWM channel, the duty is scaled to the channel's range.
#[derive(Debug)]
pub struct PwmHeater<P> {
    pin: P,
}

impl<P> PwmHeater<P>
where
    P: PwmPin<Duty = u16>,
{
    /// Enable `pin` at zero duty.
    pub fn new(mut pin: P) -> Self {
        pin.set_duty(0);
        pin.enable();
        Self { pin }
    }

    pub fn free(mut self) -> P {
        self.pin.disable();
        self.pin
    }
}

impl<P> HeaterOutput for PwmHeater<P>
where
    P: PwmPin<Duty = u16>,
{
    fn set_duty(&mut self, duty: u8) {
        let max = self.pin.get_max_duty() as u32;
        self.pin.set_duty((duty as u32 * max / u8::MAX as u32) as u16);
    }
}
