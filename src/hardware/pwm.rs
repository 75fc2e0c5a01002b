//! Heater PWM on TIM3 channel 2.

use super::hal::{
    gpio::{gpioc::PC7, Alternate},
    prelude::*,
    pwm::{ActiveHigh, ComplementaryImpossible, Pwm, C2},
    rcc::{rec, CoreClocks},
    stm32::TIM3,
    time::KiloHertz,
};
use crate::heater::PwmHeater;

/// Heater switching frequency. The load is slow, this only avoids audible noise.
const F_PWM: KiloHertz = KiloHertz::kHz(1);

pub type HeaterPwm = Pwm<TIM3, C2, ComplementaryImpossible, ActiveHigh, ActiveHigh>;

pub fn heater(
    clocks: &CoreClocks,
    tim_rec: rec::Tim3,
    tim: TIM3,
    pin: PC7<Alternate<2>>,
) -> PwmHeater<HeaterPwm> {
    PwmHeater::new(tim.pwm(pin, F_PWM.convert(), tim_rec, clocks))
}
