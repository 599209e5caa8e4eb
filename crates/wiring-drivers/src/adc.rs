//! Single-shot ADC sampling engine

use wiring_hal::adc::{Adc, AdcReference};
use wiring_hal::platform::Platform;

use crate::regs::AdcRegisters;

/// Successive-approximation ADC over an [`AdcRegisters`] peripheral.
///
/// Conversions are one-shot: configure, start, sleep until the busy flag
/// clears, power back down.
pub struct SarAdc<R, P>
where
    R: AdcRegisters + 'static,
    P: Platform + 'static,
{
    regs: &'static R,
    platform: &'static P,
}

impl<R, P> SarAdc<R, P>
where
    R: AdcRegisters,
    P: Platform,
{
    pub const fn new(regs: &'static R, platform: &'static P) -> Self {
        Self { regs, platform }
    }
}

impl<R, P> Adc for SarAdc<R, P>
where
    R: AdcRegisters,
    P: Platform,
{
    fn set_reference(&self, reference: AdcReference) {
        self.regs.set_reference(reference);
    }

    fn sample(&self, channel: u8) -> u16 {
        if channel > self.regs.max_channel() {
            return 0;
        }
        self.regs.configure(channel);
        self.regs.start();
        while self.regs.busy() {
            self.platform.idle();
        }
        let value = self.regs.result();
        self.regs.power_down();
        value
    }
}
