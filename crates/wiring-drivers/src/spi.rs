//! Transaction-locked SPI master with 8/9/16-bit transfer
//!
//! The peripheral configuration is shared between every call site that can
//! reach the bus, including interrupt handlers. `begin_transaction` takes a
//! binary lock under disabled interrupts and swaps the configuration,
//! saving the previous one; `end_transaction` restores it under the same
//! protection so no handler ever observes a half-applied setup. Lock
//! contention fails synchronously — nothing queues.

use core::cell::RefCell;

use critical_section::Mutex;
use wiring_hal::platform::{Platform, SpiPins};
use wiring_hal::spi::{BitOrder, Spi, SpiCapabilities, SpiMode, SpiSettings, UsingInterrupt};

use crate::regs::SpiRegisters;

struct SpiState {
    settings: SpiSettings,
    saved: SpiSettings,
    in_transaction: bool,
    mask: UsingInterrupt,
}

/// SPI master over a [`SpiRegisters`] peripheral.
pub struct SpiMaster<R, P, B>
where
    R: SpiRegisters + 'static,
    P: Platform + 'static,
    B: SpiPins + 'static,
{
    regs: &'static R,
    platform: &'static P,
    pins: &'static B,
    state: Mutex<RefCell<SpiState>>,
}

impl<R, P, B> SpiMaster<R, P, B>
where
    R: SpiRegisters,
    P: Platform,
    B: SpiPins,
{
    pub const fn new(regs: &'static R, platform: &'static P, pins: &'static B) -> Self {
        Self {
            regs,
            platform,
            pins,
            state: Mutex::new(RefCell::new(SpiState {
                settings: SpiSettings::new(4_000_000, BitOrder::MsbFirst, SpiMode::Mode0),
                saved: SpiSettings::new(4_000_000, BitOrder::MsbFirst, SpiMode::Mode0),
                in_transaction: false,
                mask: UsingInterrupt::None,
            })),
        }
    }

    /// Like [`Spi::begin`] but with an explicit initial configuration.
    pub fn begin_with(&self, settings: SpiSettings) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).settings = settings;
        });
        self.begin();
    }

    /// Program `settings` and leave the peripheral running.
    fn apply(&self, settings: SpiSettings) {
        self.regs.hold_reset();
        self.regs.set_frame(settings.bit_order, settings.mode);
        self.regs
            .set_divider(divider_for_rate(self.regs.input_clock(), settings.clock));
        self.regs.release_reset();
    }

    /// Program `settings`, preserving whether the peripheral was running —
    /// reconfiguring a stopped bus must not start it.
    fn reconfigure(&self, settings: SpiSettings) {
        let was_running = !self.regs.in_reset();
        self.regs.hold_reset();
        self.regs.set_frame(settings.bit_order, settings.mode);
        self.regs
            .set_divider(divider_for_rate(self.regs.input_clock(), settings.clock));
        if was_running {
            self.regs.release_reset();
        }
    }

    fn settings(&self) -> SpiSettings {
        critical_section::with(|cs| self.state.borrow_ref(cs).settings)
    }

    /// One manually-clocked bit on the wire: the shift register only does
    /// eight.
    fn shift_ninth_bit(&self, word: u16, mode: SpiMode) -> u16 {
        let bit = word & 0x100 != 0;
        let mut got = 0;

        self.pins.claim_sclk(mode.polarity_high());
        if !mode.phase_trailing() {
            // Capture on the leading edge: data must be valid before the
            // clock moves.
            self.pins.drive_mosi(bit);
            self.pins.toggle_sclk();
            if self.pins.read_miso() {
                got = 0x100;
            }
            // Handing SCLK straight back to the peripheral restores the rest
            // level without a phantom pulse.
            self.pins.release_sclk();
        } else {
            self.pins.toggle_sclk();
            self.pins.drive_mosi(bit);
            self.pins.release_sclk();
            if self.pins.read_miso() {
                got = 0x100;
            }
        }
        self.pins.release_data();
        got
    }
}

impl<R, P, B> Spi for SpiMaster<R, P, B>
where
    R: SpiRegisters,
    P: Platform,
    B: SpiPins,
{
    fn begin(&self) {
        let settings = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.in_transaction = false;
            state.settings
        });
        self.apply(settings);
        self.pins.attach();
        log::debug!("spi: up at {} Hz", settings.clock);
    }

    fn end(&self) {
        self.regs.hold_reset();
        self.pins.detach();
    }

    fn transfer(&self, byte: u8) -> u8 {
        while self.regs.is_busy() {}
        self.regs.write_tx(byte);
        while self.regs.is_busy() {}
        self.regs.read_rx()
    }

    fn transfer16(&self, word: u16) -> u16 {
        // Wire order follows the bit order, but the caller always gets the
        // halves reassembled in natural numeric order.
        match self.settings().bit_order {
            BitOrder::MsbFirst => {
                let high = self.transfer((word >> 8) as u8) as u16;
                let low = self.transfer(word as u8) as u16;
                (high << 8) | low
            }
            BitOrder::LsbFirst => {
                let low = self.transfer(word as u8) as u16;
                let high = self.transfer((word >> 8) as u8) as u16;
                (high << 8) | low
            }
        }
    }

    fn transfer9(&self, word: u16) -> u16 {
        let settings = self.settings();
        match settings.bit_order {
            BitOrder::MsbFirst => {
                // The ninth (high) bit leads.
                let ninth = self.shift_ninth_bit(word, settings.mode);
                ninth | self.transfer(word as u8) as u16
            }
            BitOrder::LsbFirst => {
                let low = self.transfer(word as u8) as u16;
                low | self.shift_ninth_bit(word, settings.mode)
            }
        }
    }

    fn begin_transaction(&self, settings: SpiSettings) -> bool {
        // The lock check and take must be atomic against interrupt handlers
        // that also open transactions.
        self.platform.disable_interrupts();
        let (taken, mask) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.in_transaction {
                (false, state.mask)
            } else {
                state.in_transaction = true;
                state.saved = state.settings;
                state.settings = settings;
                (true, state.mask)
            }
        });
        if !taken {
            self.platform.enable_interrupts();
            return false;
        }

        match mask {
            UsingInterrupt::Irq(source) => {
                self.platform.mask_irq(source);
                self.platform.enable_interrupts();
            }
            UsingInterrupt::None => self.platform.enable_interrupts(),
            // Interrupts stay off until end_transaction.
            UsingInterrupt::All => {}
        }

        self.apply(settings);
        true
    }

    fn end_transaction(&self) {
        self.platform.disable_interrupts();
        let (restored, mask) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.in_transaction = false;
            state.settings = state.saved;
            (state.settings, state.mask)
        });
        if let UsingInterrupt::Irq(source) = mask {
            self.platform.unmask_irq(source);
        }
        // The saved configuration goes back in while interrupts are still
        // off: a handler using this bus must never observe a torn setup.
        self.apply(restored);
        self.platform.enable_interrupts();
    }

    fn set_clock_divider(&self, divider: u16) {
        let settings = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.settings.clock = self.regs.input_clock() / divider.max(1) as u32;
            state.settings
        });
        self.reconfigure(settings);
    }

    fn set_bit_order(&self, order: BitOrder) {
        let settings = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.settings.bit_order = order;
            state.settings
        });
        self.reconfigure(settings);
    }

    fn set_data_mode(&self, mode: SpiMode) {
        let settings = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.settings.mode = mode;
            state.settings
        });
        self.reconfigure(settings);
    }

    fn using_interrupt(&self, source: UsingInterrupt) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).mask = source;
        });
    }

    fn capabilities(&self) -> SpiCapabilities {
        SpiCapabilities {
            transaction: true,
            transfer16: true,
            transfer9: true,
        }
    }
}

/// Smallest divider that does not exceed the requested rate.
///
/// A partial division would leave the clock too fast, so round up; this also
/// pins the divider at 1 whenever the input clock is already at or below the
/// requested rate.
fn divider_for_rate(clock: u32, rate: u32) -> u16 {
    let rate = rate.max(1);
    let divider = clock.div_ceil(rate).max(1);
    divider.min(u16::MAX as u32) as u16
}

// The bus adapter is implemented on shared references: the driver itself
// lives in a static, so the `&mut` the `embedded-hal` trait requires has to
// come from a reborrowable handle.

impl<'a, R, P, B> embedded_hal::spi::ErrorType for &'a SpiMaster<R, P, B>
where
    R: SpiRegisters,
    P: Platform,
    B: SpiPins,
{
    type Error = core::convert::Infallible;
}

impl<'a, R, P, B> embedded_hal::spi::SpiBus<u8> for &'a SpiMaster<R, P, B>
where
    R: SpiRegisters,
    P: Platform,
    B: SpiPins,
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = Spi::transfer(*self, 0);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            Spi::transfer(*self, word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let n = read.len().max(write.len());
        for i in 0..n {
            let out = write.get(i).copied().unwrap_or(0);
            let inb = Spi::transfer(*self, out);
            if let Some(slot) = read.get_mut(i) {
                *slot = inb;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = Spi::transfer(*self, *word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        while self.regs.is_busy() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::divider_for_rate;

    #[test]
    fn exact_division() {
        assert_eq!(divider_for_rate(16_000_000, 4_000_000), 4);
    }

    #[test]
    fn partial_division_rounds_up() {
        // 16 MHz / 5 MHz = 3.2; /3 would overshoot the requested rate.
        assert_eq!(divider_for_rate(16_000_000, 5_000_000), 4);
    }

    #[test]
    fn slow_input_clock_pins_divider_at_one() {
        assert_eq!(divider_for_rate(1_000_000, 8_000_000), 1);
    }
}
