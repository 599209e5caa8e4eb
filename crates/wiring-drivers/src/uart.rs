//! ISR-fed ring-buffered serial engine
//!
//! Foreground calls queue into / drain from the rings; the hardware vectors
//! (routed through [`crate::vectors`]) move bytes between the rings and the
//! shift registers. RX overruns drop the incoming byte silently — there is
//! no backpressure to the wire.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use wiring_hal::platform::{PinFunction, PinMux, Platform};
use wiring_hal::serial::{
    BreakCallback, Serial, SerialCapabilities, SerialIsr, SerialParity, StopBits,
};

use crate::regs::UartRegisters;
use crate::ring::RingBuffer;

#[derive(Clone, Copy)]
struct FrameConfig {
    seven_bit: bool,
    stop_bits: StopBits,
    parity: SerialParity,
}

impl FrameConfig {
    const fn eight_n1() -> Self {
        Self {
            seven_bit: false,
            stop_bits: StopBits::One,
            parity: SerialParity::None,
        }
    }
}

struct UartState<const TX: usize, const RX: usize> {
    tx: RingBuffer<TX>,
    rx: RingBuffer<RX>,
    frame: FrameConfig,
    break_handler: Option<BreakCallback>,
}

/// Ring-buffered serial driver over a [`UartRegisters`] peripheral.
///
/// `TX`/`RX` size the rings (usable capacity is one less than the constant,
/// see [`RingBuffer`]). Register block, platform, and pin group are bound by
/// `&'static` reference so instances can live in statics and be reached from
/// the vector tables.
pub struct SerialUart<R, P, M, const TX: usize, const RX: usize>
where
    R: UartRegisters + 'static,
    P: Platform + 'static,
    M: PinMux + 'static,
{
    regs: &'static R,
    platform: &'static P,
    pins: &'static M,
    function: PinFunction,
    state: Mutex<RefCell<UartState<TX, RX>>>,
}

impl<R, P, M, const TX: usize, const RX: usize> SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    /// `function` selects which peripheral function the pin group is routed
    /// to while the port is running.
    pub const fn new(
        regs: &'static R,
        platform: &'static P,
        pins: &'static M,
        function: PinFunction,
    ) -> Self {
        Self {
            regs,
            platform,
            pins,
            function,
            state: Mutex::new(RefCell::new(UartState {
                tx: RingBuffer::new(),
                rx: RingBuffer::new(),
                frame: FrameConfig::eight_n1(),
                break_handler: None,
            })),
        }
    }

    fn reset_buffers(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.tx.clear();
            state.rx.clear();
        });
    }

    /// Rewrite the frame registers with `mutate` applied, holding the
    /// peripheral in reset for the duration and restoring the previous run
    /// state.
    fn reconfigure_frame(&self, mutate: impl FnOnce(&mut FrameConfig)) {
        let was_running = !self.regs.in_reset();
        self.regs.hold_reset();
        let frame = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            mutate(&mut state.frame);
            state.frame
        });
        self.regs.set_frame(frame.seven_bit, frame.stop_bits, frame.parity);
        if was_running {
            self.regs.release_reset();
        }
    }
}

impl<R, P, M, const TX: usize, const RX: usize> Serial for SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    fn begin(&self, bitrate: u32) {
        self.reset_buffers();

        self.regs.hold_reset();
        let frame = critical_section::with(|cs| self.state.borrow_ref(cs).frame);
        self.regs.set_frame(frame.seven_bit, frame.stop_bits, frame.parity);
        let (divider, modulation, oversample) = divider_for(self.regs.input_clock(), bitrate);
        self.regs.set_divider(divider, modulation, oversample);
        self.regs.release_reset();

        self.pins.select(self.function);
        // TX interrupt stays off until write() queues something.
        self.regs.disable_tx_interrupt();
        self.regs.enable_rx_interrupt();
        log::debug!("serial: begin at {} baud", bitrate);
    }

    fn end(&self) {
        self.regs.disable_tx_interrupt();
        self.regs.disable_rx_interrupt();
        self.pins.select(PinFunction::Gpio);
        self.regs.hold_reset();
        self.reset_buffers();
    }

    fn available(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).rx.len())
    }

    fn peek(&self) -> Option<u8> {
        critical_section::with(|cs| self.state.borrow_ref(cs).rx.peek())
    }

    fn read(&self) -> Option<u8> {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).rx.pop())
    }

    fn flush(&self) {
        loop {
            let drained = critical_section::with(|cs| self.state.borrow_ref(cs).tx.is_empty());
            if drained {
                return;
            }
            self.platform.idle();
        }
    }

    fn write(&self, byte: u8) -> usize {
        loop {
            let queued = critical_section::with(|cs| {
                self.state.borrow_ref_mut(cs).tx.push(byte)
            });
            if queued {
                self.regs.enable_tx_interrupt();
                return 1;
            }
            // Full. Blocking is only sane while an ISR can still drain the
            // ring: not with the peripheral suspended, and not with global
            // interrupts off (the classic print-inside-an-ISR pitfall).
            if self.regs.in_reset() || !self.platform.interrupts_enabled() {
                return 0;
            }
            self.platform.idle();
        }
    }

    fn is_active(&self) -> bool {
        !self.regs.in_reset()
    }

    fn capabilities(&self) -> SerialCapabilities {
        SerialCapabilities {
            seven_bit: true,
            stop_bits: true,
            parity: true,
            send_break: true,
            break_interrupt: true,
        }
    }

    fn set_7bit(&self, enabled: bool) {
        self.reconfigure_frame(|frame| frame.seven_bit = enabled);
    }

    fn set_stop_bits(&self, bits: StopBits) {
        self.reconfigure_frame(|frame| frame.stop_bits = bits);
    }

    fn set_parity(&self, parity: SerialParity) {
        self.reconfigure_frame(|frame| frame.parity = parity);
    }

    fn send_break(&self) {
        if self.regs.in_reset() {
            return;
        }
        // Keep the TX vector from slipping a queued byte in front of the
        // break, then wait out the frame in flight.
        let txie = self.regs.tx_interrupt_enabled();
        self.regs.disable_tx_interrupt();
        while self.regs.is_busy() {}
        self.regs.send_break();
        if txie {
            self.regs.enable_tx_interrupt();
        }
    }

    fn attach_break_interrupt(&self, callback: BreakCallback) {
        let was_running = !self.regs.in_reset();
        self.regs.hold_reset();
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).break_handler = Some(callback);
        });
        self.regs.enable_break_interrupt();
        if was_running {
            self.regs.release_reset();
        }
    }

    fn detach_break_interrupt(&self) {
        let was_running = !self.regs.in_reset();
        self.regs.hold_reset();
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).break_handler = None;
        });
        self.regs.disable_break_interrupt();
        if was_running {
            self.regs.release_reset();
        }
    }
}

impl<R, P, M, const TX: usize, const RX: usize> SerialIsr for SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    fn isr_send_char(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match state.tx.pop() {
                Some(byte) => self.regs.write_tx(byte),
                // Ring drained: quiet the vector until write() re-arms it.
                None => self.regs.disable_tx_interrupt(),
            }
        });
    }

    fn isr_get_char(&self) {
        let byte = self.regs.read_rx();
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            // Full ring drops the byte; overruns are lossy by design.
            let _ = state.rx.push(byte);
        });
    }

    fn isr_break(&self) {
        if !self.regs.break_detected() {
            return;
        }
        let handler = critical_section::with(|cs| self.state.borrow_ref(cs).break_handler);
        if let Some(callback) = handler {
            callback();
        }
    }
}

/// Derive the bit-rate generator configuration closest to `bitrate`.
///
/// Returns (integer divider, fractional modulation, oversampling). 16x
/// oversampling is used whenever the input clock is at least 48x the bit
/// rate; below that the divider runs straight off the input clock with a
/// 3-bit second-stage modulation. Unachievable rates silently resolve to
/// the nearest divider.
fn divider_for(clock: u32, bitrate: u32) -> (u16, u8, bool) {
    let bitrate = bitrate.max(1);
    let oversample = clock / bitrate >= 48;
    // Bit period in 1/16ths of an input-clock cycle.
    let scaled = ((clock as u64) << 4) / bitrate as u64;
    if oversample {
        let divider = (scaled >> 8).min(u16::MAX as u64) as u16;
        let modulation = ((scaled >> 4) & 0x0F) as u8;
        (divider, modulation, true)
    } else {
        let divider = (scaled >> 4).min(u16::MAX as u64) as u16;
        let modulation = ((((scaled & 0x0F) + 1) >> 1) & 0x07) as u8;
        (divider, modulation, false)
    }
}

/// Error returned by the `embedded_io` adapters when the port cannot make
/// progress (held in reset, or global interrupts disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldHang;

impl fmt::Display for WouldHang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serial port cannot make progress")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WouldHang {}

impl embedded_io::Error for WouldHang {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

// The stream adapters are implemented on shared references: the driver
// itself lives in a static (the vector tables need it there), so the `&mut`
// the `embedded-io` traits require has to come from a reborrowable handle.

impl<'a, R, P, M, const TX: usize, const RX: usize> embedded_io::ErrorType
    for &'a SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    type Error = WouldHang;
}

impl<'a, R, P, M, const TX: usize, const RX: usize> embedded_io::Read
    for &'a SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let mut n = 0;
            while n < buf.len() {
                match Serial::read(*self) {
                    Some(byte) => {
                        buf[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            if n > 0 {
                return Ok(n);
            }
            if self.regs.in_reset() || !self.platform.interrupts_enabled() {
                return Err(WouldHang);
            }
            self.platform.idle();
        }
    }
}

impl<'a, R, P, M, const TX: usize, const RX: usize> embedded_io::ReadReady
    for &'a SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(Serial::available(*self) > 0)
    }
}

impl<'a, R, P, M, const TX: usize, const RX: usize> embedded_io::Write
    for &'a SerialUart<R, P, M, TX, RX>
where
    R: UartRegisters,
    P: Platform,
    M: PinMux,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        match Serial::write(*self, buf[0]) {
            0 => Err(WouldHang),
            _ => Ok(1 + Serial::write_all(*self, &buf[1..])),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Serial::flush(*self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::divider_for;

    #[test]
    fn oversampled_divider_16mhz_9600() {
        let (divider, _modulation, oversample) = divider_for(16_000_000, 9600);
        assert!(oversample);
        // 16 MHz / (16 * 9600) = 104.17
        assert_eq!(divider, 104);
    }

    #[test]
    fn low_clock_skips_oversampling() {
        let (divider, _modulation, oversample) = divider_for(32_768, 1200);
        assert!(!oversample);
        // 32768 / 1200 = 27.3
        assert_eq!(divider, 27);
    }

    #[test]
    fn oversampling_threshold_is_48x() {
        let (_, _, oversample) = divider_for(48_000, 1000);
        assert!(oversample);
        let (_, _, oversample) = divider_for(47_000, 1000);
        assert!(!oversample);
    }

    #[test]
    fn unachievable_rate_resolves_silently() {
        // Faster than the input clock: resolves to the smallest divider
        // rather than reporting an error.
        let (divider, _, oversample) = divider_for(1_000_000, 2_000_000);
        assert!(!oversample);
        assert_eq!(divider, 0);
    }
}
