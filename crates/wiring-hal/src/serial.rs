//! Serial (UART-style) byte-stream abstraction

/// Parity configuration for serial frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialParity {
    None,
    Odd,
    Even,
}

/// Stop-bit count for serial frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

/// Callback invoked from interrupt context when a break/framing condition is
/// detected on the receive line. Must not block.
pub type BreakCallback = fn();

/// Which of the optional serial operations a driver actually implements.
///
/// Callers feature-detect through [`Serial::capabilities`] instead of
/// assuming; a driver reporting `false` for a capability accepts the
/// corresponding call as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialCapabilities {
    pub seven_bit: bool,
    pub stop_bits: bool,
    pub parity: bool,
    pub send_break: bool,
    pub break_interrupt: bool,
}

/// Application-facing byte-stream contract for UART-like transports.
///
/// Methods take `&self`: a serial port is a shared resource fed and drained
/// concurrently by interrupt handlers, and implementations keep their mutable
/// state behind interior mutability.
pub trait Serial {
    /// Reset buffers and bring the peripheral up at the requested bit rate.
    ///
    /// An unachievable rate resolves to the closest achievable divider with
    /// no notification.
    fn begin(&self, bitrate: u32);

    /// Disable the peripheral and its interrupts, discarding buffered data.
    /// Idempotent.
    fn end(&self);

    /// Number of buffered received bytes not yet consumed.
    fn available(&self) -> usize;

    /// Oldest buffered received byte without consuming it.
    fn peek(&self) -> Option<u8>;

    /// Pop the oldest buffered received byte.
    fn read(&self) -> Option<u8>;

    /// Block until the transmit buffer has fully drained to the hardware.
    fn flush(&self);

    /// Queue one byte for transmission, returning the number of bytes
    /// accepted (0 or 1).
    ///
    /// A full buffer is flow control, not an error: the call blocks until a
    /// slot frees, except when no interrupt could ever drain the buffer
    /// (peripheral held in reset, or global interrupts disabled), in which
    /// case it returns 0 immediately.
    fn write(&self, byte: u8) -> usize;

    /// Queue a whole buffer, stopping at the first byte the driver refuses.
    fn write_all(&self, buf: &[u8]) -> usize {
        let mut n = 0;
        for &byte in buf {
            if self.write(byte) == 0 {
                return n;
            }
            n += 1;
        }
        n
    }

    /// Whether the peripheral is out of reset and running.
    fn is_active(&self) -> bool;

    /// Which of the optional operations below are functional.
    fn capabilities(&self) -> SerialCapabilities {
        SerialCapabilities::default()
    }

    fn set_7bit(&self, _enabled: bool) {}
    fn set_stop_bits(&self, _bits: StopBits) {}
    fn set_parity(&self, _parity: SerialParity) {}

    /// Transmit a break condition once the line is idle.
    fn send_break(&self) {}

    fn attach_break_interrupt(&self, _callback: BreakCallback) {}
    fn detach_break_interrupt(&self) {}
}

/// Narrow interrupt-side contract for serial drivers.
///
/// The surrounding system routes the hardware TX-ready / RX-ready / break
/// vectors to these entry points (see the vector tables in
/// `wiring-drivers`). They are invoked with interrupts otherwise disabled
/// and must run to completion without blocking.
pub trait SerialIsr: Sync {
    /// TX-ready vector: feed the next buffered byte to the transmit
    /// register, or disable the TX interrupt when the buffer is empty.
    fn isr_send_char(&self);

    /// RX-ready vector: move the received byte into the buffer, silently
    /// dropping it when the buffer is full.
    fn isr_get_char(&self);

    /// Break/framing-error vector.
    fn isr_break(&self) {}
}
