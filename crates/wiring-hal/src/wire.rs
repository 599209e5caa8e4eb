//! I2C (two-wire) bus abstraction

use core::fmt;

/// Bus address, 7- or 10-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireAddress {
    SevenBit(u8),
    TenBit(u16),
}

impl WireAddress {
    /// The raw address value, right-aligned.
    pub fn raw(self) -> u16 {
        match self {
            Self::SevenBit(addr) => addr as u16,
            Self::TenBit(addr) => addr,
        }
    }

    pub fn is_ten_bit(self) -> bool {
        matches!(self, Self::TenBit(_))
    }
}

/// Classified failure of a master transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    /// The address phase was not acknowledged (or timed out).
    AddrNack,
    /// A data byte was not acknowledged.
    DataNack,
    /// Arbitration was lost to another master.
    BusBusy,
    /// The message does not fit the staging buffer. Only surfaced by the
    /// slice-based adapters; the byte-oriented `write` reports a full buffer
    /// by returning 0 instead.
    Overflow,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddrNack => write!(f, "address not acknowledged"),
            Self::DataNack => write!(f, "data not acknowledged"),
            Self::BusBusy => write!(f, "bus busy or arbitration lost"),
            Self::Overflow => write!(f, "message exceeds buffer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WireError {}

impl embedded_hal::i2c::Error for WireError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self {
            Self::AddrNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Self::BusBusy => ErrorKind::ArbitrationLoss,
            Self::Overflow => ErrorKind::Other,
        }
    }
}

/// Callback invoked from interrupt context when a slave-receive transaction
/// completes, with the number of bytes collected.
pub type ReceiveCallback = fn(usize);

/// Callback invoked from interrupt context when a remote master requests
/// data; the application queues its reply with [`Wire::write`] from inside
/// the callback.
pub type RequestCallback = fn();

/// Application-facing contract for a shared two-wire bus.
pub trait Wire {
    /// Join the bus as a master only.
    fn begin(&self);

    /// Join the bus listening on `own_address` as a slave. Master
    /// operations remain available and restore slave mode on completion.
    fn begin_slave(&self, own_address: WireAddress);

    /// Leave the bus and discard buffered data. Idempotent.
    fn end(&self);

    /// Reconfigure the bus clock rate.
    fn set_clock(&self, hz: u32);

    /// Start composing a master write to `target`. Clears any error left by
    /// the previous transaction.
    fn begin_transmission(&self, target: WireAddress);

    /// Send the composed message: START, address, queued bytes, STOP.
    ///
    /// Blocks until the bus transaction completes or fails; the address
    /// phase is bounded by a fixed deadline. The peripheral is restored to
    /// its prior (possibly slave) configuration before returning, success or
    /// not.
    fn end_transmission(&self) -> Result<(), WireError>;

    /// Master read of `len` bytes from `target`, returning the number of
    /// bytes actually received (0 on any error; see [`Wire::last_error`]).
    fn request_from(&self, target: WireAddress, len: usize) -> usize;

    /// Queue one outgoing byte (master message being composed, or slave
    /// reply inside the request callback). Returns 0 when the staging
    /// buffer is full.
    fn write(&self, byte: u8) -> usize;

    /// Queue a whole buffer, stopping at the first byte that does not fit.
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

    /// Number of received bytes not yet consumed.
    fn available(&self) -> usize;

    /// Pop the oldest received byte.
    fn read(&self) -> Option<u8>;

    /// Oldest received byte without consuming it.
    fn peek(&self) -> Option<u8>;

    /// Discard staged outgoing and unread incoming data.
    fn flush(&self);

    /// Error classified for the most recent master transaction, if any.
    fn last_error(&self) -> Option<WireError>;

    fn on_receive(&self, callback: ReceiveCallback);
    fn on_request(&self, callback: RequestCallback);
}

/// Narrow interrupt-side contract for two-wire drivers.
///
/// The hardware exposes two interrupt categories; the surrounding system
/// routes each to the matching entry point. The return value reports
/// whether the CPU should be woken from low-power sleep (a blocked
/// foreground call may be waiting on the state change).
pub trait WireIsr: Sync {
    /// Data-ready vector (TX-buffer-empty / RX-buffer-full).
    fn isr_data(&self) -> bool;

    /// Control vector (START / STOP / NACK / arbitration loss).
    fn isr_control(&self) -> bool;
}
