//! SPI master abstraction

/// SPI mode (clock polarity and phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Clock rest level.
    pub fn polarity_high(self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    /// Whether data is captured on the trailing clock edge.
    pub fn phase_trailing(self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode3)
    }
}

/// Wire bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// One bus configuration, copied by value into the driver's active slot and
/// into the saved slot when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiSettings {
    /// Clock rate in Hz.
    pub clock: u32,
    pub bit_order: BitOrder,
    pub mode: SpiMode,
}

impl SpiSettings {
    pub const fn new(clock: u32, bit_order: BitOrder, mode: SpiMode) -> Self {
        Self {
            clock,
            bit_order,
            mode,
        }
    }
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self::new(4_000_000, BitOrder::MsbFirst, SpiMode::Mode0)
    }
}

/// Interrupt-masking policy for transactions, configured via
/// [`Spi::using_interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsingInterrupt {
    /// No interrupt source touches this bus; nothing is masked.
    #[default]
    None,
    /// Mask one specific external interrupt source for the duration of each
    /// transaction.
    Irq(u8),
    /// Keep global interrupts disabled for the duration of each transaction.
    All,
}

/// Which of the optional SPI operations a driver actually implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiCapabilities {
    pub transaction: bool,
    pub transfer16: bool,
    pub transfer9: bool,
}

/// Application-facing contract for a shared SPI master.
pub trait Spi {
    /// Apply the current settings and enable the peripheral.
    fn begin(&self);

    /// Disable the peripheral and return its pins to general-purpose I/O.
    fn end(&self);

    /// Full-duplex shift of one byte.
    fn transfer(&self, byte: u8) -> u8;

    /// Full-duplex shift of two bytes. The return value is reassembled in
    /// natural numeric order regardless of the wire bit order.
    fn transfer16(&self, word: u16) -> u16 {
        let _ = word;
        0
    }

    /// Full-duplex shift of nine bits on hardware whose shift register only
    /// does eight; the ninth bit is clocked manually.
    fn transfer9(&self, word: u16) -> u16 {
        let _ = word;
        0
    }

    /// Take the transaction lock and apply `settings`, saving the previous
    /// configuration.
    ///
    /// Non-blocking: returns `false` without touching the configuration when
    /// a transaction is already open. The caller must not assume bus access
    /// on failure.
    fn begin_transaction(&self, settings: SpiSettings) -> bool;

    /// Release the transaction lock and restore the saved configuration.
    fn end_transaction(&self);

    /// Derive the clock rate from the peripheral input clock and `divider`.
    fn set_clock_divider(&self, divider: u16);
    fn set_bit_order(&self, order: BitOrder);
    fn set_data_mode(&self, mode: SpiMode);

    /// Declare the interrupt source that also uses this bus, so transactions
    /// can mask it.
    fn using_interrupt(&self, source: UsingInterrupt);

    /// Which of the optional operations above are functional.
    fn capabilities(&self) -> SpiCapabilities {
        SpiCapabilities::default()
    }
}
