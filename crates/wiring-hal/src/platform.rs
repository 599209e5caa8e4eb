//! Collaborator contracts the drivers consume from the surrounding system
//!
//! The drivers never touch pins, clocks, or the interrupt controller
//! directly; board bring-up supplies implementations of these traits.

/// Peripheral-function selection for a pin group, mirroring the port-select
/// matrix found on most parts (two select bits per pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinFunction {
    /// General-purpose I/O.
    Gpio,
    FunctionA,
    FunctionB,
    /// Both select bits set (some parts encode a third function this way).
    Both,
}

/// Pin-multiplexing collaborator: routes a peripheral's pin group between
/// general-purpose I/O and its peripheral function.
pub trait PinMux: Sync {
    fn select(&self, function: PinFunction);
}

/// SPI pin collaborator: function multiplexing for the three bus lines plus
/// manual control for transfers the shift register cannot express (the
/// bit-banged ninth bit).
///
/// `claim_*`/`drive_*`/`read_*` switch the named line to general-purpose
/// I/O as a side effect; `release_*` hands it back to the peripheral
/// function.
pub trait SpiPins: Sync {
    /// Route all three lines to the peripheral function.
    fn attach(&self);

    /// Return all three lines to general-purpose I/O.
    fn detach(&self);

    /// Take over SCLK as an output resting at the given level.
    fn claim_sclk(&self, idle_high: bool);
    fn toggle_sclk(&self);
    fn release_sclk(&self);

    /// Take over MOSI as an output at the given level; MISO becomes an
    /// input.
    fn drive_mosi(&self, high: bool);
    fn read_miso(&self) -> bool;

    /// Return MOSI and MISO to the peripheral function.
    fn release_data(&self);
}

/// Timing, sleep, and interrupt-state collaborator: the `millis()` /
/// `suspend()` / `interrupts()` surface of the surrounding system.
pub trait Platform: Sync {
    /// Monotonic millisecond counter. Wraps; callers compare with
    /// wrapping subtraction.
    fn millis(&self) -> u32;

    /// Enter low-power sleep until the next interrupt. Blocking driver
    /// calls use this between polls; it may return spuriously.
    fn idle(&self);

    /// Whether the global interrupt enable is set. A driver must not block
    /// on interrupt-driven progress while this is false.
    fn interrupts_enabled(&self) -> bool;

    fn disable_interrupts(&self);
    fn enable_interrupts(&self);

    /// Mask one external interrupt source at the interrupt controller.
    fn mask_irq(&self, source: u8);
    fn unmask_irq(&self, source: u8);
}
