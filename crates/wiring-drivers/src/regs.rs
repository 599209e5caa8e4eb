//! Register-access contracts the generic drivers are written against
//!
//! Each physical peripheral instance implements the matching trait over its
//! memory-mapped register block; the engines stay free of chip-specific
//! addresses and get monomorphized per instance with no runtime dispatch.
//! All methods take `&self` — hardware registers are shared between the
//! foreground and interrupt contexts by nature, and implementations are
//! expected to be thin volatile accessors.

use wiring_hal::serial::{SerialParity, StopBits};
use wiring_hal::spi::{BitOrder, SpiMode};
use wiring_hal::wire::WireAddress;

/// UART-style peripheral registers.
pub trait UartRegisters: Sync {
    /// Peripheral input clock in Hz, the reference for divider derivation.
    fn input_clock(&self) -> u32;

    /// Hold the peripheral in reset. Configuration registers may only be
    /// written while held.
    fn hold_reset(&self);
    fn release_reset(&self);
    fn in_reset(&self) -> bool;

    /// Program the bit-rate generator: integer divider, fractional
    /// modulation stage, and whether 16x oversampling is in use.
    fn set_divider(&self, divider: u16, modulation: u8, oversample: bool);

    /// Program the frame format.
    fn set_frame(&self, seven_bit: bool, stop_bits: StopBits, parity: SerialParity);

    fn enable_rx_interrupt(&self);
    fn disable_rx_interrupt(&self);
    fn enable_tx_interrupt(&self);
    fn disable_tx_interrupt(&self);
    fn tx_interrupt_enabled(&self) -> bool;

    /// Load the transmit shift register.
    fn write_tx(&self, byte: u8);

    /// Read the receive register, clearing the RX-ready condition.
    fn read_rx(&self) -> u8;

    /// Shifter still clocking out the previous frame.
    fn is_busy(&self) -> bool;

    /// Assert a break condition on the line; the hardware clears it after
    /// one frame time.
    fn send_break(&self);

    fn enable_break_interrupt(&self);
    fn disable_break_interrupt(&self);

    /// Whether the receive line currently shows a break condition; consulted
    /// from the break/framing-error vector.
    fn break_detected(&self) -> bool;
}

/// Transfer direction as seen from this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireDirection {
    Transmit,
    Receive,
}

/// Control-category hardware event on the two-wire bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlEvent {
    /// START addressed to us (slave role selection follows the direction
    /// bit).
    Start,
    /// STOP observed on the bus.
    Stop,
    /// The remote side did not acknowledge.
    Nack,
    ArbitrationLost,
}

/// I2C peripheral registers.
pub trait WireRegisters: Sync {
    fn input_clock(&self) -> u32;
    fn hold_reset(&self);
    fn release_reset(&self);
    fn in_reset(&self) -> bool;

    /// Program the bus clock divider.
    fn set_divider(&self, divider: u16);

    /// Configure master mode addressing `target` in the given direction.
    fn config_master(&self, target: WireAddress, direction: WireDirection);

    /// Configure slave mode listening on `own`.
    fn config_slave(&self, own: WireAddress);

    /// Configure neither role (bus idle).
    fn config_idle(&self);

    /// Issue a START condition.
    fn request_start(&self);

    /// Whether the address phase is still in flight (START issued, no
    /// acknowledgment decision yet).
    fn start_pending(&self) -> bool;

    /// Arm a STOP condition.
    fn request_stop(&self);

    /// Whether an armed STOP has not yet completed on the bus.
    fn stop_pending(&self) -> bool;

    fn write_data(&self, byte: u8);
    fn read_data(&self) -> u8;

    /// Refuse the current byte/request (bus-level backpressure).
    fn send_nack(&self);

    /// Direction requested by the remote master; valid while servicing a
    /// [`ControlEvent::Start`].
    fn slave_direction(&self) -> WireDirection;

    /// Drain the next pending control-category event, if any.
    fn control_event(&self) -> Option<ControlEvent>;

    fn enable_events(&self);
    fn disable_events(&self);
}

/// SPI peripheral registers.
pub trait SpiRegisters: Sync {
    fn input_clock(&self) -> u32;
    fn hold_reset(&self);
    fn release_reset(&self);
    fn in_reset(&self) -> bool;

    /// Program the frame format: master role, bit order, clock
    /// polarity/phase.
    fn set_frame(&self, order: BitOrder, mode: SpiMode);

    fn set_divider(&self, divider: u16);

    /// Shifter busy with the current frame.
    fn is_busy(&self) -> bool;

    fn write_tx(&self, byte: u8);
    fn read_rx(&self) -> u8;
}

/// SAR ADC registers.
pub trait AdcRegisters: Sync {
    /// Highest channel the hardware provides.
    fn max_channel(&self) -> u8;

    fn set_reference(&self, reference: wiring_hal::adc::AdcReference);

    /// Select the input channel and sample timing, and power the converter
    /// up.
    fn configure(&self, channel: u8);

    /// Start a conversion.
    fn start(&self);

    fn busy(&self) -> bool;

    fn result(&self) -> u16;

    /// Power the converter back down between samples.
    fn power_down(&self);
}
