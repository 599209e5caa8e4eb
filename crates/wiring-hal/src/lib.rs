//! Vendor-agnostic peripheral contracts for the wiring driver core
//!
//! This crate defines the application-facing traits (`Serial`, `Wire`, `Spi`,
//! `Adc`), the narrow interrupt-facing traits (`SerialIsr`, `WireIsr`) the
//! vector trampolines call through, and the collaborator contracts the
//! drivers consume from the surrounding system (`Platform`, `PinMux`,
//! `SpiPins`). Concrete drivers live in `wiring-drivers`; this crate carries
//! no hardware knowledge at all.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod adc;
pub mod platform;
pub mod serial;
pub mod spi;
pub mod wire;

// Re-export commonly used types
pub use serial::{Serial, SerialIsr};
pub use spi::{Spi, SpiSettings};
pub use wire::{Wire, WireAddress, WireError, WireIsr};
