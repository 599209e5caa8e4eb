//! Interrupt-driven peripheral engines behind the wiring contracts
//!
//! Each driver is generic over a register-access trait from [`regs`], so one
//! engine serves every chip that can express the trait over its own register
//! block. The drivers keep all foreground/ISR shared state behind
//! `critical_section::Mutex<RefCell<_>>`; blocking calls poll under short
//! critical sections and sleep through [`wiring_hal::platform::Platform::idle`]
//! between polls.
//!
//! Module overview:
//! - [`ring`]    – fixed-capacity circular byte buffer (one-slot-reserved).
//! - [`uart`]    – ISR-fed ring-buffered serial engine.
//! - [`wire`]    – I2C master/slave transaction state machine.
//! - [`spi`]     – transaction-locked SPI master with 8/9/16-bit transfer.
//! - [`adc`]     – single-shot sampling engine.
//! - [`vectors`] – interrupt-vector dispatch tables.
//! - [`regs`]    – the register-access contracts the engines are written
//!   against.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod adc;
pub mod regs;
pub mod ring;
pub mod spi;
pub mod uart;
pub mod vectors;
pub mod wire;

pub mod mock;

pub use adc::SarAdc;
pub use spi::SpiMaster;
pub use uart::SerialUart;
pub use wire::TwoWire;
