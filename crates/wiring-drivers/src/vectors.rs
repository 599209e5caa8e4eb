//! Interrupt-vector dispatch tables
//!
//! Hardware vectors cannot carry an instance pointer, so board bring-up
//! registers each driver into a fixed slot once and routes the raw vector to
//! the matching dispatch function. Slots are written only at registration
//! and teardown; the dispatch path does nothing but read the table and call
//! through the narrow ISR trait.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use wiring_hal::serial::SerialIsr;
use wiring_hal::wire::WireIsr;

/// Hardware instances a single chip can route per peripheral class.
pub const MAX_INSTANCES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VectorError {
    SlotOutOfRange,
    SlotInUse,
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotOutOfRange => write!(f, "vector slot out of range"),
            Self::SlotInUse => write!(f, "vector slot already registered"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VectorError {}

static SERIAL_SLOTS: Mutex<RefCell<[Option<&'static dyn SerialIsr>; MAX_INSTANCES]>> =
    Mutex::new(RefCell::new([None; MAX_INSTANCES]));

static WIRE_SLOTS: Mutex<RefCell<[Option<&'static dyn WireIsr>; MAX_INSTANCES]>> =
    Mutex::new(RefCell::new([None; MAX_INSTANCES]));

/// Bind `driver` to serial slot `slot`.
pub fn register_serial(slot: usize, driver: &'static dyn SerialIsr) -> Result<(), VectorError> {
    critical_section::with(|cs| {
        let mut slots = SERIAL_SLOTS.borrow_ref_mut(cs);
        let entry = slots.get_mut(slot).ok_or(VectorError::SlotOutOfRange)?;
        if entry.is_some() {
            return Err(VectorError::SlotInUse);
        }
        *entry = Some(driver);
        Ok(())
    })
}

/// Free serial slot `slot` at driver teardown.
pub fn unregister_serial(slot: usize) {
    critical_section::with(|cs| {
        if let Some(entry) = SERIAL_SLOTS.borrow_ref_mut(cs).get_mut(slot) {
            *entry = None;
        }
    });
}

/// Bind `driver` to wire slot `slot`.
pub fn register_wire(slot: usize, driver: &'static dyn WireIsr) -> Result<(), VectorError> {
    critical_section::with(|cs| {
        let mut slots = WIRE_SLOTS.borrow_ref_mut(cs);
        let entry = slots.get_mut(slot).ok_or(VectorError::SlotOutOfRange)?;
        if entry.is_some() {
            return Err(VectorError::SlotInUse);
        }
        *entry = Some(driver);
        Ok(())
    })
}

/// Free wire slot `slot` at driver teardown.
pub fn unregister_wire(slot: usize) {
    critical_section::with(|cs| {
        if let Some(entry) = WIRE_SLOTS.borrow_ref_mut(cs).get_mut(slot) {
            *entry = None;
        }
    });
}

fn serial_slot(slot: usize) -> Option<&'static dyn SerialIsr> {
    critical_section::with(|cs| {
        SERIAL_SLOTS
            .borrow_ref(cs)
            .get(slot)
            .copied()
            .flatten()
    })
}

fn wire_slot(slot: usize) -> Option<&'static dyn WireIsr> {
    critical_section::with(|cs| WIRE_SLOTS.borrow_ref(cs).get(slot).copied().flatten())
}

/// UART TX-ready vector entry for `slot`.
pub fn serial_tx_event(slot: usize) {
    if let Some(driver) = serial_slot(slot) {
        driver.isr_send_char();
    }
}

/// UART RX-ready vector entry for `slot`.
pub fn serial_rx_event(slot: usize) {
    if let Some(driver) = serial_slot(slot) {
        driver.isr_get_char();
    }
}

/// UART break/framing-error vector entry for `slot`.
pub fn serial_break_event(slot: usize) {
    if let Some(driver) = serial_slot(slot) {
        driver.isr_break();
    }
}

/// I2C data-ready vector entry for `slot`. Returns whether the CPU should
/// wake from low-power mode.
pub fn wire_data_event(slot: usize) -> bool {
    match wire_slot(slot) {
        Some(driver) => driver.isr_data(),
        None => false,
    }
}

/// I2C control vector entry for `slot`. Returns whether the CPU should wake
/// from low-power mode.
pub fn wire_control_event(slot: usize) -> bool {
    match wire_slot(slot) {
        Some(driver) => driver.isr_control(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        tx: AtomicUsize,
        rx: AtomicUsize,
    }

    impl Probe {
        const fn new() -> Self {
            Self {
                tx: AtomicUsize::new(0),
                rx: AtomicUsize::new(0),
            }
        }
    }

    impl SerialIsr for Probe {
        fn isr_send_char(&self) {
            self.tx.fetch_add(1, Ordering::Relaxed);
        }

        fn isr_get_char(&self) {
            self.rx.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn dispatch_reaches_registered_instance() {
        static PROBE: Probe = Probe::new();

        register_serial(0, &PROBE).unwrap();
        serial_tx_event(0);
        serial_tx_event(0);
        serial_rx_event(0);
        assert_eq!(PROBE.tx.load(Ordering::Relaxed), 2);
        assert_eq!(PROBE.rx.load(Ordering::Relaxed), 1);

        // Unrouted and out-of-range slots are ignored, not faulted.
        serial_tx_event(3);
        serial_tx_event(MAX_INSTANCES + 1);
        assert_eq!(PROBE.tx.load(Ordering::Relaxed), 2);

        unregister_serial(0);
        serial_tx_event(0);
        assert_eq!(PROBE.tx.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn slot_conflicts_are_reported() {
        static PROBE: Probe = Probe::new();

        register_serial(1, &PROBE).unwrap();
        assert_eq!(register_serial(1, &PROBE), Err(VectorError::SlotInUse));
        assert_eq!(
            register_serial(MAX_INSTANCES, &PROBE),
            Err(VectorError::SlotOutOfRange)
        );
        unregister_serial(1);
        assert!(register_serial(1, &PROBE).is_ok());
        unregister_serial(1);
    }
}
