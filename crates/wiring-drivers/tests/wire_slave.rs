//! Slave-side scenarios for the two-wire state machine.
//!
//! Nothing blocks here — the test body plays the hardware, firing the data
//! and control vectors directly.

use core::sync::atomic::{AtomicUsize, Ordering};

use wiring_drivers::mock::{MockPlatform, MockWireRegisters};
use wiring_drivers::regs::{ControlEvent, WireDirection};
use wiring_drivers::wire::TwoWire;
use wiring_hal::wire::{Wire, WireAddress, WireIsr};

type TestWire<const N: usize> = TwoWire<MockWireRegisters, MockPlatform, N>;

mod receive {
    use super::*;

    pub static REGS: MockWireRegisters = MockWireRegisters::new(16_000_000);
    pub static PLATFORM: MockPlatform = MockPlatform::new();
    pub static WIRE: TestWire<8> = TwoWire::new(&REGS, &PLATFORM);

    pub static COUNT: AtomicUsize = AtomicUsize::new(0);
    pub static FIRST: AtomicUsize = AtomicUsize::new(usize::MAX);

    pub fn on_receive(count: usize) {
        COUNT.store(count, Ordering::Relaxed);
        // Reading from inside the callback is allowed.
        if let Some(byte) = WIRE.read() {
            FIRST.store(byte as usize, Ordering::Relaxed);
        }
    }
}

#[test]
fn slave_receive_collects_and_reports() {
    use receive::{on_receive, COUNT, FIRST, REGS, WIRE};

    WIRE.begin_slave(WireAddress::SevenBit(0x2A));
    WIRE.on_receive(on_receive);

    REGS.set_slave_direction(WireDirection::Receive);
    REGS.push_control(ControlEvent::Start);
    assert!(!WIRE.isr_control());

    for byte in [10, 20, 30] {
        REGS.push_rx(byte);
        assert!(!WIRE.isr_data());
    }

    REGS.push_control(ControlEvent::Stop);
    // STOP wakes the CPU so a sleeping foreground can observe the result.
    assert!(WIRE.isr_control());

    assert_eq!(COUNT.load(Ordering::Relaxed), 3);
    assert_eq!(FIRST.load(Ordering::Relaxed), 10);
    // The callback consumed one byte; the rest remain readable.
    assert_eq!(WIRE.available(), 2);
    assert_eq!(WIRE.read(), Some(20));
    assert_eq!(WIRE.read(), Some(30));
    assert_eq!(WIRE.read(), None);
}

mod overflow {
    use super::*;

    pub static REGS: MockWireRegisters = MockWireRegisters::new(16_000_000);
    pub static PLATFORM: MockPlatform = MockPlatform::new();
    pub static WIRE: TestWire<4> = TwoWire::new(&REGS, &PLATFORM);

    pub static COUNT: AtomicUsize = AtomicUsize::new(0);

    pub fn on_receive(count: usize) {
        COUNT.store(count, Ordering::Relaxed);
    }
}

#[test]
fn slave_receive_backpressures_when_full() {
    use overflow::{on_receive, COUNT, REGS, WIRE};

    WIRE.begin_slave(WireAddress::SevenBit(0x2A));
    WIRE.on_receive(on_receive);

    REGS.set_slave_direction(WireDirection::Receive);
    REGS.push_control(ControlEvent::Start);
    WIRE.isr_control();

    for byte in 0..5u8 {
        REGS.push_rx(byte);
        WIRE.isr_data();
    }
    // Four slots; the fifth byte was refused on the bus, not dropped
    // silently.
    assert_eq!(REGS.nack_count(), 1);

    REGS.push_control(ControlEvent::Stop);
    WIRE.isr_control();
    assert_eq!(COUNT.load(Ordering::Relaxed), 4);
    assert_eq!(WIRE.available(), 4);
}

mod reply {
    use super::*;

    pub static REGS: MockWireRegisters = MockWireRegisters::new(16_000_000);
    pub static PLATFORM: MockPlatform = MockPlatform::new();
    pub static WIRE: TestWire<8> = TwoWire::new(&REGS, &PLATFORM);

    pub fn on_request() {
        WIRE.write(0xDE);
        WIRE.write(0xAD);
    }
}

#[test]
fn slave_transmit_sends_queued_reply_then_nacks() {
    use reply::{on_request, REGS, WIRE};

    WIRE.begin_slave(WireAddress::SevenBit(0x19));
    WIRE.on_request(on_request);

    REGS.set_slave_direction(WireDirection::Transmit);
    REGS.push_control(ControlEvent::Start);
    WIRE.isr_control();
    // The callback queued a reply, so no immediate NACK.
    assert_eq!(REGS.nack_count(), 0);

    WIRE.isr_data();
    WIRE.isr_data();
    assert_eq!(REGS.written().as_slice(), &[0xDE, 0xAD]);

    // Master keeps clocking: nothing left, refuse.
    WIRE.isr_data();
    assert_eq!(REGS.nack_count(), 1);

    // Master signals it is done reading.
    REGS.push_control(ControlEvent::Nack);
    WIRE.isr_control();

    // A later receive transaction starts cleanly.
    REGS.set_slave_direction(WireDirection::Receive);
    REGS.push_control(ControlEvent::Start);
    WIRE.isr_control();
    REGS.push_rx(0x01);
    WIRE.isr_data();
    REGS.push_control(ControlEvent::Stop);
    WIRE.isr_control();
    assert_eq!(WIRE.read(), Some(0x01));
}

mod silence {
    use super::*;

    pub static REGS: MockWireRegisters = MockWireRegisters::new(16_000_000);
    pub static PLATFORM: MockPlatform = MockPlatform::new();
    pub static WIRE: TestWire<8> = TwoWire::new(&REGS, &PLATFORM);

    pub fn on_request() {
        // Nothing to say.
    }
}

#[test]
fn slave_request_with_empty_reply_nacks_immediately() {
    use silence::{on_request, REGS, WIRE};

    WIRE.begin_slave(WireAddress::SevenBit(0x19));
    WIRE.on_request(on_request);

    REGS.set_slave_direction(WireDirection::Transmit);
    REGS.push_control(ControlEvent::Start);
    WIRE.isr_control();
    assert_eq!(REGS.nack_count(), 1);
}

#[test]
fn end_tears_the_bus_down() {
    static REGS: MockWireRegisters = MockWireRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static WIRE: TestWire<8> = TwoWire::new(&REGS, &PLATFORM);

    WIRE.begin_slave(WireAddress::SevenBit(0x2A));
    assert!(REGS.events_enabled());

    WIRE.end();
    assert!(!REGS.events_enabled());

    // Idempotent.
    WIRE.end();
    assert_eq!(WIRE.available(), 0);
}
