//! End-to-end scenarios for the ring-buffered serial engine, driven through
//! the mock register block.

use wiring_drivers::mock::{MockPinMux, MockPlatform, MockUartRegisters};
use wiring_drivers::regs::UartRegisters;
use wiring_drivers::uart::SerialUart;
use wiring_hal::platform::PinFunction;
use wiring_hal::serial::{Serial, SerialIsr, SerialParity, StopBits};

type TestUart<const TX: usize, const RX: usize> =
    SerialUart<MockUartRegisters, MockPlatform, MockPinMux, TX, RX>;

#[test]
fn round_trip_through_the_hardware_registers() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::FunctionA);

    UART.begin(9600);
    assert!(UART.is_active());
    assert!(REGS.rx_irq_enabled());
    // TX interrupt stays off until something is queued.
    assert!(!REGS.tx_irq_enabled());
    assert_eq!(PINS.selected(), PinFunction::FunctionA);

    assert_eq!(UART.write(b'X'), 1);
    assert!(REGS.tx_irq_enabled());
    UART.isr_send_char();
    assert_eq!(REGS.last_tx(), b'X');

    // Ring drained: the next TX event quiets the vector.
    UART.isr_send_char();
    assert!(!REGS.tx_irq_enabled());

    REGS.set_rx(b'Y');
    UART.isr_get_char();
    assert_eq!(UART.available(), 1);
    assert_eq!(UART.peek(), Some(b'Y'));
    assert_eq!(UART.read(), Some(b'Y'));
    assert_eq!(UART.read(), None);
}

#[test]
fn bit_rate_divider_reaches_the_hardware() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    UART.begin(9600);
    let (divider, _modulation, oversample) = REGS.divider();
    // 16 MHz / (16 * 9600) = 104.17
    assert!(oversample);
    assert_eq!(divider, 104);
}

#[test]
fn full_ring_write_fails_fast_when_it_could_never_drain() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<8, 8> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    UART.begin(115_200);
    for byte in 0..7u8 {
        assert_eq!(UART.write(byte), 1);
    }

    // Interrupts off: one more write must not spin waiting for an ISR that
    // cannot run.
    PLATFORM.set_interrupts_enabled(false);
    assert_eq!(UART.write(0xAA), 0);
    PLATFORM.set_interrupts_enabled(true);

    // Suspended peripheral: same conclusion.
    REGS.hold_reset();
    assert_eq!(UART.write(0xBB), 0);
    REGS.release_reset();

    // The refused writes left the ring intact.
    for expected in 0..7u8 {
        UART.isr_send_char();
        assert_eq!(REGS.last_tx(), expected);
    }
}

#[test]
fn rx_overrun_drops_bytes_silently() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<8, 8> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    UART.begin(9600);
    for byte in 10..19u8 {
        REGS.set_rx(byte);
        UART.isr_get_char();
    }
    // Seven slots; the two overrun bytes are gone without a trace.
    assert_eq!(UART.available(), 7);
    for expected in 10..17u8 {
        assert_eq!(UART.read(), Some(expected));
    }
    assert_eq!(UART.read(), None);
}

mod drained {
    use super::*;

    pub static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    pub static PLATFORM: MockPlatform = MockPlatform::with_idle_hook(drain);
    pub static PINS: MockPinMux = MockPinMux::new();
    pub static UART: TestUart<8, 8> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    // Stands in for the TX-ready interrupt while the foreground sleeps.
    fn drain() {
        UART.isr_send_char();
    }
}

#[test]
fn flush_blocks_until_the_isr_drains_the_ring() {
    use drained::{PLATFORM, REGS, UART};

    UART.begin(9600);
    assert_eq!(UART.write_all(b"hello"), 5);
    UART.flush();
    assert_eq!(REGS.tx_count(), 5);
    assert_eq!(REGS.last_tx(), b'o');
    assert!(PLATFORM.idle_count() >= 5);
}

mod slow_drain {
    use super::*;

    pub static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    pub static PLATFORM: MockPlatform = MockPlatform::with_idle_hook(drain);
    pub static PINS: MockPinMux = MockPinMux::new();
    pub static UART: TestUart<8, 8> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    fn drain() {
        UART.isr_send_char();
    }
}

#[test]
fn full_ring_write_blocks_until_a_slot_frees() {
    use slow_drain::{REGS, UART};

    UART.begin(9600);
    for byte in 0..7u8 {
        assert_eq!(UART.write(byte), 1);
    }
    // Ring full, peripheral live, interrupts on: this write sleeps until the
    // simulated ISR frees a slot.
    assert_eq!(UART.write(7), 1);
    UART.flush();
    assert_eq!(REGS.tx_count(), 8);
    assert_eq!(REGS.last_tx(), 7);
}

#[test]
fn begin_and_end_reset_the_buffers() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::FunctionB);

    UART.begin(9600);
    REGS.set_rx(1);
    UART.isr_get_char();
    UART.write(2);
    assert_eq!(UART.available(), 1);

    UART.begin(9600);
    assert_eq!(UART.available(), 0);

    UART.write(3);
    UART.end();
    assert!(!UART.is_active());
    assert!(!REGS.tx_irq_enabled());
    assert!(!REGS.rx_irq_enabled());
    assert_eq!(PINS.selected(), PinFunction::Gpio);
    // flush() has nothing left to wait for
    UART.flush();

    // end() is idempotent
    UART.end();
    assert!(!UART.is_active());
}

#[test]
fn frame_reconfiguration_holds_reset_and_restores_run_state() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    UART.begin(9600);
    UART.set_parity(SerialParity::Even);
    UART.set_stop_bits(StopBits::Two);
    UART.set_7bit(true);

    let (seven_bit, stop_bits, parity) = REGS.frame();
    assert!(seven_bit);
    assert_eq!(stop_bits, StopBits::Two);
    assert_eq!(parity, SerialParity::Even);
    // A running port comes back out of reset.
    assert!(UART.is_active());

    // A stopped port stays stopped.
    UART.end();
    UART.set_parity(SerialParity::Odd);
    assert!(!UART.is_active());
}

#[test]
fn send_break_preserves_tx_interrupt_state() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    // Suspended port refuses the break outright.
    UART.send_break();
    assert_eq!(REGS.breaks_sent(), 0);

    UART.begin(9600);
    UART.write(b'q');
    assert!(REGS.tx_irq_enabled());
    UART.send_break();
    assert_eq!(REGS.breaks_sent(), 1);
    assert!(REGS.tx_irq_enabled());
}

mod break_watch {
    use core::sync::atomic::{AtomicUsize, Ordering};

    pub static SEEN: AtomicUsize = AtomicUsize::new(0);

    pub fn on_break() {
        SEEN.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn break_interrupt_attach_and_detach() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    use break_watch::{on_break, SEEN};
    use core::sync::atomic::Ordering;

    UART.begin(9600);
    let caps = UART.capabilities();
    assert!(caps.break_interrupt && caps.send_break && caps.parity);

    UART.attach_break_interrupt(on_break);
    assert!(REGS.break_irq_enabled());

    // Framing-error vector without an actual break on the line: ignored.
    UART.isr_break();
    assert_eq!(SEEN.load(Ordering::Relaxed), 0);

    REGS.set_break_line(true);
    UART.isr_break();
    assert_eq!(SEEN.load(Ordering::Relaxed), 1);

    UART.detach_break_interrupt();
    assert!(!REGS.break_irq_enabled());
    UART.isr_break();
    assert_eq!(SEEN.load(Ordering::Relaxed), 1);
}

#[test]
fn embedded_io_adapters() {
    static REGS: MockUartRegisters = MockUartRegisters::new(16_000_000);
    static PLATFORM: MockPlatform = MockPlatform::new();
    static PINS: MockPinMux = MockPinMux::new();
    static UART: TestUart<16, 16> = SerialUart::new(&REGS, &PLATFORM, &PINS, PinFunction::Gpio);

    use embedded_io::{Read, ReadReady, Write};

    UART.begin(9600);
    let mut port = &UART;

    assert_eq!(Write::write(&mut port, b"ab").unwrap(), 2);
    UART.isr_send_char();
    assert_eq!(REGS.last_tx(), b'a');

    assert!(!port.read_ready().unwrap());
    REGS.set_rx(b'z');
    UART.isr_get_char();
    assert!(port.read_ready().unwrap());

    let mut buf = [0u8; 4];
    assert_eq!(Read::read(&mut port, &mut buf).unwrap(), 1);
    assert_eq!(buf[0], b'z');

    // A port that can never produce data errors instead of hanging.
    UART.end();
    assert!(Read::read(&mut port, &mut buf).is_err());
}
