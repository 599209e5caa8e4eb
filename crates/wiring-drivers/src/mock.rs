//! Mock register blocks and platform for host-side testing
//!
//! Every mock is const-constructible so driver instances can live in
//! statics, the way they do on hardware, and be reached both from test code
//! and from simulated-interrupt hooks. State is held in atomics (or a
//! critical-section mutex for the few multi-byte logs), never in the types
//! under test.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use critical_section::Mutex;
use heapless::{Deque, Vec};
use wiring_hal::adc::AdcReference;
use wiring_hal::platform::{PinFunction, PinMux, Platform, SpiPins};
use wiring_hal::serial::{SerialParity, StopBits};
use wiring_hal::spi::{BitOrder, SpiMode};
use wiring_hal::wire::WireAddress;

use crate::regs::{
    AdcRegisters, ControlEvent, SpiRegisters, UartRegisters, WireDirection, WireRegisters,
};

const ORDER: Ordering = Ordering::Relaxed;

/// Simulated `millis()`/`idle()`/interrupt-state provider.
///
/// `idle()` advances the clock by one millisecond and runs the optional
/// hook, which stands in for "an interrupt fired while sleeping" — tests
/// drive the ISR entry points from it.
pub struct MockPlatform {
    millis: AtomicU32,
    idle_count: AtomicUsize,
    idle_hook: Option<fn()>,
    interrupts: AtomicBool,
    masked: AtomicU32,
}

impl MockPlatform {
    pub const fn new() -> Self {
        Self {
            millis: AtomicU32::new(0),
            idle_count: AtomicUsize::new(0),
            idle_hook: None,
            interrupts: AtomicBool::new(true),
            masked: AtomicU32::new(0),
        }
    }

    pub const fn with_idle_hook(hook: fn()) -> Self {
        Self {
            millis: AtomicU32::new(0),
            idle_count: AtomicUsize::new(0),
            idle_hook: Some(hook),
            interrupts: AtomicBool::new(true),
            masked: AtomicU32::new(0),
        }
    }

    pub fn set_interrupts_enabled(&self, enabled: bool) {
        self.interrupts.store(enabled, ORDER);
    }

    pub fn is_masked(&self, source: u8) -> bool {
        self.masked.load(ORDER) & (1 << source as u32) != 0
    }

    pub fn idle_count(&self) -> usize {
        self.idle_count.load(ORDER)
    }

    pub fn advance(&self, ms: u32) {
        self.millis.fetch_add(ms, ORDER);
    }
}

impl Platform for MockPlatform {
    fn millis(&self) -> u32 {
        self.millis.load(ORDER)
    }

    fn idle(&self) {
        self.millis.fetch_add(1, ORDER);
        self.idle_count.fetch_add(1, ORDER);
        if let Some(hook) = self.idle_hook {
            hook();
        }
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(ORDER)
    }

    fn disable_interrupts(&self) {
        self.interrupts.store(false, ORDER);
    }

    fn enable_interrupts(&self) {
        self.interrupts.store(true, ORDER);
    }

    fn mask_irq(&self, source: u8) {
        self.masked.fetch_or(1 << source as u32, ORDER);
    }

    fn unmask_irq(&self, source: u8) {
        self.masked.fetch_and(!(1 << source as u32), ORDER);
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the most recent pin-function selection.
pub struct MockPinMux {
    function: AtomicU8,
}

impl MockPinMux {
    pub const fn new() -> Self {
        Self {
            function: AtomicU8::new(0),
        }
    }

    pub fn selected(&self) -> PinFunction {
        match self.function.load(ORDER) {
            1 => PinFunction::FunctionA,
            2 => PinFunction::FunctionB,
            3 => PinFunction::Both,
            _ => PinFunction::Gpio,
        }
    }
}

impl PinMux for MockPinMux {
    fn select(&self, function: PinFunction) {
        let code = match function {
            PinFunction::Gpio => 0,
            PinFunction::FunctionA => 1,
            PinFunction::FunctionB => 2,
            PinFunction::Both => 3,
        };
        self.function.store(code, ORDER);
    }
}

impl Default for MockPinMux {
    fn default() -> Self {
        Self::new()
    }
}

/// UART register block double. Starts held in reset, like hardware after
/// power-up.
pub struct MockUartRegisters {
    clock: u32,
    in_reset: AtomicBool,
    busy: AtomicBool,
    tx_irq: AtomicBool,
    rx_irq: AtomicBool,
    break_irq: AtomicBool,
    tx_reg: AtomicU8,
    tx_count: AtomicUsize,
    rx_reg: AtomicU8,
    divider: AtomicU16,
    modulation: AtomicU8,
    oversample: AtomicBool,
    seven_bit: AtomicBool,
    two_stop_bits: AtomicBool,
    parity: AtomicU8,
    breaks_sent: AtomicUsize,
    break_line: AtomicBool,
}

impl MockUartRegisters {
    pub const fn new(clock: u32) -> Self {
        Self {
            clock,
            in_reset: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            tx_irq: AtomicBool::new(false),
            rx_irq: AtomicBool::new(false),
            break_irq: AtomicBool::new(false),
            tx_reg: AtomicU8::new(0),
            tx_count: AtomicUsize::new(0),
            rx_reg: AtomicU8::new(0),
            divider: AtomicU16::new(0),
            modulation: AtomicU8::new(0),
            oversample: AtomicBool::new(false),
            seven_bit: AtomicBool::new(false),
            two_stop_bits: AtomicBool::new(false),
            parity: AtomicU8::new(0),
            breaks_sent: AtomicUsize::new(0),
            break_line: AtomicBool::new(false),
        }
    }

    /// Last byte the driver handed to the transmit register.
    pub fn last_tx(&self) -> u8 {
        self.tx_reg.load(ORDER)
    }

    pub fn tx_count(&self) -> usize {
        self.tx_count.load(ORDER)
    }

    /// Stage a byte in the receive register ahead of an RX event.
    pub fn set_rx(&self, byte: u8) {
        self.rx_reg.store(byte, ORDER);
    }

    pub fn tx_irq_enabled(&self) -> bool {
        self.tx_irq.load(ORDER)
    }

    pub fn rx_irq_enabled(&self) -> bool {
        self.rx_irq.load(ORDER)
    }

    pub fn break_irq_enabled(&self) -> bool {
        self.break_irq.load(ORDER)
    }

    pub fn breaks_sent(&self) -> usize {
        self.breaks_sent.load(ORDER)
    }

    pub fn set_break_line(&self, active: bool) {
        self.break_line.store(active, ORDER);
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, ORDER);
    }

    pub fn divider(&self) -> (u16, u8, bool) {
        (
            self.divider.load(ORDER),
            self.modulation.load(ORDER),
            self.oversample.load(ORDER),
        )
    }

    pub fn frame(&self) -> (bool, StopBits, SerialParity) {
        let stop = if self.two_stop_bits.load(ORDER) {
            StopBits::Two
        } else {
            StopBits::One
        };
        let parity = match self.parity.load(ORDER) {
            1 => SerialParity::Odd,
            2 => SerialParity::Even,
            _ => SerialParity::None,
        };
        (self.seven_bit.load(ORDER), stop, parity)
    }
}

impl UartRegisters for MockUartRegisters {
    fn input_clock(&self) -> u32 {
        self.clock
    }

    fn hold_reset(&self) {
        self.in_reset.store(true, ORDER);
    }

    fn release_reset(&self) {
        self.in_reset.store(false, ORDER);
    }

    fn in_reset(&self) -> bool {
        self.in_reset.load(ORDER)
    }

    fn set_divider(&self, divider: u16, modulation: u8, oversample: bool) {
        self.divider.store(divider, ORDER);
        self.modulation.store(modulation, ORDER);
        self.oversample.store(oversample, ORDER);
    }

    fn set_frame(&self, seven_bit: bool, stop_bits: StopBits, parity: SerialParity) {
        self.seven_bit.store(seven_bit, ORDER);
        self.two_stop_bits
            .store(matches!(stop_bits, StopBits::Two), ORDER);
        let code = match parity {
            SerialParity::None => 0,
            SerialParity::Odd => 1,
            SerialParity::Even => 2,
        };
        self.parity.store(code, ORDER);
    }

    fn enable_rx_interrupt(&self) {
        self.rx_irq.store(true, ORDER);
    }

    fn disable_rx_interrupt(&self) {
        self.rx_irq.store(false, ORDER);
    }

    fn enable_tx_interrupt(&self) {
        self.tx_irq.store(true, ORDER);
    }

    fn disable_tx_interrupt(&self) {
        self.tx_irq.store(false, ORDER);
    }

    fn tx_interrupt_enabled(&self) -> bool {
        self.tx_irq.load(ORDER)
    }

    fn write_tx(&self, byte: u8) {
        self.tx_reg.store(byte, ORDER);
        self.tx_count.fetch_add(1, ORDER);
    }

    fn read_rx(&self) -> u8 {
        self.rx_reg.load(ORDER)
    }

    fn is_busy(&self) -> bool {
        self.busy.load(ORDER)
    }

    fn send_break(&self) {
        self.breaks_sent.fetch_add(1, ORDER);
    }

    fn enable_break_interrupt(&self) {
        self.break_irq.store(true, ORDER);
    }

    fn disable_break_interrupt(&self) {
        self.break_irq.store(false, ORDER);
    }

    fn break_detected(&self) -> bool {
        self.break_line.load(ORDER)
    }
}

/// Peripheral role a [`MockWireRegisters`] was last configured into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockWireMode {
    Idle,
    Master(WireDirection),
    Slave,
}

/// I2C register block double.
///
/// Tests act as the bus: `ack_address` resolves the address phase,
/// `push_rx` stages incoming bytes, `push_control` queues control events,
/// and the driver's writes/NACKs/STOPs are recorded for inspection.
pub struct MockWireRegisters {
    clock: u32,
    in_reset: AtomicBool,
    divider: AtomicU16,
    mode: AtomicU8,
    master_dir: AtomicU8,
    target: AtomicU16,
    own: AtomicU16,
    start_pending: AtomicBool,
    stop_pending: AtomicBool,
    stop_requests: AtomicUsize,
    reads: AtomicUsize,
    reads_at_stop: AtomicUsize,
    writes_at_stop: AtomicUsize,
    nacks: AtomicUsize,
    slave_dir: AtomicU8,
    events: AtomicBool,
    written: Mutex<RefCell<Vec<u8, 32>>>,
    rx_queue: Mutex<RefCell<Deque<u8, 32>>>,
    control_queue: Mutex<RefCell<Deque<ControlEvent, 8>>>,
}

impl MockWireRegisters {
    pub const fn new(clock: u32) -> Self {
        Self {
            clock,
            in_reset: AtomicBool::new(true),
            divider: AtomicU16::new(0),
            mode: AtomicU8::new(0),
            master_dir: AtomicU8::new(0),
            target: AtomicU16::new(0),
            own: AtomicU16::new(0),
            start_pending: AtomicBool::new(false),
            stop_pending: AtomicBool::new(false),
            stop_requests: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            reads_at_stop: AtomicUsize::new(usize::MAX),
            writes_at_stop: AtomicUsize::new(usize::MAX),
            nacks: AtomicUsize::new(0),
            slave_dir: AtomicU8::new(0),
            events: AtomicBool::new(false),
            written: Mutex::new(RefCell::new(Vec::new())),
            rx_queue: Mutex::new(RefCell::new(Deque::new())),
            control_queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Resolve the address phase (remote acknowledged).
    pub fn ack_address(&self) {
        self.start_pending.store(false, ORDER);
    }

    /// Stage a byte the driver will pick up with `read_data`.
    pub fn push_rx(&self, byte: u8) {
        critical_section::with(|cs| {
            let _ = self.rx_queue.borrow_ref_mut(cs).push_back(byte);
        });
    }

    /// Queue a control-category event for the next `control_event` poll.
    pub fn push_control(&self, event: ControlEvent) {
        critical_section::with(|cs| {
            let _ = self.control_queue.borrow_ref_mut(cs).push_back(event);
        });
    }

    pub fn set_slave_direction(&self, direction: WireDirection) {
        let code = match direction {
            WireDirection::Transmit => 0,
            WireDirection::Receive => 1,
        };
        self.slave_dir.store(code, ORDER);
    }

    /// Everything the driver wrote to the data register, in order.
    pub fn written(&self) -> Vec<u8, 32> {
        critical_section::with(|cs| self.written.borrow_ref(cs).clone())
    }

    pub fn mode(&self) -> MockWireMode {
        match self.mode.load(ORDER) {
            1 => {
                let direction = if self.master_dir.load(ORDER) == 0 {
                    WireDirection::Transmit
                } else {
                    WireDirection::Receive
                };
                MockWireMode::Master(direction)
            }
            2 => MockWireMode::Slave,
            _ => MockWireMode::Idle,
        }
    }

    pub fn target(&self) -> u16 {
        self.target.load(ORDER)
    }

    pub fn divider(&self) -> u16 {
        self.divider.load(ORDER)
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(ORDER)
    }

    /// Data reads completed when the STOP was most recently armed
    /// (`usize::MAX` when no STOP was ever armed).
    pub fn reads_at_stop(&self) -> usize {
        self.reads_at_stop.load(ORDER)
    }

    /// Data writes completed when the STOP was most recently armed.
    pub fn writes_at_stop(&self) -> usize {
        self.writes_at_stop.load(ORDER)
    }

    pub fn nack_count(&self) -> usize {
        self.nacks.load(ORDER)
    }

    pub fn events_enabled(&self) -> bool {
        self.events.load(ORDER)
    }
}

impl WireRegisters for MockWireRegisters {
    fn input_clock(&self) -> u32 {
        self.clock
    }

    fn hold_reset(&self) {
        self.in_reset.store(true, ORDER);
    }

    fn release_reset(&self) {
        self.in_reset.store(false, ORDER);
    }

    fn in_reset(&self) -> bool {
        self.in_reset.load(ORDER)
    }

    fn set_divider(&self, divider: u16) {
        self.divider.store(divider, ORDER);
    }

    fn config_master(&self, target: WireAddress, direction: WireDirection) {
        self.mode.store(1, ORDER);
        self.target.store(target.raw(), ORDER);
        let code = match direction {
            WireDirection::Transmit => 0,
            WireDirection::Receive => 1,
        };
        self.master_dir.store(code, ORDER);
    }

    fn config_slave(&self, own: WireAddress) {
        self.mode.store(2, ORDER);
        self.own.store(own.raw(), ORDER);
    }

    fn config_idle(&self) {
        self.mode.store(0, ORDER);
    }

    fn request_start(&self) {
        self.start_pending.store(true, ORDER);
    }

    fn start_pending(&self) -> bool {
        self.start_pending.load(ORDER)
    }

    fn request_stop(&self) {
        self.stop_requests.fetch_add(1, ORDER);
        self.reads_at_stop.store(self.reads.load(ORDER), ORDER);
        let writes = critical_section::with(|cs| self.written.borrow_ref(cs).len());
        self.writes_at_stop.store(writes, ORDER);
        // The simulated bus completes STOP conditions instantly.
        self.stop_pending.store(false, ORDER);
    }

    fn stop_pending(&self) -> bool {
        self.stop_pending.load(ORDER)
    }

    fn write_data(&self, byte: u8) {
        critical_section::with(|cs| {
            let _ = self.written.borrow_ref_mut(cs).push(byte);
        });
    }

    fn read_data(&self) -> u8 {
        self.reads.fetch_add(1, ORDER);
        critical_section::with(|cs| self.rx_queue.borrow_ref_mut(cs).pop_front()).unwrap_or(0)
    }

    fn send_nack(&self) {
        self.nacks.fetch_add(1, ORDER);
    }

    fn slave_direction(&self) -> WireDirection {
        if self.slave_dir.load(ORDER) == 0 {
            WireDirection::Transmit
        } else {
            WireDirection::Receive
        }
    }

    fn control_event(&self) -> Option<ControlEvent> {
        critical_section::with(|cs| self.control_queue.borrow_ref_mut(cs).pop_front())
    }

    fn enable_events(&self) {
        self.events.store(true, ORDER);
    }

    fn disable_events(&self) {
        self.events.store(false, ORDER);
    }
}

/// SPI register block double.
pub struct MockSpiRegisters {
    clock: u32,
    in_reset: AtomicBool,
    busy: AtomicBool,
    order_lsb: AtomicBool,
    mode: AtomicU8,
    divider: AtomicU16,
    written: Mutex<RefCell<Vec<u8, 32>>>,
    rx_queue: Mutex<RefCell<Deque<u8, 32>>>,
}

impl MockSpiRegisters {
    pub const fn new(clock: u32) -> Self {
        Self {
            clock,
            in_reset: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            order_lsb: AtomicBool::new(false),
            mode: AtomicU8::new(0),
            divider: AtomicU16::new(0),
            written: Mutex::new(RefCell::new(Vec::new())),
            rx_queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Stage the bytes the shift register will return, in order.
    pub fn push_rx(&self, byte: u8) {
        critical_section::with(|cs| {
            let _ = self.rx_queue.borrow_ref_mut(cs).push_back(byte);
        });
    }

    pub fn written(&self) -> Vec<u8, 32> {
        critical_section::with(|cs| self.written.borrow_ref(cs).clone())
    }

    pub fn frame(&self) -> (BitOrder, SpiMode) {
        let order = if self.order_lsb.load(ORDER) {
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        };
        let mode = match self.mode.load(ORDER) {
            1 => SpiMode::Mode1,
            2 => SpiMode::Mode2,
            3 => SpiMode::Mode3,
            _ => SpiMode::Mode0,
        };
        (order, mode)
    }

    pub fn divider(&self) -> u16 {
        self.divider.load(ORDER)
    }

    pub fn running(&self) -> bool {
        !self.in_reset.load(ORDER)
    }
}

impl SpiRegisters for MockSpiRegisters {
    fn input_clock(&self) -> u32 {
        self.clock
    }

    fn hold_reset(&self) {
        self.in_reset.store(true, ORDER);
    }

    fn release_reset(&self) {
        self.in_reset.store(false, ORDER);
    }

    fn in_reset(&self) -> bool {
        self.in_reset.load(ORDER)
    }

    fn set_frame(&self, order: BitOrder, mode: SpiMode) {
        self.order_lsb
            .store(matches!(order, BitOrder::LsbFirst), ORDER);
        let code = match mode {
            SpiMode::Mode0 => 0,
            SpiMode::Mode1 => 1,
            SpiMode::Mode2 => 2,
            SpiMode::Mode3 => 3,
        };
        self.mode.store(code, ORDER);
    }

    fn set_divider(&self, divider: u16) {
        self.divider.store(divider, ORDER);
    }

    fn is_busy(&self) -> bool {
        self.busy.load(ORDER)
    }

    fn write_tx(&self, byte: u8) {
        critical_section::with(|cs| {
            let _ = self.written.borrow_ref_mut(cs).push(byte);
        });
    }

    fn read_rx(&self) -> u8 {
        critical_section::with(|cs| self.rx_queue.borrow_ref_mut(cs).pop_front()).unwrap_or(0)
    }
}

/// Everything the driver did to the manually-driven SPI lines, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    Attach,
    Detach,
    ClaimSclk(bool),
    ToggleSclk,
    ReleaseSclk,
    DriveMosi(bool),
    ReleaseData,
}

/// SPI pin collaborator double recording the bit-bang sequence.
pub struct MockSpiPins {
    miso: AtomicBool,
    ops: Mutex<RefCell<Vec<PinOp, 32>>>,
}

impl MockSpiPins {
    pub const fn new() -> Self {
        Self {
            miso: AtomicBool::new(false),
            ops: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    pub fn set_miso(&self, high: bool) {
        self.miso.store(high, ORDER);
    }

    pub fn ops(&self) -> Vec<PinOp, 32> {
        critical_section::with(|cs| self.ops.borrow_ref(cs).clone())
    }

    pub fn clear_ops(&self) {
        critical_section::with(|cs| self.ops.borrow_ref_mut(cs).clear());
    }

    fn record(&self, op: PinOp) {
        critical_section::with(|cs| {
            let _ = self.ops.borrow_ref_mut(cs).push(op);
        });
    }
}

impl SpiPins for MockSpiPins {
    fn attach(&self) {
        self.record(PinOp::Attach);
    }

    fn detach(&self) {
        self.record(PinOp::Detach);
    }

    fn claim_sclk(&self, idle_high: bool) {
        self.record(PinOp::ClaimSclk(idle_high));
    }

    fn toggle_sclk(&self) {
        self.record(PinOp::ToggleSclk);
    }

    fn release_sclk(&self) {
        self.record(PinOp::ReleaseSclk);
    }

    fn drive_mosi(&self, high: bool) {
        self.record(PinOp::DriveMosi(high));
    }

    fn read_miso(&self) -> bool {
        self.miso.load(ORDER)
    }

    fn release_data(&self) {
        self.record(PinOp::ReleaseData);
    }
}

impl Default for MockSpiPins {
    fn default() -> Self {
        Self::new()
    }
}

/// ADC register block double. `busy()` reports true for a configurable
/// number of polls so tests can see the sleep loop actually spin.
pub struct MockAdcRegisters {
    max_channel: u8,
    busy_polls: AtomicU32,
    channel: AtomicU8,
    result: AtomicU16,
    powered: AtomicBool,
    reference: AtomicU8,
    conversions: AtomicUsize,
}

impl MockAdcRegisters {
    pub const fn new(max_channel: u8) -> Self {
        Self {
            max_channel,
            busy_polls: AtomicU32::new(0),
            channel: AtomicU8::new(0),
            result: AtomicU16::new(0),
            powered: AtomicBool::new(false),
            reference: AtomicU8::new(0),
            conversions: AtomicUsize::new(0),
        }
    }

    /// Next conversion reads back `value` after `busy_polls` busy polls.
    pub fn set_conversion(&self, value: u16, busy_polls: u32) {
        self.result.store(value, ORDER);
        self.busy_polls.store(busy_polls, ORDER);
    }

    pub fn channel(&self) -> u8 {
        self.channel.load(ORDER)
    }

    pub fn powered(&self) -> bool {
        self.powered.load(ORDER)
    }

    pub fn conversions(&self) -> usize {
        self.conversions.load(ORDER)
    }

    pub fn reference_code(&self) -> u8 {
        self.reference.load(ORDER)
    }
}

impl AdcRegisters for MockAdcRegisters {
    fn max_channel(&self) -> u8 {
        self.max_channel
    }

    fn set_reference(&self, reference: AdcReference) {
        let code = match reference {
            AdcReference::Supply => 0,
            AdcReference::Internal1V5 { export: false } => 1,
            AdcReference::Internal1V5 { export: true } => 2,
            AdcReference::Internal2V5 { export: false } => 3,
            AdcReference::Internal2V5 { export: true } => 4,
            AdcReference::External => 5,
        };
        self.reference.store(code, ORDER);
    }

    fn configure(&self, channel: u8) {
        self.channel.store(channel, ORDER);
        self.powered.store(true, ORDER);
    }

    fn start(&self) {
        self.conversions.fetch_add(1, ORDER);
    }

    fn busy(&self) -> bool {
        // Count down the configured number of busy polls.
        self.busy_polls
            .fetch_update(ORDER, ORDER, |n| n.checked_sub(1))
            .is_ok()
    }

    fn result(&self) -> u16 {
        self.result.load(ORDER)
    }

    fn power_down(&self) {
        self.powered.store(false, ORDER);
    }
}
