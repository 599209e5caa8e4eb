//! I2C master/slave transaction state machine
//!
//! The engine arbitrates the five roles (idle, master-tx/rx, slave-tx/rx)
//! across the two hardware interrupt categories: data-ready events advance
//! the active transfer, control events (START/STOP/NACK/arbitration loss)
//! switch roles and classify errors. Master-initiated calls block the
//! foreground in low-power sleep until the machine returns to idle; only the
//! address phase is deadline-bounded.
//!
//! NACK classification is phase-aware: a NACK while the address phase is
//! still unresolved reports [`WireError::AddrNack`], afterwards
//! [`WireError::DataNack`]. Control events delivered between the hardware
//! resolving the address and the foreground observing it are attributed to
//! the data phase.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;
use wiring_hal::platform::Platform;
use wiring_hal::wire::{
    ReceiveCallback, RequestCallback, Wire, WireAddress, WireError, WireIsr,
};

use crate::regs::{ControlEvent, WireDirection, WireRegisters};

/// Deadline for the address phase of a master transaction.
pub const ADDRESS_TIMEOUT_MS: u32 = 50;

/// Default bus clock on `begin`.
pub const DEFAULT_CLOCK_HZ: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireRole {
    Idle,
    MasterTx,
    MasterRx,
    SlaveTx,
    SlaveRx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WirePhase {
    Address,
    Data,
}

struct WireState<const N: usize> {
    role: WireRole,
    phase: WirePhase,
    error: Option<WireError>,
    own_address: Option<WireAddress>,
    target: WireAddress,
    tx: Vec<u8, N>,
    tx_cursor: usize,
    rx: Vec<u8, N>,
    rx_cursor: usize,
    /// Byte count a master read is waiting for.
    expected: usize,
    on_receive: Option<ReceiveCallback>,
    on_request: Option<RequestCallback>,
}

/// Two-wire driver over a [`WireRegisters`] peripheral.
///
/// `N` sizes the linear TX/RX message buffers (one message each way, cursor
/// addressed — distinct from the UART's rings, which never delimit
/// messages).
pub struct TwoWire<R, P, const N: usize>
where
    R: WireRegisters + 'static,
    P: Platform + 'static,
{
    regs: &'static R,
    platform: &'static P,
    state: Mutex<RefCell<WireState<N>>>,
}

impl<R, P, const N: usize> TwoWire<R, P, N>
where
    R: WireRegisters,
    P: Platform,
{
    pub const fn new(regs: &'static R, platform: &'static P) -> Self {
        Self {
            regs,
            platform,
            state: Mutex::new(RefCell::new(WireState {
                role: WireRole::Idle,
                phase: WirePhase::Address,
                error: None,
                own_address: None,
                target: WireAddress::SevenBit(0),
                tx: Vec::new(),
                tx_cursor: 0,
                rx: Vec::new(),
                rx_cursor: 0,
                expected: 0,
                on_receive: None,
                on_request: None,
            })),
        }
    }

    fn bring_up(&self, own_address: Option<WireAddress>) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.role = WireRole::Idle;
            state.error = None;
            state.own_address = own_address;
            state.tx.clear();
            state.tx_cursor = 0;
            state.rx.clear();
            state.rx_cursor = 0;
        });

        self.regs.hold_reset();
        let divider = bus_divider(self.regs.input_clock(), DEFAULT_CLOCK_HZ);
        self.regs.set_divider(divider);
        match own_address {
            Some(own) => self.regs.config_slave(own),
            None => self.regs.config_idle(),
        }
        self.regs.release_reset();
        self.regs.enable_events();
    }

    /// Block until the state machine returns to idle or records an error.
    fn complete_master(&self) -> Result<(), WireError> {
        let started = self.platform.millis();
        while self.regs.start_pending() {
            if let Some(error) = critical_section::with(|cs| self.state.borrow_ref(cs).error) {
                self.finish_stop();
                return Err(error);
            }
            if self.platform.millis().wrapping_sub(started) >= ADDRESS_TIMEOUT_MS {
                // Nobody home. Release the bus and classify as an
                // unacknowledged address.
                self.regs.request_stop();
                self.finish_stop();
                critical_section::with(|cs| {
                    let mut state = self.state.borrow_ref_mut(cs);
                    state.role = WireRole::Idle;
                    state.error = Some(WireError::AddrNack);
                });
                return Err(WireError::AddrNack);
            }
            self.platform.idle();
        }

        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).phase = WirePhase::Data;
        });

        loop {
            let (role, error) = critical_section::with(|cs| {
                let state = self.state.borrow_ref(cs);
                (state.role, state.error)
            });
            if let Some(error) = error {
                self.finish_stop();
                return Err(error);
            }
            if role == WireRole::Idle {
                break;
            }
            self.platform.idle();
        }

        self.finish_stop();
        Ok(())
    }

    /// Wait for an armed STOP to complete on the bus.
    fn finish_stop(&self) {
        while self.regs.stop_pending() {
            self.platform.idle();
        }
    }

    /// Return the peripheral to its pre-transaction configuration. A failed
    /// master exchange must never leave a configured slave stuck in master
    /// mode.
    fn restore_mode(&self) {
        let own = critical_section::with(|cs| self.state.borrow_ref(cs).own_address);
        match own {
            Some(own_address) => self.regs.config_slave(own_address),
            None => self.regs.config_idle(),
        }
    }
}

impl<R, P, const N: usize> Wire for TwoWire<R, P, N>
where
    R: WireRegisters,
    P: Platform,
{
    fn begin(&self) {
        self.bring_up(None);
        log::debug!("wire: up as master");
    }

    fn begin_slave(&self, own_address: WireAddress) {
        self.bring_up(Some(own_address));
        log::debug!("wire: up as slave at {:#x}", own_address.raw());
    }

    fn end(&self) {
        self.regs.disable_events();
        self.regs.hold_reset();
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.role = WireRole::Idle;
            state.error = None;
            state.own_address = None;
            state.tx.clear();
            state.tx_cursor = 0;
            state.rx.clear();
            state.rx_cursor = 0;
        });
    }

    fn set_clock(&self, hz: u32) {
        let was_running = !self.regs.in_reset();
        self.regs.hold_reset();
        self.regs.set_divider(bus_divider(self.regs.input_clock(), hz));
        if was_running {
            self.regs.release_reset();
        }
    }

    fn begin_transmission(&self, target: WireAddress) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.target = target;
            // Errors never carry over into the next transaction.
            state.error = None;
            state.tx.clear();
            state.tx_cursor = 0;
        });
    }

    fn end_transmission(&self) -> Result<(), WireError> {
        let target = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.role = WireRole::MasterTx;
            state.phase = WirePhase::Address;
            state.error = None;
            state.tx_cursor = 0;
            state.target
        });

        self.regs.config_master(target, WireDirection::Transmit);
        self.regs.request_start();

        let result = self.complete_master();
        self.restore_mode();
        if let Err(error) = result {
            log::debug!("wire: master write to {:#x} failed: {}", target.raw(), error);
        }
        result
    }

    fn request_from(&self, target: WireAddress, len: usize) -> usize {
        let len = len.min(N);
        if len == 0 {
            return 0;
        }

        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.role = WireRole::MasterRx;
            state.phase = WirePhase::Address;
            state.error = None;
            state.target = target;
            state.rx.clear();
            state.rx_cursor = 0;
            state.expected = len;
        });

        self.regs.config_master(target, WireDirection::Receive);
        self.regs.request_start();
        if len == 1 {
            // No later data event can arm the STOP for a single-byte read;
            // it has to be in place before the data phase begins.
            self.regs.request_stop();
        }

        let result = self.complete_master();
        self.restore_mode();
        match result {
            Ok(()) => critical_section::with(|cs| self.state.borrow_ref(cs).rx.len()),
            Err(error) => {
                log::debug!("wire: master read from {:#x} failed: {}", target.raw(), error);
                // A failed read exposes nothing, not a partial message.
                critical_section::with(|cs| {
                    let mut state = self.state.borrow_ref_mut(cs);
                    state.rx.clear();
                    state.rx_cursor = 0;
                });
                0
            }
        }
    }

    fn write(&self, byte: u8) -> usize {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match state.tx.push(byte) {
                Ok(()) => 1,
                Err(_) => 0,
            }
        })
    }

    fn available(&self) -> usize {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            state.rx.len() - state.rx_cursor
        })
    }

    fn read(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.rx_cursor < state.rx.len() {
                let byte = state.rx[state.rx_cursor];
                state.rx_cursor += 1;
                Some(byte)
            } else {
                None
            }
        })
    }

    fn peek(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            if state.rx_cursor < state.rx.len() {
                Some(state.rx[state.rx_cursor])
            } else {
                None
            }
        })
    }

    fn flush(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.tx.clear();
            state.tx_cursor = 0;
            state.rx.clear();
            state.rx_cursor = 0;
        });
    }

    fn last_error(&self) -> Option<WireError> {
        critical_section::with(|cs| self.state.borrow_ref(cs).error)
    }

    fn on_receive(&self, callback: ReceiveCallback) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).on_receive = Some(callback);
        });
    }

    fn on_request(&self, callback: RequestCallback) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).on_request = Some(callback);
        });
    }
}

impl<R, P, const N: usize> WireIsr for TwoWire<R, P, N>
where
    R: WireRegisters,
    P: Platform,
{
    fn isr_data(&self) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match state.role {
                WireRole::MasterTx => {
                    // A data event in a master role means the address phase
                    // resolved.
                    state.phase = WirePhase::Data;
                    if state.tx_cursor < state.tx.len() {
                        let byte = state.tx[state.tx_cursor];
                        state.tx_cursor += 1;
                        self.regs.write_data(byte);
                        false
                    } else {
                        self.regs.request_stop();
                        state.role = WireRole::Idle;
                        true
                    }
                }
                WireRole::MasterRx => {
                    state.phase = WirePhase::Data;
                    let byte = self.regs.read_data();
                    if state.rx.len() < state.expected {
                        let _ = state.rx.push(byte);
                    }
                    if state.rx.len() + 1 == state.expected {
                        // Second-to-last byte: the STOP must be armed before
                        // the final byte completes.
                        self.regs.request_stop();
                        false
                    } else if state.rx.len() >= state.expected {
                        state.role = WireRole::Idle;
                        true
                    } else {
                        false
                    }
                }
                WireRole::SlaveTx => {
                    if state.tx_cursor < state.tx.len() {
                        let byte = state.tx[state.tx_cursor];
                        state.tx_cursor += 1;
                        self.regs.write_data(byte);
                    } else {
                        self.regs.send_nack();
                    }
                    false
                }
                WireRole::SlaveRx => {
                    let byte = self.regs.read_data();
                    if state.rx.push(byte).is_err() {
                        // Unlike the UART's silent drop, a full slave buffer
                        // pushes back at the bus level.
                        self.regs.send_nack();
                    }
                    false
                }
                WireRole::Idle => false,
            }
        })
    }

    fn isr_control(&self) -> bool {
        let Some(event) = self.regs.control_event() else {
            return false;
        };

        match event {
            ControlEvent::ArbitrationLost => critical_section::with(|cs| {
                let mut state = self.state.borrow_ref_mut(cs);
                state.error = Some(WireError::BusBusy);
                state.role = WireRole::Idle;
                true
            }),
            ControlEvent::Nack => critical_section::with(|cs| {
                let mut state = self.state.borrow_ref_mut(cs);
                match state.role {
                    WireRole::MasterTx | WireRole::MasterRx => {
                        state.error = Some(match state.phase {
                            WirePhase::Address => WireError::AddrNack,
                            WirePhase::Data => WireError::DataNack,
                        });
                        self.regs.request_stop();
                        state.role = WireRole::Idle;
                        true
                    }
                    // The remote master has read all it wanted.
                    WireRole::SlaveTx => {
                        state.role = WireRole::Idle;
                        false
                    }
                    _ => false,
                }
            }),
            ControlEvent::Start => {
                // Addressed as a slave; the direction bit picks the role.
                let direction = self.regs.slave_direction();
                let request = critical_section::with(|cs| {
                    let mut state = self.state.borrow_ref_mut(cs);
                    match direction {
                        WireDirection::Transmit => {
                            state.role = WireRole::SlaveTx;
                            state.tx.clear();
                            state.tx_cursor = 0;
                            state.on_request
                        }
                        WireDirection::Receive => {
                            state.role = WireRole::SlaveRx;
                            state.rx.clear();
                            state.rx_cursor = 0;
                            None
                        }
                    }
                });
                // The callback runs outside the state borrow: it queues its
                // reply through Wire::write.
                if let Some(callback) = request {
                    callback();
                    let empty =
                        critical_section::with(|cs| self.state.borrow_ref(cs).tx.is_empty());
                    if empty {
                        self.regs.send_nack();
                    }
                }
                false
            }
            ControlEvent::Stop => {
                let received = critical_section::with(|cs| {
                    let mut state = self.state.borrow_ref_mut(cs);
                    match state.role {
                        WireRole::SlaveRx => {
                            state.role = WireRole::Idle;
                            let count = state.rx.len();
                            // Write a NUL terminator past the logical end if
                            // the backing store has room for it.
                            if state.rx.push(0).is_ok() {
                                state.rx.truncate(count);
                            }
                            Some((count, state.on_receive))
                        }
                        WireRole::SlaveTx => {
                            state.role = WireRole::Idle;
                            None
                        }
                        _ => None,
                    }
                });
                if let Some((count, Some(callback))) = received {
                    callback(count);
                }
                true
            }
        }
    }
}

/// Divider that keeps the bus at or below the requested rate.
fn bus_divider(clock: u32, hz: u32) -> u16 {
    let hz = hz.max(1);
    let divider = clock.div_ceil(hz).max(1);
    divider.min(u16::MAX as u32) as u16
}

// The bus adapter is implemented on shared references: the driver itself
// lives in a static (the vector tables need it there), so the `&mut` the
// `embedded-hal` trait requires has to come from a reborrowable handle.

impl<'a, R, P, const N: usize> embedded_hal::i2c::ErrorType for &'a TwoWire<R, P, N>
where
    R: WireRegisters,
    P: Platform,
{
    type Error = WireError;
}

/// Blocking `embedded-hal` master access.
///
/// Each operation is issued as its own STOP-terminated bus transaction; the
/// engine does not chain repeated starts between operations.
impl<'a, R, P, const N: usize> embedded_hal::i2c::I2c for &'a TwoWire<R, P, N>
where
    R: WireRegisters,
    P: Platform,
{
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        use embedded_hal::i2c::Operation;

        let bus = *self;
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    bus.begin_transmission(WireAddress::SevenBit(address));
                    if bus.write_all(bytes) < bytes.len() {
                        return Err(WireError::Overflow);
                    }
                    bus.end_transmission()?;
                }
                Operation::Read(buffer) => {
                    if buffer.len() > N {
                        return Err(WireError::Overflow);
                    }
                    let got = bus.request_from(WireAddress::SevenBit(address), buffer.len());
                    if got < buffer.len() {
                        return Err(bus.last_error().unwrap_or(WireError::BusBusy));
                    }
                    for slot in buffer.iter_mut() {
                        *slot = bus.read().unwrap_or(0);
                    }
                }
            }
        }
        Ok(())
    }
}
