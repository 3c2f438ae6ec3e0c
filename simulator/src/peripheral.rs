//! Register-level model of the STM32F4 I2C peripheral in master mode

use crate::target::SimTarget;
use i2c_master::{Flag, Registers, Setup, Status};
use log::trace;

/// One call made on the register interface
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Access {
    /// CR1.START set
    Start,
    /// CR1.STOP set
    Stop,
    /// CR1.ACK written
    Ack(bool),
    /// SR1 read
    Status1,
    /// SR2 read
    Status2,
    /// DR written
    WriteData(u8),
    /// DR read, with the value returned
    ReadData(u8),
    /// SR1.AF cleared
    ClearAcknowledgeFailure,
    /// CR1.PE written
    Enable(bool),
    /// CR2.FREQ written
    Frequency(u8),
    /// CCR written
    ClockControl(u16),
    /// TRISE written
    RiseTime(u8),
}

/// An ADDR flag released by the SR1-then-SR2 read sequence
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AddressClear {
    /// Direction bit of the address that was matched
    pub read: bool,
    /// CR1.ACK at the moment SR2 was read
    pub ack: bool,
}

/// Keep a flag from ever being set
///
/// `occurrence` counts from one: `Stall::nth(Flag::StartGenerated, 2)` lets the
/// first START through and swallows the repeated START.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Stall {
    /// The flag to hold back
    pub flag: Flag,
    /// Which raise of the flag is swallowed
    pub occurrence: usize,
}

impl Stall {
    /// Swallow the first raise of `flag`
    pub const fn first(flag: Flag) -> Self {
        Self::nth(flag, 1)
    }

    /// Swallow the `occurrence`-th raise of `flag`
    pub const fn nth(flag: Flag, occurrence: usize) -> Self {
        Self { flag, occurrence }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Mode {
    /// Not yet transferring data: idle, or between START and ADDR cleared
    Addressing,
    Transmitter,
    Receiver,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Event {
    StartGenerated,
    AddressSent(u8),
    /// DR content moved into the shift register
    ByteMoved(u8),
    /// Shift register clocked out, slave answered
    ByteSent(u8),
    /// Slave clocked a byte in, master answered
    ByteReceived,
}

impl Event {
    const fn is_transfer(self) -> bool {
        matches!(
            self,
            Event::ByteMoved(_) | Event::ByteSent(_) | Event::ByteReceived
        )
    }
}

#[derive(Debug)]
struct Pending {
    due: u32,
    event: Event,
}

const FLAG_COUNT: usize = 6;

/// Simulated I2C peripheral with one slave on the bus
///
/// Hardware progress happens on SR1 reads: every read advances pending bus
/// activity by one step, and activity started by a register access becomes
/// visible after `latency` further reads. All register accesses are logged.
#[derive(Debug)]
pub struct SimPeripheral {
    target: SimTarget,
    enabled: bool,
    ack: bool,
    freq: u8,
    ccr: u16,
    trise: u8,
    sr1: Status,
    dr: u8,
    addr_latched: bool,
    owns_bus: bool,
    mode: Mode,
    read_direction: bool,
    slave_sending: bool,
    rx: Option<u8>,
    rx_shift: Option<u8>,
    start_requested: bool,
    stop_requested: bool,
    pending: Vec<Pending>,
    latency: u32,
    stall: Option<Stall>,
    raised: [usize; FLAG_COUNT],
    accesses: Vec<Access>,
    address_clears: Vec<AddressClear>,
}

impl SimPeripheral {
    /// Disabled peripheral with `target` on its bus
    pub fn new(target: SimTarget) -> Self {
        Self {
            target,
            enabled: false,
            ack: false,
            freq: 0,
            ccr: 0,
            trise: 0,
            sr1: Status::default(),
            dr: 0,
            addr_latched: false,
            owns_bus: false,
            mode: Mode::Addressing,
            read_direction: false,
            slave_sending: false,
            rx: None,
            rx_shift: None,
            start_requested: false,
            stop_requested: false,
            pending: Vec::new(),
            latency: 0,
            stall: None,
            raised: [0; FLAG_COUNT],
            accesses: Vec::new(),
            address_clears: Vec::new(),
        }
    }

    /// Number of extra SR1 reads before bus activity shows up in SR1
    #[must_use]
    pub fn with_latency(mut self, latency: u32) -> Self {
        self.latency = latency;
        self
    }

    /// Hold back one raise of a flag forever
    #[must_use]
    pub fn with_stall(mut self, stall: Stall) -> Self {
        self.stall = Some(stall);
        self
    }

    /// The slave on the bus
    pub fn target(&self) -> &SimTarget {
        &self.target
    }

    /// Register accesses in call order
    pub fn accesses(&self) -> &[Access] {
        &self.accesses
    }

    /// Every ADDR release, in order
    pub fn address_clears(&self) -> &[AddressClear] {
        &self.address_clears
    }

    /// Number of logged accesses equal to `access`
    pub fn count(&self, access: Access) -> usize {
        self.accesses.iter().filter(|&&a| a == access).count()
    }

    /// CR1.ACK
    pub fn ack_enabled(&self) -> bool {
        self.ack
    }

    /// CR1.PE
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// CR2.FREQ, CCR and TRISE as programmed
    pub fn timing(&self) -> (u8, u16, u8) {
        (self.freq, self.ccr, self.trise)
    }

    /// No START issued since the last STOP
    pub fn bus_idle(&self) -> bool {
        !self.owns_bus
    }

    /// Logs `access`; anything but an SR2 read breaks the SR1-then-SR2 sequence.
    fn record(&mut self, access: Access) {
        self.accesses.push(access);
        self.addr_latched = false;
    }

    fn schedule(&mut self, event: Event) {
        self.pending.push(Pending {
            due: self.latency + 1,
            event,
        });
    }

    fn transfer_in_flight(&self) -> bool {
        self.pending.iter().any(|p| p.event.is_transfer())
    }

    /// Counts a raise of `flag`; false if it is the stalled one.
    fn permit(&mut self, flag: Flag) -> bool {
        let slot = flag as usize;
        self.raised[slot] += 1;
        match self.stall {
            Some(stall) if stall.flag == flag && stall.occurrence == self.raised[slot] => {
                trace!("sim: holding back {flag:?}");
                false
            }
            _ => true,
        }
    }

    fn raise(&mut self, flag: Flag) -> bool {
        let permitted = self.permit(flag);
        if permitted {
            self.sr1 = self.sr1.with(flag);
        }
        permitted
    }

    fn tick(&mut self) {
        let mut ready = Vec::new();
        self.pending.retain_mut(|p| {
            p.due = p.due.saturating_sub(1);
            if p.due == 0 {
                ready.push(p.event);
                false
            } else {
                true
            }
        });

        for event in ready {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: Event) {
        trace!("sim: {event:?}");
        match event {
            Event::StartGenerated => {
                if self.raise(Flag::StartGenerated) {
                    self.owns_bus = true;
                    self.mode = Mode::Addressing;
                    self.sr1 = self
                        .sr1
                        .without(Flag::TxEmpty)
                        .without(Flag::ByteTransferFinished);
                    self.target.start();
                }
            }
            Event::AddressSent(byte) => {
                if self.target.select(byte) {
                    if self.raise(Flag::AddressSent) {
                        self.read_direction = byte & 1 == 1;
                    }
                } else {
                    self.raise(Flag::AcknowledgeFailure);
                }
            }
            Event::ByteMoved(byte) => {
                if self.raise(Flag::TxEmpty) {
                    self.schedule(Event::ByteSent(byte));
                }
            }
            Event::ByteSent(byte) => {
                if !self.target.write(byte) {
                    self.raise(Flag::AcknowledgeFailure);
                    return;
                }
                // DR refilled in the meantime: the next byte follows without BTF
                if self.sr1.is_set(Flag::TxEmpty) {
                    self.raise(Flag::ByteTransferFinished);
                    self.end_of_byte();
                }
            }
            Event::ByteReceived => {
                if !self.permit(Flag::RxNotEmpty) {
                    return;
                }

                let byte = self.target.read();
                let acked = self.ack;
                self.target.acknowledge(byte, acked);
                self.slave_sending = acked;

                if self.rx.is_none() {
                    self.rx = Some(byte);
                    self.sr1 = self.sr1.with(Flag::RxNotEmpty);
                } else {
                    self.rx_shift = Some(byte);
                    self.sr1 = self.sr1.with(Flag::ByteTransferFinished);
                }

                if !self.end_of_byte() && acked && self.rx_shift.is_none() {
                    self.schedule(Event::ByteReceived);
                }
            }
        }
    }

    /// Carry out a STOP or START queued behind the byte that just finished.
    fn end_of_byte(&mut self) -> bool {
        if self.stop_requested {
            self.execute_stop();
            true
        } else if self.start_requested {
            self.start_requested = false;
            self.slave_sending = false;
            self.schedule(Event::StartGenerated);
            true
        } else {
            false
        }
    }

    fn execute_stop(&mut self) {
        self.stop_requested = false;
        self.start_requested = false;
        self.slave_sending = false;
        self.pending.clear();
        self.sr1 = self
            .sr1
            .without(Flag::StartGenerated)
            .without(Flag::AddressSent)
            .without(Flag::TxEmpty)
            .without(Flag::ByteTransferFinished);
        self.mode = Mode::Addressing;
        if self.owns_bus {
            self.owns_bus = false;
            self.target.stop();
        }
    }
}

impl Registers for SimPeripheral {
    fn generate_start(&mut self) {
        self.record(Access::Start);
        if !self.enabled {
            return;
        }

        if self.transfer_in_flight() {
            self.start_requested = true;
        } else {
            self.schedule(Event::StartGenerated);
        }
    }

    fn generate_stop(&mut self) {
        self.record(Access::Stop);
        if !self.enabled {
            return;
        }

        if self.transfer_in_flight() {
            self.stop_requested = true;
        } else {
            self.execute_stop();
        }
    }

    fn set_ack(&mut self, enabled: bool) {
        self.record(Access::Ack(enabled));
        // Held cleared by hardware while PE is off
        self.ack = enabled && self.enabled;
    }

    fn read_status1(&mut self) -> Status {
        self.accesses.push(Access::Status1);
        self.tick();
        self.addr_latched = self.sr1.is_set(Flag::AddressSent);
        self.sr1
    }

    fn read_status2(&mut self) -> u16 {
        self.accesses.push(Access::Status2);

        // ADDR only clears when the SR1 read right before this one showed it
        let latched = std::mem::take(&mut self.addr_latched);
        if latched && self.sr1.is_set(Flag::AddressSent) {
            self.sr1 = self.sr1.without(Flag::AddressSent);
            self.address_clears.push(AddressClear {
                read: self.read_direction,
                ack: self.ack,
            });

            if self.read_direction {
                self.mode = Mode::Receiver;
                self.slave_sending = true;
                self.schedule(Event::ByteReceived);
            } else {
                self.mode = Mode::Transmitter;
                self.sr1 = self.sr1.with(Flag::TxEmpty);
            }
        }

        // MSL | BUSY
        if self.owns_bus { 0b11 } else { 0 }
    }

    fn write_data(&mut self, byte: u8) {
        self.record(Access::WriteData(byte));
        self.dr = byte;

        if self.sr1.is_set(Flag::StartGenerated) {
            self.sr1 = self.sr1.without(Flag::StartGenerated);
            self.schedule(Event::AddressSent(byte));
        } else if self.mode == Mode::Transmitter {
            self.sr1 = self
                .sr1
                .without(Flag::TxEmpty)
                .without(Flag::ByteTransferFinished);
            self.schedule(Event::ByteMoved(byte));
        }
    }

    fn read_data(&mut self) -> u8 {
        if let Some(byte) = self.rx.take() {
            self.dr = byte;
            self.sr1 = self.sr1.without(Flag::RxNotEmpty);
        }

        if let Some(byte) = self.rx_shift.take() {
            self.rx = Some(byte);
            self.sr1 = self
                .sr1
                .with(Flag::RxNotEmpty)
                .without(Flag::ByteTransferFinished);
            if self.slave_sending && self.mode == Mode::Receiver {
                self.schedule(Event::ByteReceived);
            }
        }

        self.record(Access::ReadData(self.dr));
        self.dr
    }

    fn clear_acknowledge_failure(&mut self) {
        self.record(Access::ClearAcknowledgeFailure);
        self.sr1 = self.sr1.without(Flag::AcknowledgeFailure);
    }
}

impl Setup for SimPeripheral {
    fn set_enabled(&mut self, enabled: bool) {
        self.record(Access::Enable(enabled));
        self.enabled = enabled;
        if !enabled {
            self.ack = false;
        }
    }

    fn write_frequency(&mut self, mhz: u8) {
        self.record(Access::Frequency(mhz));
        assert!(!self.enabled, "CR2.FREQ written while PE is set");
        self.freq = mhz;
    }

    fn write_clock_control(&mut self, ccr: u16) {
        self.record(Access::ClockControl(ccr));
        assert!(!self.enabled, "CCR written while PE is set");
        self.ccr = ccr;
    }

    fn write_rise_time(&mut self, trise: u8) {
        self.record(Access::RiseTime(trise));
        assert!(!self.enabled, "TRISE written while PE is set");
        self.trise = trise;
    }
}
