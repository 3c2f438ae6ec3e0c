//! Transaction state machine
//!
//! A transaction is a list of [`Operation`]s. Adjacent operations of the same
//! direction form a run that is transferred without an intervening START; every
//! run after the first is introduced by a repeated START and the last run ends
//! with a STOP. Zero-length reads carry nothing on the wire and are skipped.
//!
//! The register read `[Write([register]), Read(buf)]` walks:
//!
//! ```text
//! Idle -> Start -> AddressWriteSent -> AddressWriteMatched -> ByteSent
//!      -> ByteQueued -> ByteLatched -> RepeatedStart -> AddressReadSent
//!      -> AddressReadMatched -> [Receiving ->] AckDisabled -> StopQueued
//!      -> DataReady -> Done
//! ```

use crate::config::{BusConfig, ConfigError};
use crate::regs::{AddressMatched, Flag, Registers, Setup};
use crate::wait::{PollBudget, WaitError, wait_for};
use crate::{Request, SlaveAddress};
use embedded_hal::i2c::{
    Error, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
};
use log::{debug, trace, warn};

/// Step of the protocol, reported with every [`Fault`]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Nothing issued on the bus yet
    Idle,
    /// START requested, waiting for SB
    Start,
    /// Address with the write bit stored, waiting for ADDR
    AddressWriteSent,
    /// Write address acknowledged, ADDR still set
    AddressWriteMatched,
    /// Data byte stored, waiting for TXE
    ByteSent,
    /// Byte moved to the shift register; after the last byte, waiting for BTF
    ByteQueued,
    /// Last byte of a write run is on the wire
    ByteLatched,
    /// Repeated START requested, waiting for SB
    RepeatedStart,
    /// Address with the read bit stored, waiting for ADDR
    AddressReadSent,
    /// Read address acknowledged, ADDR still set
    AddressReadMatched,
    /// ACK enabled, waiting for RXNE of a byte that is not the last
    Receiving,
    /// ACK cleared ahead of the final byte
    AckDisabled,
    /// STOP queued behind the final byte, waiting for RXNE
    StopQueued,
    /// Repeated START queued behind the final byte of a read run, waiting for RXNE
    RestartQueued,
    /// Final byte of a read run is in DR
    DataReady,
    Done,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// SB never set
    StartTimeout,
    /// ADDR never set; AF ends the wait early when the slave NACKs
    AddressNackOrTimeout,
    TxeTimeout,
    BtfTimeout,
    RxneTimeout,
    /// The slave NACKed a data byte
    DataNack,
    /// The address does not fit in 7 bits
    InvalidAddress,
}

/// A failed transaction
///
/// By the time this is returned a STOP has been requested and ACK is enabled
/// again, so the whole transaction may simply be retried.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fault {
    pub kind: FaultKind,
    pub phase: Phase,
}

impl Error for Fault {
    fn kind(&self) -> ErrorKind {
        match self.kind {
            FaultKind::AddressNackOrTimeout => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            FaultKind::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            FaultKind::StartTimeout
            | FaultKind::TxeTimeout
            | FaultKind::BtfTimeout
            | FaultKind::RxneTimeout
            | FaultKind::InvalidAddress => ErrorKind::Other,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Direction {
    Write,
    Read,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Idle(Direction),
    Start(Direction),
    AddressWriteSent,
    AddressWriteMatched,
    ByteSent,
    ByteQueued,
    ByteLatched,
    RepeatedStart(Direction),
    AddressReadSent,
    AddressReadMatched,
    Receiving,
    AckDisabled,
    StopQueued,
    RestartQueued,
    DataReady,
    Done,
}

impl State {
    const fn phase(self) -> Phase {
        match self {
            State::Idle(_) => Phase::Idle,
            State::Start(_) => Phase::Start,
            State::AddressWriteSent => Phase::AddressWriteSent,
            State::AddressWriteMatched => Phase::AddressWriteMatched,
            State::ByteSent => Phase::ByteSent,
            State::ByteQueued => Phase::ByteQueued,
            State::ByteLatched => Phase::ByteLatched,
            State::RepeatedStart(_) => Phase::RepeatedStart,
            State::AddressReadSent => Phase::AddressReadSent,
            State::AddressReadMatched => Phase::AddressReadMatched,
            State::Receiving => Phase::Receiving,
            State::AckDisabled => Phase::AckDisabled,
            State::StopQueued => Phase::StopQueued,
            State::RestartQueued => Phase::RestartQueued,
            State::DataReady => Phase::DataReady,
            State::Done => Phase::Done,
        }
    }
}

fn direction_of(op: &Operation<'_>) -> Option<Direction> {
    match op {
        Operation::Write(_) => Some(Direction::Write),
        Operation::Read([]) => None,
        Operation::Read(_) => Some(Direction::Read),
    }
}

fn len_of(op: &Operation<'_>) -> usize {
    match op {
        Operation::Write(bytes) => bytes.len(),
        Operation::Read(buf) => buf.len(),
    }
}

/// Cursor over an operation list, one run at a time
struct Plan<'o, 'b> {
    ops: &'o mut [Operation<'b>],
    run: Option<Direction>,
    op: usize,
    pos: usize,
}

impl<'o, 'b> Plan<'o, 'b> {
    fn new(ops: &'o mut [Operation<'b>]) -> Self {
        let run = ops.iter().find_map(direction_of);
        Self {
            ops,
            run,
            op: 0,
            pos: 0,
        }
    }

    /// Index of the first operation past the current run.
    fn run_end(&self) -> usize {
        self.ops
            .iter()
            .enumerate()
            .skip(self.op)
            .find(|(_, op)| direction_of(op).is_some_and(|d| Some(d) != self.run))
            .map_or(self.ops.len(), |(index, _)| index)
    }

    /// Bytes of the current run not yet sent or received.
    fn run_remaining(&self) -> usize {
        let total: usize = self.ops[self.op..self.run_end()].iter().map(len_of).sum();
        total - self.pos
    }

    fn next_direction(&self) -> Option<Direction> {
        self.ops[self.run_end()..].iter().find_map(direction_of)
    }

    fn next_write(&mut self) -> Option<u8> {
        let end = self.run_end();
        while self.op < end {
            if let Operation::Write(bytes) = &self.ops[self.op]
                && let Some(&byte) = bytes.get(self.pos)
            {
                self.pos += 1;
                return Some(byte);
            }
            self.op += 1;
            self.pos = 0;
        }
        None
    }

    fn store(&mut self, byte: u8) {
        let end = self.run_end();
        while self.op < end {
            if let Operation::Read(buf) = &mut self.ops[self.op]
                && let Some(slot) = buf.get_mut(self.pos)
            {
                *slot = byte;
                self.pos += 1;
                return;
            }
            self.op += 1;
            self.pos = 0;
        }
    }

    /// Move to the next run and return its direction.
    fn finish_run(&mut self) -> Option<Direction> {
        self.op = self.run_end();
        self.pos = 0;
        self.run = self.ops[self.op..].iter().find_map(direction_of);
        self.run
    }
}

/// Polled I2C master owning the peripheral registers
///
/// Every transaction borrows the master mutably, so at most one is ever in
/// flight on the bus.
pub struct I2cMaster<R> {
    regs: R,
    budget: PollBudget,
}

impl<R: Setup> I2cMaster<R> {
    /// Program bus timing and enable the peripheral.
    ///
    /// The poll budget is sized for `config.scl_hz`; override it with
    /// [`I2cMaster::with_budget`] when the core clock is far from 180 MHz.
    pub fn configure(mut regs: R, config: &BusConfig) -> Result<Self, ConfigError> {
        let timing = config.timing()?;

        regs.set_enabled(false);
        regs.write_frequency(timing.freq_mhz);
        regs.write_clock_control(timing.ccr);
        regs.write_rise_time(timing.trise);
        regs.set_enabled(true);
        // ACK is held cleared by hardware while PE is off
        regs.set_ack(true);

        debug!(
            "i2c enabled: FREQ={} CCR={:#06x} TRISE={}",
            timing.freq_mhz, timing.ccr, timing.trise
        );
        Ok(Self::new(regs).with_budget(PollBudget::for_scl(config.scl_hz)))
    }
}

impl<R: Registers> I2cMaster<R> {
    /// Take over a peripheral that is already configured and enabled.
    pub const fn new(regs: R) -> Self {
        Self {
            regs,
            budget: PollBudget::DEFAULT,
        }
    }

    #[must_use]
    pub const fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    pub const fn budget(&self) -> PollBudget {
        self.budget
    }

    pub const fn registers(&self) -> &R {
        &self.regs
    }

    pub fn release(self) -> R {
        self.regs
    }

    /// Read `N` bytes starting at `request.register`.
    pub fn read_register<const N: usize>(&mut self, request: Request) -> Result<[u8; N], Fault> {
        let mut buf = [0; N];
        self.read_register_into(request, &mut buf)?;
        Ok(buf)
    }

    /// Read `buf.len()` bytes starting at `request.register`.
    pub fn read_register_into(&mut self, request: Request, buf: &mut [u8]) -> Result<(), Fault> {
        let pointer = [request.register];
        self.transfer(
            request.address,
            &mut [Operation::Write(&pointer), Operation::Read(buf)],
        )
    }

    /// Run `operations` as one transaction.
    pub fn transfer(
        &mut self,
        address: SlaveAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Fault> {
        let mut plan = Plan::new(operations);
        let Some(first) = plan.run else {
            return Ok(());
        };

        match self.drive(address, first, &mut plan) {
            Ok(()) => {
                self.regs.set_ack(true);
                debug!("i2c {:#04x}: transaction complete", address.get());
                Ok(())
            }
            Err(fault) => {
                warn!(
                    "i2c {:#04x}: {:?} in {:?}, releasing bus",
                    address.get(),
                    fault.kind,
                    fault.phase
                );
                self.recover();
                Err(fault)
            }
        }
    }

    fn drive(
        &mut self,
        address: SlaveAddress,
        first: Direction,
        plan: &mut Plan<'_, '_>,
    ) -> Result<(), Fault> {
        let mut state = State::Idle(first);

        loop {
            trace!("i2c {:#04x}: {:?}", address.get(), state);

            state = match state {
                State::Idle(direction) => {
                    self.regs.generate_start();
                    State::Start(direction)
                }
                State::Start(direction) | State::RepeatedStart(direction) => {
                    self.wait(state, Flag::StartGenerated, FaultKind::StartTimeout)?;
                    match direction {
                        Direction::Write => {
                            self.regs.write_data(address.write_byte());
                            State::AddressWriteSent
                        }
                        Direction::Read => {
                            self.regs.write_data(address.read_byte());
                            State::AddressReadSent
                        }
                    }
                }
                State::AddressWriteSent => {
                    self.wait(state, Flag::AddressSent, FaultKind::AddressNackOrTimeout)?;
                    State::AddressWriteMatched
                }
                State::AddressWriteMatched => {
                    AddressMatched::new(&mut self.regs).clear();
                    match plan.next_write() {
                        Some(byte) => {
                            self.regs.write_data(byte);
                            State::ByteSent
                        }
                        // Address-only write, nothing left to drain
                        None => State::ByteLatched,
                    }
                }
                State::ByteSent => {
                    self.wait(state, Flag::TxEmpty, FaultKind::TxeTimeout)?;
                    State::ByteQueued
                }
                State::ByteQueued => match plan.next_write() {
                    Some(byte) => {
                        self.regs.write_data(byte);
                        State::ByteSent
                    }
                    None => {
                        // TXE only means DR is free; the shift register may still
                        // be clocking the byte out
                        self.wait(state, Flag::ByteTransferFinished, FaultKind::BtfTimeout)?;
                        State::ByteLatched
                    }
                },
                State::ByteLatched => match plan.finish_run() {
                    Some(next) => {
                        self.regs.generate_start();
                        State::RepeatedStart(next)
                    }
                    None => {
                        self.regs.generate_stop();
                        State::Done
                    }
                },
                State::AddressReadSent => {
                    self.wait(state, Flag::AddressSent, FaultKind::AddressNackOrTimeout)?;
                    State::AddressReadMatched
                }
                State::AddressReadMatched => {
                    if plan.run_remaining() == 1 {
                        AddressMatched::new(&mut self.regs).disable_ack_then_clear();
                        State::AckDisabled
                    } else {
                        self.regs.set_ack(true);
                        AddressMatched::new(&mut self.regs).clear();
                        State::Receiving
                    }
                }
                State::Receiving => {
                    if plan.run_remaining() == 1 {
                        self.regs.set_ack(false);
                        State::AckDisabled
                    } else {
                        self.wait(state, Flag::RxNotEmpty, FaultKind::RxneTimeout)?;
                        plan.store(self.regs.read_data());
                        State::Receiving
                    }
                }
                State::AckDisabled => {
                    // Queued now so the hardware appends it right after the final byte
                    if plan.next_direction().is_some() {
                        self.regs.generate_start();
                        State::RestartQueued
                    } else {
                        self.regs.generate_stop();
                        State::StopQueued
                    }
                }
                State::StopQueued | State::RestartQueued => {
                    self.wait(state, Flag::RxNotEmpty, FaultKind::RxneTimeout)?;
                    State::DataReady
                }
                State::DataReady => {
                    plan.store(self.regs.read_data());
                    match plan.finish_run() {
                        Some(next) => State::RepeatedStart(next),
                        None => State::Done,
                    }
                }
                State::Done => return Ok(()),
            };
        }
    }

    fn wait(&mut self, state: State, flag: Flag, kind: FaultKind) -> Result<(), Fault> {
        match wait_for(&mut self.regs, self.budget, flag) {
            Ok(_) => Ok(()),
            Err(WaitError::Nacked) if kind != FaultKind::AddressNackOrTimeout => Err(Fault {
                kind: FaultKind::DataNack,
                phase: state.phase(),
            }),
            Err(_) => Err(Fault {
                kind,
                phase: state.phase(),
            }),
        }
    }

    /// Leave the bus idle: STOP, ACK back on, no stale AF.
    fn recover(&mut self) {
        self.regs.generate_stop();
        self.regs.set_ack(true);
        self.regs.clear_acknowledge_failure();
    }
}

impl<R: Registers> ErrorType for I2cMaster<R> {
    type Error = Fault;
}

impl<R: Registers> I2c<SevenBitAddress> for I2cMaster<R> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let address = SlaveAddress::try_from(address)?;
        self.transfer(address, operations)
    }
}
