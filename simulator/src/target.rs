//! Implementation of the slave half of the simulator

#[cfg(doc)]
use crate::peripheral::SimPeripheral;

/// What the simulated slave observed on the bus
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BusEvent {
    /// START or repeated START
    Start,
    /// An address byte for this slave, `read` being the direction bit
    Address {
        /// Master wants to receive
        read: bool,
    },
    /// Byte written by the master and acknowledged by the slave
    Written(u8),
    /// Byte written by the master and refused by the slave
    Refused(u8),
    /// Byte sent to the master, with the master's answer
    Read {
        /// The byte on the wire
        byte: u8,
        /// Whether the master acknowledged it
        acked: bool,
    },
    /// STOP while the master owned the bus
    Stop,
}

/// Simulated register-addressed slave
///
/// Behaves like the common sensor convention: the first byte of a write sets
/// the register pointer, further bytes are stored at the pointer, and reads
/// return bytes from the pointer. The pointer auto-increments and wraps.
///
/// Attach it to a [`SimPeripheral`] to put it on the bus.
#[derive(Debug, Clone)]
pub struct SimTarget {
    address: u8,
    registers: [u8; 256],
    pointer: u8,
    expect_pointer: bool,
    nack_address: bool,
    nack_data: bool,
    events: Vec<BusEvent>,
}

impl SimTarget {
    /// Slave answering to the 7-bit `address`, all registers zero
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: [0; 256],
            pointer: 0,
            expect_pointer: false,
            nack_address: false,
            nack_data: false,
            events: Vec::new(),
        }
    }

    /// Preset one register
    #[must_use]
    pub fn with_register(mut self, register: u8, value: u8) -> Self {
        self.registers[usize::from(register)] = value;
        self
    }

    /// Preset consecutive registers starting at `start`
    #[must_use]
    pub fn with_registers(mut self, start: u8, values: &[u8]) -> Self {
        for (offset, &value) in values.iter().enumerate() {
            let register = usize::from(start).wrapping_add(offset) % self.registers.len();
            self.registers[register] = value;
        }
        self
    }

    /// Refuse the address byte, as an absent or busy device does
    #[must_use]
    pub fn nacking_address(mut self) -> Self {
        self.nack_address = true;
        self
    }

    /// Acknowledge the address but refuse every data byte
    #[must_use]
    pub fn nacking_data(mut self) -> Self {
        self.nack_data = true;
        self
    }

    /// The 7-bit address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current content of a register
    pub fn register(&self, register: u8) -> u8 {
        self.registers[usize::from(register)]
    }

    /// Everything observed on the bus so far
    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    /// Number of bytes the slave clocked out to the master
    pub fn bytes_served(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, BusEvent::Read { .. }))
            .count()
    }

    pub(crate) fn start(&mut self) {
        self.events.push(BusEvent::Start);
    }

    /// Returns whether the address byte is acknowledged.
    pub(crate) fn select(&mut self, byte: u8) -> bool {
        if byte >> 1 != self.address || self.nack_address {
            return false;
        }

        let read = byte & 1 == 1;
        self.events.push(BusEvent::Address { read });
        self.expect_pointer = !read;
        true
    }

    /// Returns whether the data byte is acknowledged.
    pub(crate) fn write(&mut self, byte: u8) -> bool {
        if self.nack_data {
            self.events.push(BusEvent::Refused(byte));
            return false;
        }

        if self.expect_pointer {
            self.pointer = byte;
            self.expect_pointer = false;
        } else {
            self.registers[usize::from(self.pointer)] = byte;
            self.pointer = self.pointer.wrapping_add(1);
        }
        self.events.push(BusEvent::Written(byte));
        true
    }

    pub(crate) fn read(&mut self) -> u8 {
        let byte = self.registers[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        byte
    }

    pub(crate) fn acknowledge(&mut self, byte: u8, acked: bool) {
        self.events.push(BusEvent::Read { byte, acked });
    }

    pub(crate) fn stop(&mut self) {
        self.events.push(BusEvent::Stop);
    }
}
