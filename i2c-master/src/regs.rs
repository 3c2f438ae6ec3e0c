//! Register capabilities of the I2C peripheral
//!
//! Each method is one hardware access. Implementations must not merge or
//! reorder them: the order in which the engine calls these is the protocol.

/// Status register 1 flags the engine waits on
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flag {
    /// SB: start condition generated
    StartGenerated,
    /// ADDR: address sent and acknowledged
    AddressSent,
    /// BTF: byte transfer finished
    ByteTransferFinished,
    /// RXNE: data register not empty
    RxNotEmpty,
    /// TXE: data register empty
    TxEmpty,
    /// AF: acknowledge failure
    AcknowledgeFailure,
}

impl Flag {
    pub const fn mask(self) -> u16 {
        match self {
            Flag::StartGenerated => 1 << 0,
            Flag::AddressSent => 1 << 1,
            Flag::ByteTransferFinished => 1 << 2,
            Flag::RxNotEmpty => 1 << 6,
            Flag::TxEmpty => 1 << 7,
            Flag::AcknowledgeFailure => 1 << 10,
        }
    }
}

/// Snapshot of status register 1
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(u16);

impl Status {
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_set(self, flag: Flag) -> bool {
        self.0 & flag.mask() != 0
    }

    #[must_use]
    pub const fn with(self, flag: Flag) -> Self {
        Self(self.0 | flag.mask())
    }

    #[must_use]
    pub const fn without(self, flag: Flag) -> Self {
        Self(self.0 & !flag.mask())
    }
}

/// Accesses the transaction engine needs
pub trait Registers {
    /// Set CR1.START. Generates a repeated start when the bus is already ours.
    fn generate_start(&mut self);

    /// Set CR1.STOP. Takes effect after the byte currently on the wire.
    fn generate_stop(&mut self);

    /// Write CR1.ACK.
    fn set_ack(&mut self, enabled: bool);

    fn read_status1(&mut self) -> Status;

    /// Only read for its side effect of clearing ADDR after an SR1 read.
    fn read_status2(&mut self) -> u16;

    /// Store one byte into DR. A store while idle starts a transmission, so
    /// this is a plain write and never a read-modify-write.
    fn write_data(&mut self, byte: u8);

    fn read_data(&mut self) -> u8;

    /// Clear SR1.AF.
    fn clear_acknowledge_failure(&mut self);
}

/// Accesses the bus configurator needs on top of [`Registers`]
pub trait Setup: Registers {
    /// Write CR1.PE.
    fn set_enabled(&mut self, enabled: bool);

    /// Write CR2.FREQ, the peripheral clock in MHz.
    fn write_frequency(&mut self, mhz: u8);

    /// Write CCR including the F/S and DUTY bits.
    fn write_clock_control(&mut self, ccr: u16);

    /// Write TRISE.
    fn write_rise_time(&mut self, trise: u8);
}

/// ADDR is set and has not been cleared yet
///
/// Only obtainable from a successful address wait. Consuming it performs the
/// SR1-then-SR2 read that releases SCL, with or without clearing ACK first.
#[must_use = "ADDR stays set and SCL stays stretched until the token is consumed"]
pub struct AddressMatched<'a, R: Registers> {
    regs: &'a mut R,
}

impl<'a, R: Registers> AddressMatched<'a, R> {
    pub(crate) fn new(regs: &'a mut R) -> Self {
        Self { regs }
    }

    pub fn clear(self) {
        let _ = self.regs.read_status1();
        let _ = self.regs.read_status2();
    }

    /// The byte received next is NACKed: ACK is cleared while ADDR still holds
    /// the bus, then ADDR is cleared.
    pub fn disable_ack_then_clear(self) {
        self.regs.set_ack(false);
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags() {
        let status = Status::default()
            .with(Flag::StartGenerated)
            .with(Flag::TxEmpty);
        assert_eq!(status.bits(), 0x0081);
        assert!(status.is_set(Flag::StartGenerated));
        assert!(!status.is_set(Flag::AddressSent));

        let status = status.without(Flag::StartGenerated);
        assert_eq!(status, Status::from_bits(0x0080));
    }

    #[derive(Default)]
    struct Trace {
        calls: [&'static str; 4],
        len: usize,
    }

    impl Trace {
        fn push(&mut self, call: &'static str) {
            self.calls[self.len] = call;
            self.len += 1;
        }

        fn calls(&self) -> &[&'static str] {
            &self.calls[..self.len]
        }
    }

    impl Registers for Trace {
        fn generate_start(&mut self) {
            self.push("start");
        }
        fn generate_stop(&mut self) {
            self.push("stop");
        }
        fn set_ack(&mut self, enabled: bool) {
            self.push(if enabled { "ack on" } else { "ack off" });
        }
        fn read_status1(&mut self) -> Status {
            self.push("sr1");
            Status::default()
        }
        fn read_status2(&mut self) -> u16 {
            self.push("sr2");
            0
        }
        fn write_data(&mut self, _byte: u8) {
            self.push("dr <-");
        }
        fn read_data(&mut self) -> u8 {
            self.push("dr ->");
            0
        }
        fn clear_acknowledge_failure(&mut self) {
            self.push("clear af");
        }
    }

    #[test]
    fn address_clear_reads_sr1_then_sr2() {
        let mut regs = Trace::default();
        AddressMatched::new(&mut regs).clear();
        assert_eq!(regs.calls(), ["sr1", "sr2"]);
    }

    #[test]
    fn ack_cleared_before_address() {
        let mut regs = Trace::default();
        AddressMatched::new(&mut regs).disable_ack_then_clear();
        assert_eq!(regs.calls(), ["ack off", "sr1", "sr2"]);
    }
}
