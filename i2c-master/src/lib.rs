#![no_std]

//! Blocking, polled I2C master for the STM32F4 I2C peripheral.
//!
//! The engine drives the peripheral purely through status-flag polling: every
//! wait is bounded by a [`PollBudget`] and a failed wait leaves the bus with a
//! STOP requested and ACK re-enabled, so the next call starts from idle.
//!
//! ```rust,ignore
//! use i2c_master::{BusConfig, I2cMaster, Mmio, Request, SlaveAddress};
//!
//! let regs = unsafe { Mmio::new(Mmio::I2C1) };
//! let mut bus = I2cMaster::configure(regs, &BusConfig::default()).unwrap();
//!
//! let bmp280 = SlaveAddress::new(0x76).unwrap();
//! let [id] = bus.read_register::<1>(Request::new(bmp280, 0xD0)).unwrap();
//! ```

pub use embedded_hal::i2c::{
    Error, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
};

pub use config::{BusConfig, ConfigError, DutyCycle, Timing};
pub use engine::{Fault, FaultKind, I2cMaster, Phase};
pub use mmio::Mmio;
pub use regs::{AddressMatched, Flag, Registers, Setup, Status};
pub use wait::{PollBudget, WaitError, poll, wait_for};

pub mod config;
pub mod engine;
pub mod mmio;
pub mod regs;
pub mod wait;

/// A 7-bit I2C slave address
///
/// The read/write bit only exists on the wire; see [`SlaveAddress::write_byte`]
/// and [`SlaveAddress::read_byte`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveAddress(u8);

impl SlaveAddress {
    /// Largest address representable in 7 bits
    pub const MAX: u8 = 0x7F;

    /// Returns `None` when `address` does not fit in 7 bits.
    pub const fn new(address: u8) -> Option<Self> {
        if address <= Self::MAX {
            Some(Self(address))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Address byte with the direction bit cleared (master transmits).
    pub const fn write_byte(self) -> u8 {
        self.0 << 1
    }

    /// Address byte with the direction bit set (master receives).
    pub const fn read_byte(self) -> u8 {
        (self.0 << 1) | 1
    }
}

impl TryFrom<SevenBitAddress> for SlaveAddress {
    type Error = Fault;

    fn try_from(value: SevenBitAddress) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(Fault {
            kind: FaultKind::InvalidAddress,
            phase: Phase::Idle,
        })
    }
}

impl From<SlaveAddress> for SevenBitAddress {
    fn from(value: SlaveAddress) -> Self {
        value.0
    }
}

/// Read of a register on a register-addressed slave
///
/// The register pointer is written in one transfer, the data is read back after
/// a repeated START. The read length is given by the caller's buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request {
    pub address: SlaveAddress,
    pub register: u8,
}

impl Request {
    pub const fn new(address: SlaveAddress, register: u8) -> Self {
        Self { address, register }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_bytes_carry_direction() {
        let address = SlaveAddress::new(0x76).unwrap();
        assert_eq!(address.write_byte(), 0xEC);
        assert_eq!(address.read_byte(), 0xED);
        assert_eq!(address.get(), 0x76);
        assert_eq!(SevenBitAddress::from(address), 0x76);
    }

    #[test]
    fn eight_bit_addresses_are_rejected() {
        assert_eq!(SlaveAddress::new(0x80), None);
        assert!(SlaveAddress::new(SlaveAddress::MAX).is_some());

        let err = SlaveAddress::try_from(0xEC_u8).unwrap_err();
        assert_eq!(err.kind, FaultKind::InvalidAddress);
        assert_eq!(err.phase, Phase::Idle);
    }
}
