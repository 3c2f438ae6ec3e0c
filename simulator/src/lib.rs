#![warn(missing_docs)]

//! This crate provides a register-level stand-in for the STM32 I2C peripheral
//! that can be run locally, with a register-addressed slave on its bus.
//!
//! # Example
//! ```rust
//! use i2c_master::{BusConfig, Request, SlaveAddress};
//! use simulator::peripheral::SimPeripheral;
//! use simulator::target::{BusEvent, SimTarget};
//! use simulator::simulator;
//!
//! let target = SimTarget::new(0x76).with_register(0xD0, 0x58);
//! let mut bus = simulator(SimPeripheral::new(target), &BusConfig::default()).unwrap();
//!
//! let address = SlaveAddress::new(0x76).unwrap();
//! let id = bus.read_register::<1>(Request::new(address, 0xD0)).unwrap();
//! assert_eq!(id, [0x58]);
//!
//! let events = bus.registers().target().events();
//! assert_eq!(events.first(), Some(&BusEvent::Start));
//! assert_eq!(events.last(), Some(&BusEvent::Stop));
//! ```

use i2c_master::{BusConfig, ConfigError, I2cMaster};
use peripheral::SimPeripheral;

pub mod peripheral;
pub mod target;

/// Configure a master on top of a simulated peripheral
///
/// The returned [`I2cMaster`] implements the `embedded-hal` trait for I2C and
/// exposes the peripheral through [`I2cMaster::registers`].
pub fn simulator(
    peripheral: SimPeripheral,
    config: &BusConfig,
) -> Result<I2cMaster<SimPeripheral>, ConfigError> {
    I2cMaster::configure(peripheral, config)
}
