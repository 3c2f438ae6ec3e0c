use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

pub mod driver;

use driver::{Bmp280, Error};

/// Address with SDO tied to ground
pub const PRIMARY_ADDRESS: SevenBitAddress = 0x76;
/// Address with SDO tied to VDDIO
pub const SECONDARY_ADDRESS: SevenBitAddress = 0x77;

pub const CHIP_ID_REGISTER: u8 = 0xD0;
pub const CHIP_ID: u8 = 0x58;

/// Outcome counts of a [`monitor`] run
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Tally {
    pub polls: u32,
    pub verified: u32,
    pub unexpected: u32,
    pub failed: u32,
}

/// Read the chip id every `period_ms` until `stop` is set.
///
/// Failures are counted and logged, never fatal: the engine has already left
/// the bus idle, so the next poll starts clean.
pub fn monitor<I: I2c>(
    sensor: &mut Bmp280<I>,
    delay: &mut impl DelayNs,
    period_ms: u32,
    stop: &AtomicBool,
) -> Tally {
    let mut tally = Tally::default();

    while !stop.load(Ordering::Relaxed) {
        tally.polls += 1;
        match sensor.verify() {
            Ok(()) => {
                tally.verified += 1;
                info!("poll {}: chip id {:#04x}", tally.polls, CHIP_ID);
            }
            Err(Error::UnexpectedChipId(id)) => {
                tally.unexpected += 1;
                warn!("poll {}: unexpected chip id {:#04x}", tally.polls, id);
            }
            Err(Error::I2c(e)) => {
                tally.failed += 1;
                warn!("poll {}: {:?}", tally.polls, e);
            }
        }
        delay.delay_ms(period_ms);
    }

    info!(
        "monitor stopped after {} polls, {} failed",
        tally.polls, tally.failed
    );
    tally
}
