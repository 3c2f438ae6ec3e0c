use crate::{CHIP_ID, CHIP_ID_REGISTER};
use embedded_hal::i2c::{I2c, SevenBitAddress};
use log::{debug, warn};

pub struct Bmp280<I> {
    i2c: I,
    address: SevenBitAddress,
}

impl<I: I2c> Bmp280<I> {
    pub const fn new(i2c: I, address: SevenBitAddress) -> Bmp280<I> {
        Bmp280 { i2c, address }
    }

    pub const fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Read consecutive registers starting at `register`.
    pub fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), Error<I::Error>> {
        self.i2c.write_read(self.address, &[register], buf)?;
        Ok(())
    }

    pub fn chip_id(&mut self) -> Result<u8, Error<I::Error>> {
        let mut id = [0];
        self.read_registers(CHIP_ID_REGISTER, &mut id)?;
        Ok(id[0])
    }

    /// Read the chip id and check that the device really is a BMP280.
    pub fn verify(&mut self) -> Result<(), Error<I::Error>> {
        match self.chip_id()? {
            CHIP_ID => Ok(()),
            other => Err(Error::UnexpectedChipId(other)),
        }
    }

    /// Read the chip id, retrying bus errors up to `attempts` times in total.
    ///
    /// An unexpected id is a valid answer and is returned without retrying.
    pub fn chip_id_with_retries(&mut self, attempts: usize) -> Result<u8, Error<I::Error>> {
        let mut attempt = 1;
        loop {
            match self.chip_id() {
                Ok(id) => {
                    debug!("chip id {id:#04x} after {attempt} attempt(s)");
                    return Ok(id);
                }
                Err(e) if attempt < attempts => {
                    warn!("chip id read {attempt}/{attempts} failed: {e:?}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<I2cErr> {
    I2c(I2cErr),
    UnexpectedChipId(u8),
}

impl<I2cErr> From<I2cErr> for Error<I2cErr> {
    fn from(value: I2cErr) -> Self {
        Self::I2c(value)
    }
}
