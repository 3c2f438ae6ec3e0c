//! Bus timing configuration
//!
//! Timing fields may only be written while the peripheral is disabled, so
//! [`I2cMaster::configure`](crate::I2cMaster::configure) clears PE, writes them
//! and enables the peripheral last.

const MHZ: u32 = 1_000_000;

const STANDARD_MODE_MAX_HZ: u32 = 100_000;
const FAST_MODE_MAX_HZ: u32 = 400_000;

/// CCR.F/S: fast mode
const CCR_FAST: u16 = 1 << 15;
/// CCR.DUTY: 16/9 duty cycle in fast mode
const CCR_DUTY: u16 = 1 << 14;
const CCR_MAX: u32 = 0x0FFF;

/// SCL low/high ratio in fast mode
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyCycle {
    #[default]
    Ratio2to1,
    Ratio16to9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// APB1 clock feeding the peripheral, in Hz
    pub pclk1_hz: u32,
    /// SCL frequency in Hz
    pub scl_hz: u32,
    /// Only used above 100 kHz
    pub duty: DutyCycle,
}

impl Default for BusConfig {
    fn default() -> Self {
        // HSI at reset, standard mode
        Self::standard(16 * MHZ)
    }
}

impl BusConfig {
    /// Standard mode (100 kHz)
    pub const fn standard(pclk1_hz: u32) -> Self {
        Self {
            pclk1_hz,
            scl_hz: STANDARD_MODE_MAX_HZ,
            duty: DutyCycle::Ratio2to1,
        }
    }

    /// Fast mode (400 kHz)
    pub const fn fast(pclk1_hz: u32) -> Self {
        Self {
            pclk1_hz,
            scl_hz: FAST_MODE_MAX_HZ,
            duty: DutyCycle::Ratio2to1,
        }
    }

    /// Register values for this configuration.
    pub fn timing(&self) -> Result<Timing, ConfigError> {
        let freq = self.pclk1_hz / MHZ;
        if !(2..=50).contains(&freq) {
            return Err(ConfigError::PeripheralClock(self.pclk1_hz));
        }
        if self.scl_hz == 0 || self.scl_hz > FAST_MODE_MAX_HZ {
            return Err(ConfigError::BusFrequency(self.scl_hz));
        }

        let (ccr, mode_bits, trise) = if self.scl_hz <= STANDARD_MODE_MAX_HZ {
            let ccr = (self.pclk1_hz / (2 * self.scl_hz)).max(4);
            (ccr, 0, freq + 1)
        } else {
            let (divider, duty_bit) = match self.duty {
                DutyCycle::Ratio2to1 => (3, 0),
                DutyCycle::Ratio16to9 => (25, CCR_DUTY),
            };
            let ccr = (self.pclk1_hz / (divider * self.scl_hz)).max(1);
            (ccr, CCR_FAST | duty_bit, freq * 300 / 1000 + 1)
        };

        // SCL too slow for the 12-bit divider at this clock
        if ccr > CCR_MAX {
            return Err(ConfigError::BusFrequency(self.scl_hz));
        }

        let timing = Timing {
            freq_mhz: freq as u8,
            ccr: mode_bits | ccr as u16,
            trise: trise as u8,
        };
        Ok(timing)
    }
}

/// Values for CR2.FREQ, CCR and TRISE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    pub freq_mhz: u8,
    pub ccr: u16,
    pub trise: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// PCLK1 outside the 2..=50 MHz the peripheral accepts
    PeripheralClock(u32),
    /// SCL above fast mode, zero, or too slow for the CCR divider
    BusFrequency(u32),
}
