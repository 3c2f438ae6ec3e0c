//! STM32F4 I2C register block accessed through volatile loads and stores

use crate::regs::{Flag, Registers, Setup, Status};
use core::ptr::{read_volatile, write_volatile};

const CR1: usize = 0x00;
const CR2: usize = 0x04;
const DR: usize = 0x10;
const SR1: usize = 0x14;
const SR2: usize = 0x18;
const CCR: usize = 0x1C;
const TRISE: usize = 0x20;

const CR1_PE: u32 = 1 << 0;
const CR1_START: u32 = 1 << 8;
const CR1_STOP: u32 = 1 << 9;
const CR1_ACK: u32 = 1 << 10;
const CR2_FREQ: u32 = 0x3F;
const TRISE_MASK: u32 = 0x3F;

pub struct Mmio {
    base: *mut u32,
}

impl Mmio {
    pub const I2C1: *mut u32 = 0x4000_5400 as *mut u32;
    pub const I2C2: *mut u32 = 0x4000_5800 as *mut u32;
    pub const I2C3: *mut u32 = 0x4000_5C00 as *mut u32;

    /// # Safety
    ///
    /// `base` must point to an I2C register block (or memory laid out like one)
    /// that nothing else accesses while the returned value is alive.
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: offsets are within the block handed to `new`
        unsafe { read_volatile(self.base.byte_add(offset)) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: offsets are within the block handed to `new`
        unsafe { write_volatile(self.base.byte_add(offset), value) }
    }

    fn modify(&mut self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.read(offset);
        self.write(offset, f(value));
    }

    fn set_bits(&mut self, offset: usize, bits: u32, set: bool) {
        let value = self.read(offset);
        let value = if set { value | bits } else { value & !bits };
        self.write(offset, value);
    }
}

impl Registers for Mmio {
    fn generate_start(&mut self) {
        self.set_bits(CR1, CR1_START, true);
    }

    fn generate_stop(&mut self) {
        self.set_bits(CR1, CR1_STOP, true);
    }

    fn set_ack(&mut self, enabled: bool) {
        self.set_bits(CR1, CR1_ACK, enabled);
    }

    fn read_status1(&mut self) -> Status {
        Status::from_bits(self.read(SR1) as u16)
    }

    fn read_status2(&mut self) -> u16 {
        self.read(SR2) as u16
    }

    fn write_data(&mut self, byte: u8) {
        self.write(DR, byte.into());
    }

    fn read_data(&mut self) -> u8 {
        self.read(DR) as u8
    }

    fn clear_acknowledge_failure(&mut self) {
        // rc_w0: ones leave the other flags alone
        let keep = 0xFFFF & !u32::from(Flag::AcknowledgeFailure.mask());
        self.write(SR1, keep);
    }
}

impl Setup for Mmio {
    fn set_enabled(&mut self, enabled: bool) {
        self.set_bits(CR1, CR1_PE, enabled);
    }

    fn write_frequency(&mut self, mhz: u8) {
        let freq = u32::from(mhz) & CR2_FREQ;
        self.modify(CR2, |value| (value & !CR2_FREQ) | freq);
    }

    fn write_clock_control(&mut self, ccr: u16) {
        self.write(CCR, ccr.into());
    }

    fn write_rise_time(&mut self, trise: u8) {
        self.write(TRISE, u32::from(trise) & TRISE_MASK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusConfig, I2cMaster};

    const WORDS: usize = 10;

    fn word(offset: usize) -> usize {
        offset / 4
    }

    #[test]
    fn control_bits_are_modified_in_place() {
        let mut block = [0u32; WORDS];
        block[word(CR1)] = CR1_PE;

        let mut regs = unsafe { Mmio::new(block.as_mut_ptr()) };
        regs.set_ack(true);
        regs.generate_start();
        regs.generate_stop();
        regs.set_ack(false);

        assert_eq!(block[word(CR1)], CR1_PE | CR1_START | CR1_STOP);
    }

    #[test]
    fn data_register_is_stored_whole() {
        let mut block = [0u32; WORDS];
        block[word(DR)] = 0xFF;

        let mut regs = unsafe { Mmio::new(block.as_mut_ptr()) };
        regs.write_data(0xEC);
        assert_eq!(regs.read_data(), 0xEC);
    }

    #[test]
    fn status_reads() {
        let mut block = [0u32; WORDS];
        block[word(SR1)] = 0x0402;
        block[word(SR2)] = 0x0003;

        let mut regs = unsafe { Mmio::new(block.as_mut_ptr()) };
        let status = regs.read_status1();
        assert!(status.is_set(Flag::AddressSent));
        assert!(status.is_set(Flag::AcknowledgeFailure));
        assert_eq!(regs.read_status2(), 0x0003);

        regs.clear_acknowledge_failure();
        assert_eq!(block[word(SR1)], 0xFBFF);
    }

    #[test]
    fn configure_programs_timing() {
        let mut block = [0u32; WORDS];
        block[word(CR2)] = 0x0700;

        let regs = unsafe { Mmio::new(block.as_mut_ptr()) };
        let _bus = I2cMaster::configure(regs, &BusConfig::default()).unwrap();

        assert_eq!(block[word(CR2)], 0x0700 | 16);
        assert_eq!(block[word(CCR)], 80);
        assert_eq!(block[word(TRISE)], 17);
        assert_eq!(block[word(CR1)], CR1_PE | CR1_ACK);
    }
}
