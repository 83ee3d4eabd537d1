use i2c_linux::I2c;
use std::fs::File;
use std::path::Path;
use std::{thread, time};

pub fn get_bus(bus_path: &Path) -> Result<I2c<File>, std::io::Error> {
    I2c::from_path(bus_path)
}

pub fn set_slave(i2c: &mut I2c<File>, dev_addr: u16) -> Result<(), std::io::Error> {
    i2c.smbus_set_slave_address(dev_addr, false)
}

pub fn read_block(i2c: &mut I2c<File>, register: u8, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    i2c.i2c_read_block_data(register, buf)
}

pub fn read_word(i2c: &mut I2c<File>, register: u8) -> Result<u16, std::io::Error> {
    i2c.smbus_read_word_data(register)
}

pub fn write_byte(i2c: &mut I2c<File>, register: u8, data: u8) -> Result<(), std::io::Error> {
    i2c.smbus_write_byte_data(register, data)
}

/// The sensor sends register pairs MSB first while the SMBus word read
/// returns the low byte first, so every word read goes through this swap.
pub fn swap_word(raw: u16) -> u16 {
    ((raw & 0x00ff) << 8) | ((raw & 0xff00) >> 8)
}

pub fn delay(milli_secs: u32) {
    let delay = time::Duration::from_millis(milli_secs as u64);
    thread::sleep(delay);
}

#[cfg(test)]
mod tests {
    use super::swap_word;

    #[test]
    fn swap_word_swaps_bytes() {
        assert_eq!(swap_word(0x1234), 0x3412);
        assert_eq!(swap_word(0x00ff), 0xff00);
        assert_eq!(swap_word(0x8000), 0x0080);
    }

    #[test]
    fn swap_word_is_its_own_inverse() {
        for raw in [0x0000u16, 0x0001, 0x00ff, 0x6c00, 0x1234, 0xabcd, 0xffff] {
            assert_eq!(swap_word(swap_word(raw)), raw);
        }
    }
}
