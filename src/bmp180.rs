use i2c_linux::I2c;
#[allow(unused_imports)]
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::i2cio;

const BMP180_DEV_ADDR: u16 = 0x77;
const BMP180_LEN_CALIB_DATA: usize = 22;
const BMP180_LEN_PRESSURE_DATA: usize = 3;

// -- registers
const BMP180_REG_CALIB_DATA: u8 = 0xaa;
const BMP180_REG_CTRL_MEAS: u8 = 0xf4;
const BMP180_REG_OUT_DATA: u8 = 0xf6;

// -- commands for ctrl_meas
const BMP180_CMD_CONVERT_TEMPERATURE: u8 = 0x2e;
const BMP180_CMD_CONVERT_PRESSURE: u8 = 0x34;

// -- conversion settle times; a temperature conversion takes 4.5 ms, the
// -- pressure delay is a flat worst-case value covering all oss settings
const BMP180_TEMPERATURE_DELAY_MS: u32 = 5;
const BMP180_PRESSURE_DELAY_MS: u32 = 30;

// -- scale height and exponent of the barometric formula
const SEA_LEVEL_SCALE_HEIGHT_M: f64 = 44330.0;
const SEA_LEVEL_EXPONENT: f64 = 5.255;

/// Failure taxonomy of one measurement run. Nothing is retried, every
/// variant aborts the run.
#[derive(Debug, Error)]
pub enum Bmp180Error {
    #[error("failed to open i2c bus device: {0}")]
    Open(#[source] std::io::Error),
    #[error("failed to select i2c slave address: {0}")]
    SelectSlave(#[source] std::io::Error),
    #[error("register read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("register write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("short read at register {register:#04x}, got {got} of {expected} bytes")]
    ShortRead {
        register: u8,
        expected: usize,
        got: usize,
    },
    #[error("calibration data read failed, got {got} of 22 bytes")]
    CalibrationRead { got: usize },
}

/// Hardware oversampling setting, trades pressure conversion time for noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bmp180OverSampling {
    UltraLowPower,
    Standard,
    HighResolution,
    UltraHighResolution,
}

impl Bmp180OverSampling {
    const BMP180_OSS_ULTRA_LOW_POWER: u8 = 0x00;
    const BMP180_OSS_STANDARD: u8 = 0x01;
    const BMP180_OSS_HIGH_RESOLUTION: u8 = 0x02;
    const BMP180_OSS_ULTRA_HIGH_RESOLUTION: u8 = 0x03;

    fn value(&self) -> u8 {
        match *self {
            Bmp180OverSampling::UltraLowPower => Self::BMP180_OSS_ULTRA_LOW_POWER,
            Bmp180OverSampling::Standard => Self::BMP180_OSS_STANDARD,
            Bmp180OverSampling::HighResolution => Self::BMP180_OSS_HIGH_RESOLUTION,
            Bmp180OverSampling::UltraHighResolution => Self::BMP180_OSS_ULTRA_HIGH_RESOLUTION,
        }
    }
}

impl fmt::Display for Bmp180OverSampling {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Bmp180OverSampling::UltraLowPower => write!(f, "UltraLowPower"),
            Bmp180OverSampling::Standard => write!(f, "Standard"),
            Bmp180OverSampling::HighResolution => write!(f, "HighResolution"),
            Bmp180OverSampling::UltraHighResolution => write!(f, "UltraHighResolution"),
        }
    }
}

/// Run configuration, built once by the CLI layer and handed to the core as
/// plain data.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub temperature: bool,
    pub pressure: bool,
    pub oss: Bmp180OverSampling,
    pub altitude: f64,
}

/// One compensated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// True temperature in tenths of a degree Celsius.
    pub temperature: i32,
    /// True pressure in Pa.
    pub pressure: i32,
    /// Pressure reduced to sea level in hPa, when an altitude was given.
    pub sea_level_pressure: Option<f64>,
}

impl Reading {
    pub fn temperature_celsius(&self) -> f64 {
        self.temperature as f64 / 10.0
    }

    pub fn pressure_hpa(&self) -> f64 {
        self.pressure as f64 / 100.0
    }
}

/// Factory calibration block, 11 big-endian words at register 0xaa.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CalibParams {
    ac1: i16,
    ac2: i16,
    ac3: i16,
    ac4: u16,
    ac5: u16,
    ac6: u16,
    b1: i16,
    b2: i16,
    // -- mb is part of the block but unused by the compensation formulas
    #[allow(dead_code)]
    mb: i16,
    mc: i16,
    md: i16,
}

impl CalibParams {
    fn concat_bytes(msb: u8, lsb: u8) -> u16 {
        ((msb as u16) << 8) | (lsb as u16)
    }

    /// Decodes the raw calibration block, verifying it is complete.
    fn from_block(block: &[u8]) -> Result<CalibParams, Bmp180Error> {
        if block.len() != BMP180_LEN_CALIB_DATA {
            return Err(Bmp180Error::CalibrationRead { got: block.len() });
        }
        Ok(CalibParams {
            ac1: Self::concat_bytes(block[0], block[1]) as i16,
            ac2: Self::concat_bytes(block[2], block[3]) as i16,
            ac3: Self::concat_bytes(block[4], block[5]) as i16,
            ac4: Self::concat_bytes(block[6], block[7]),
            ac5: Self::concat_bytes(block[8], block[9]),
            ac6: Self::concat_bytes(block[10], block[11]),
            b1: Self::concat_bytes(block[12], block[13]) as i16,
            b2: Self::concat_bytes(block[14], block[15]) as i16,
            mb: Self::concat_bytes(block[16], block[17]) as i16,
            mc: Self::concat_bytes(block[18], block[19]) as i16,
            md: Self::concat_bytes(block[20], block[21]) as i16,
        })
    }

    /// Temperature compensation stage. Returns the true temperature in
    /// tenths of a degree Celsius together with the B5 term the pressure
    /// stage needs. All divisions truncate toward zero.
    fn compensate_temperature(&self, ut: i32) -> (i32, i32) {
        let x1 = (ut - self.ac6 as i32) * self.ac5 as i32 / 32768;
        let x2 = self.mc as i32 * 2048 / (x1 + self.md as i32);
        let b5 = x1 + x2;
        let t = (b5 + 8) / 16;
        (t, b5)
    }

    /// Pressure compensation stage, returns the true pressure in Pa.
    /// Takes the B5 term of a preceding temperature stage.
    fn compensate_pressure(&self, b5: i32, up: i32, oss: Bmp180OverSampling) -> i32 {
        let oss = oss.value();
        let b6 = b5 - 4000;
        let x1 = (self.b2 as i32 * (b6 * b6 / 4096)) / 2048;
        let x2 = self.ac2 as i32 * b6 / 2048;
        let x3 = x1 + x2;
        let b3 = (((self.ac1 as i32 * 4 + x3) << oss) + 2) / 4;
        let x1 = self.ac3 as i32 * b6 / 8192;
        let x2 = (self.b1 as i32 * (b6 * b6 / 4096)) / 65536;
        let x3 = ((x1 + x2) + 2) / 4;
        let b4 = (self.ac4 as u32).wrapping_mul((x3 + 32768) as u32) / 32768;
        let b7 = (up as u32)
            .wrapping_sub(b3 as u32)
            .wrapping_mul(50000u32 >> oss);
        // -- the magnitude branch keeps the doubling step inside 32 bits
        let pres = if b7 < 0x8000_0000 {
            ((b7 * 2) / b4) as i32
        } else {
            ((b7 / b4) * 2) as i32
        };
        let x1 = (pres / 256) * (pres / 256);
        let x1 = x1 * 3038 / 65536;
        let x2 = -7357 * pres / 65536;
        pres + (x1 + x2 + 3791) / 16
    }
}

/// Aligns the 3-byte raw pressure readout to the sub-sample precision of the
/// selected oversampling setting.
fn assemble_up(buf: &[u8; BMP180_LEN_PRESSURE_DATA], oss: Bmp180OverSampling) -> i32 {
    (((buf[0] as i32) << 16) | ((buf[1] as i32) << 8) | (buf[2] as i32)) >> (8 - oss.value())
}

/// Barometric reduction of a measured pressure (Pa) to sea level (hPa).
/// Altitude zero means "not requested" and yields no value.
fn reduce_to_sea_level(pressure: i32, altitude: f64) -> Option<f64> {
    if altitude == 0.0 {
        return None;
    }
    let pressure_hpa = pressure as f64 / 100.0;
    Some(pressure_hpa / (1.0 - altitude / SEA_LEVEL_SCALE_HEIGHT_M).powf(SEA_LEVEL_EXPONENT))
}

pub struct BMP180 {
    i2c: I2c<File>,
    calib: CalibParams,
}

impl BMP180 {
    /// Opens the bus device, binds the sensor's slave address, and loads the
    /// factory calibration block. The returned driver owns the bus handle
    /// until it is dropped.
    pub fn new(bus_path: &Path) -> Result<BMP180, Bmp180Error> {
        let mut i2c = i2cio::get_bus(bus_path).map_err(Bmp180Error::Open)?;
        i2cio::set_slave(&mut i2c, BMP180_DEV_ADDR).map_err(Bmp180Error::SelectSlave)?;
        let calib = Self::get_calib_params(&mut i2c)?;
        Ok(BMP180 { i2c, calib })
    }

    fn get_calib_params(i2c: &mut I2c<File>) -> Result<CalibParams, Bmp180Error> {
        let mut block = [0u8; BMP180_LEN_CALIB_DATA];
        let bytes_read =
            i2cio::read_block(i2c, BMP180_REG_CALIB_DATA, &mut block).map_err(Bmp180Error::Read)?;
        let calib = CalibParams::from_block(&block[..bytes_read])?;
        debug!("Got calibration data: {calib:#?}");
        Ok(calib)
    }

    /// Triggers one temperature conversion and returns the raw ADC code.
    fn get_ut(&mut self) -> Result<i32, Bmp180Error> {
        i2cio::write_byte(
            &mut self.i2c,
            BMP180_REG_CTRL_MEAS,
            BMP180_CMD_CONVERT_TEMPERATURE,
        )
        .map_err(Bmp180Error::Write)?;
        i2cio::delay(BMP180_TEMPERATURE_DELAY_MS);
        let raw = i2cio::read_word(&mut self.i2c, BMP180_REG_OUT_DATA).map_err(Bmp180Error::Read)?;
        let ut = i2cio::swap_word(raw) as i32;
        debug!("Got raw temperature: {ut}");
        Ok(ut)
    }

    /// Triggers one pressure conversion at the given oversampling setting
    /// and returns the aligned raw ADC code.
    fn get_up(&mut self, oss: Bmp180OverSampling) -> Result<i32, Bmp180Error> {
        let command = BMP180_CMD_CONVERT_PRESSURE + (oss.value() << 6);
        i2cio::write_byte(&mut self.i2c, BMP180_REG_CTRL_MEAS, command)
            .map_err(Bmp180Error::Write)?;
        i2cio::delay(BMP180_PRESSURE_DELAY_MS);
        let mut buf = [0u8; BMP180_LEN_PRESSURE_DATA];
        let bytes_read = i2cio::read_block(&mut self.i2c, BMP180_REG_OUT_DATA, &mut buf)
            .map_err(Bmp180Error::Read)?;
        if bytes_read != BMP180_LEN_PRESSURE_DATA {
            return Err(Bmp180Error::ShortRead {
                register: BMP180_REG_OUT_DATA,
                expected: BMP180_LEN_PRESSURE_DATA,
                got: bytes_read,
            });
        }
        let up = assemble_up(&buf, oss);
        debug!("Got raw pressure: {up}");
        Ok(up)
    }

    /// Runs one full measurement: temperature first (the pressure stage
    /// needs its B5 term), then pressure, then the optional sea-level
    /// reduction.
    pub fn measure(&mut self, config: &Config) -> Result<Reading, Bmp180Error> {
        let ut = self.get_ut()?;
        let (temperature, b5) = self.calib.compensate_temperature(ut);
        let up = self.get_up(config.oss)?;
        let pressure = self.calib.compensate_pressure(b5, up, config.oss);
        let sea_level_pressure = reduce_to_sea_level(pressure, config.altitude);
        Ok(Reading {
            temperature,
            pressure,
            sea_level_pressure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- constants of the worked example in the sensor datasheet
    fn datasheet_calib() -> CalibParams {
        CalibParams {
            ac1: 408,
            ac2: -72,
            ac3: -14383,
            ac4: 32741,
            ac5: 32757,
            ac6: 23153,
            b1: 6190,
            b2: 4,
            mb: -32768,
            mc: -8711,
            md: 2868,
        }
    }

    fn encode(calib: &CalibParams) -> [u8; BMP180_LEN_CALIB_DATA] {
        let words = [
            calib.ac1 as u16,
            calib.ac2 as u16,
            calib.ac3 as u16,
            calib.ac4,
            calib.ac5,
            calib.ac6,
            calib.b1 as u16,
            calib.b2 as u16,
            calib.mb as u16,
            calib.mc as u16,
            calib.md as u16,
        ];
        let mut block = [0u8; BMP180_LEN_CALIB_DATA];
        for (i, word) in words.iter().enumerate() {
            block[2 * i] = (word >> 8) as u8;
            block[2 * i + 1] = *word as u8;
        }
        block
    }

    #[test]
    fn calib_block_decodes_big_endian_and_roundtrips() {
        let original = encode(&datasheet_calib());
        let decoded = CalibParams::from_block(&original).unwrap();
        assert_eq!(decoded, datasheet_calib());
        assert_eq!(encode(&decoded), original);
    }

    #[test]
    fn short_calib_block_is_rejected() {
        let block = [0u8; BMP180_LEN_CALIB_DATA - 1];
        match CalibParams::from_block(&block) {
            Err(Bmp180Error::CalibrationRead { got }) => assert_eq!(got, 21),
            other => panic!("expected CalibrationRead, got {other:?}"),
        }
    }

    #[test]
    fn temperature_stage_matches_datasheet_example() {
        let (t, b5) = datasheet_calib().compensate_temperature(27898);
        assert_eq!(t, 150);
        assert_eq!(b5, 2400);
    }

    #[test]
    fn temperature_stage_is_reproducible() {
        let calib = datasheet_calib();
        assert_eq!(
            calib.compensate_temperature(27898),
            calib.compensate_temperature(27898)
        );
    }

    #[test]
    fn temperature_stage_degenerate_block_yields_zero() {
        let calib = CalibParams {
            ac1: 0,
            ac2: 0,
            ac3: 0,
            ac4: 0,
            ac5: 1,
            ac6: 0,
            b1: 0,
            b2: 0,
            mb: 0,
            mc: 0,
            md: 1,
        };
        let (t, b5) = calib.compensate_temperature(1);
        assert_eq!(b5, 0);
        assert_eq!(t, 0);
    }

    #[test]
    fn pressure_stage_matches_datasheet_example() {
        let calib = datasheet_calib();
        let (_, b5) = calib.compensate_temperature(27898);
        let pres = calib.compensate_pressure(b5, 23843, Bmp180OverSampling::UltraLowPower);
        // the datasheet walkthrough divides its powers of two by arithmetic
        // shift (floor) and prints 69964; division truncating toward zero
        // lands one pascal higher
        assert_eq!(pres, 69965);
    }

    #[test]
    fn pressure_stage_is_deterministic_for_every_oss() {
        let calib = datasheet_calib();
        let (_, b5) = calib.compensate_temperature(27898);
        for oss in [
            Bmp180OverSampling::UltraLowPower,
            Bmp180OverSampling::Standard,
            Bmp180OverSampling::HighResolution,
            Bmp180OverSampling::UltraHighResolution,
        ] {
            let up = 23843 << oss.value();
            assert_eq!(
                calib.compensate_pressure(b5, up, oss),
                calib.compensate_pressure(b5, up, oss)
            );
        }
    }

    #[test]
    fn raw_pressure_alignment_shift_per_oss() {
        let buf = [0x12, 0x34, 0x56];
        assert_eq!(
            assemble_up(&buf, Bmp180OverSampling::UltraLowPower),
            0x123456 >> 8
        );
        assert_eq!(
            assemble_up(&buf, Bmp180OverSampling::Standard),
            0x123456 >> 7
        );
        assert_eq!(
            assemble_up(&buf, Bmp180OverSampling::HighResolution),
            0x123456 >> 6
        );
        assert_eq!(
            assemble_up(&buf, Bmp180OverSampling::UltraHighResolution),
            0x123456 >> 5
        );
    }

    #[test]
    fn sea_level_reduction_skipped_at_zero_altitude() {
        assert_eq!(reduce_to_sea_level(101325, 0.0), None);
    }

    #[test]
    fn sea_level_reduction_follows_barometric_formula() {
        let reduced = reduce_to_sea_level(69965, 1234.0).unwrap();
        let expected = 699.65 / (1.0 - 1234.0 / 44330.0_f64).powf(5.255);
        assert!((reduced - expected).abs() < 1e-9);
        assert!(reduced > 699.65);
    }
}
