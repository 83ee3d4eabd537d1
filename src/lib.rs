//! BMP180 barometric pressure and temperature reader for Linux i2c buses.

pub mod bmp180;
pub mod i2cio;
