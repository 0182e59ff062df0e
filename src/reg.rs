//! ADXL 345 register map
//!
//! Data-only: addresses, bit masks and fixed device constants for the
//! registers this driver touches.
//!
//! Reference: <https://www.analog.com/media/en/technical-documentation/data-sheets/adxl345.pdf>

/// Expected DEVID contents
pub const DEVICE_ID: u8 = 0xE5;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                       Register addresses
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Device id (read only)
pub const DEVID: u8 = 0x00;
/// Output data rate code, low four bits
pub const BW_RATE: u8 = 0x2C;
/// Power control; bit 3 toggles measurement
pub const POWER_CTL: u8 = 0x2D;
/// Interrupt source / status byte (read only)
pub const INT_SOURCE: u8 = 0x30;
/// Data format; low two bits select the g range
pub const DATA_FORMAT: u8 = 0x31;
/// First of six acceleration bytes, X/Y/Z as little-endian i16 pairs
pub const DATAX0: u8 = 0x32;
/// FIFO control: 3-bit mode tag plus 5-bit watermark sample count
pub const FIFO_CTL: u8 = 0x38;
/// FIFO status (read only)
pub const FIFO_STATUS: u8 = 0x39;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Bit masks
// —————————————————————————————————————————————————————————————————————————————————————————————————

// INT_SOURCE
pub const INT_DATA_READY: u8 = 1 << 7;
pub const INT_WATERMARK: u8 = 1 << 1;

/// FIFO_STATUS: low six bits hold the entry count (the device caps at 32)
pub const FIFO_ENTRIES: u8 = 0x3F;

/// Highest programmable FIFO watermark level
pub const WATERMARK_MAX: u8 = 31;
