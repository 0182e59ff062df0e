//! Adxl 345 high-rate acquisition driver
//!
//! Using embedded-hal
//! Four-wire SPI through a RegisterBus trait, with polled and FIFO-drained
//! capture loops able to keep up with the device's 3.2 kHz output rate.
//!
//! Reference: <https://www.analog.com/media/en/technical-documentation/data-sheets/adxl345.pdf>
//!
//! ## Example:
//!
//! ```ignore
//! use adxl345_capture as adxl;
//! use core::time::Duration;
//!
//! // HAL boilerplate: SPI peripheral in mode 3, CS as push-pull output, and
//! // a monotonic microsecond counter implementing adxl::MonotonicUs.
//! ...
//!
//! // Adxl Bus
//! let adxlbus = adxl::AdxlBusSpi {
//!     spi:    spi,
//!     spi_cs: spi_cs,
//! };
//!
//! // Adxl Device
//! let mut adxl = adxl::Adxl345::new(adxlbus, clock);
//!
//! // Validate the device id and apply range / rate
//! adxl.init(adxl::Range::R16G, adxl::Rate::R3200)?;
//!
//! // Polled burst of 1024 samples
//! let capture = adxl.read_samples(1024, None)?;
//! let (x, y, z) = capture.decode()?;
//!
//! // Two seconds of FIFO-drained capture
//! let capture = adxl.record_fifo(Duration::from_secs(2), None)?;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod reg;

mod bus;
mod capture;
mod decode;

use core::fmt::{Debug, Display};

pub use bus::{AdxlBusSpi, RegisterBus, MAX_BUF_LEN, MULTI_BIT, READ_BIT};
pub use capture::{CancelFlag, Capture, MonotonicUs, DEFAULT_POLL_TIMEOUT_US};
pub use decode::{decode_xyz, lsb_to_ms2, strip_frames, MalformedBuffer, FRAME_LEN, SAMPLE_LEN};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Gravity m/s^2
pub const G: f32 = 9.80665;

/// Power Mode
///
/// The byte written to POWER_CTL: standby clears the measure bit, measure
/// sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerMode {
    Standby = 0x00,
    Measure = 0x08,
}

/// Range Bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Range {
    R2G  = 0b_00,
    R4G  = 0b_01,
    R8G  = 0b_10,
    R16G = 0b_11,
}

impl Range {
    /// All legal full-scale ranges
    pub const ALL: [Range; 4] = [Range::R2G, Range::R4G, Range::R8G, Range::R16G];

    /// Look a range up by its value in multiples of g
    pub fn from_g(g: u8) -> Option<Range> {
        match g {
            2 => Some(Range::R2G),
            4 => Some(Range::R4G),
            8 => Some(Range::R8G),
            16 => Some(Range::R16G),
            _ => None,
        }
    }

    pub fn g(self) -> u8 {
        match self {
            Range::R2G => 2,
            Range::R4G => 4,
            Range::R8G => 8,
            Range::R16G => 16,
        }
    }

    /// Scale factor in LSB per g for the 10-bit right-justified data format
    pub fn lsb_per_g(self) -> u16 {
        match self {
            Range::R2G => 256,
            Range::R4G => 128,
            Range::R8G => 64,
            Range::R16G => 32,
        }
    }
}

/// Data Rate
///
/// The twelve output data rates the device supports in normal operation,
/// as BW_RATE codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Rate {
    R3200 = 0b_1111,
    R1600 = 0b_1110,
    R800  = 0b_1101,
    R400  = 0b_1100,
    R200  = 0b_1011,
    R100  = 0b_1010,
    R50   = 0b_1001,
    R25   = 0b_1000,
    R12_5 = 0b_0111,
    R6_25 = 0b_0110,
    R3_13 = 0b_0101,
    R1_56 = 0b_0100,
}

impl Rate {
    /// All legal sampling rates
    pub const ALL: [Rate; 12] = [
        Rate::R3200,
        Rate::R1600,
        Rate::R800,
        Rate::R400,
        Rate::R200,
        Rate::R100,
        Rate::R50,
        Rate::R25,
        Rate::R12_5,
        Rate::R6_25,
        Rate::R3_13,
        Rate::R1_56,
    ];

    /// Nominal output rate in Hz
    pub fn hz(self) -> f32 {
        match self {
            Rate::R3200 => 3200.0,
            Rate::R1600 => 1600.0,
            Rate::R800 => 800.0,
            Rate::R400 => 400.0,
            Rate::R200 => 200.0,
            Rate::R100 => 100.0,
            Rate::R50 => 50.0,
            Rate::R25 => 25.0,
            Rate::R12_5 => 12.5,
            Rate::R6_25 => 6.25,
            Rate::R3_13 => 3.13,
            Rate::R1_56 => 1.56,
        }
    }

    /// Look a rate code up by its nominal Hz value
    pub fn from_hz(hz: f32) -> Option<Rate> {
        Rate::ALL.iter().copied().find(|r| r.hz() == hz)
    }
}

/// Fifo Mode
///
/// Bypass leaves the on-chip sample queue off; stream keeps the newest 32
/// samples, discarding the oldest once full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FifoMode {
    Bypass,
    Stream,
}

impl FifoMode {
    /// FIFO_CTL byte: 3-bit mode tag in the top bits, 5-bit watermark sample
    /// count below. Bypass always encodes as zero.
    pub fn encode(self, watermark: u8) -> u8 {
        match self {
            FifoMode::Bypass => 0x00,
            FifoMode::Stream => 0b_100 << 5 | (watermark & reg::WATERMARK_MAX),
        }
    }
}

/// Tracked device configuration
///
/// Mirrors what has actually been written to the device. `range` and `rate`
/// stay `None` until applied; duration-based captures need `rate` for their
/// timing math and fail with [`Error::NotConfigured`] without it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub power:     PowerMode,
    pub range:     Option<Range>,
    pub rate:      Option<Rate>,
    pub fifo:      FifoMode,
    pub watermark: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            power:     PowerMode::Standby,
            range:     None,
            rate:      None,
            fifo:      FifoMode::Bypass,
            watermark: 16,
        }
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Adxl
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// ADXL345 driver
///
/// Generic over the register bus and a monotonic microsecond clock used to
/// timestamp samples and bound the busy-wait polls.
pub struct Adxl345<B, CLK> {
    pub(crate) bus:             B,
    pub(crate) clock:           CLK,
    pub(crate) cfg:             Config,
    pub(crate) poll_timeout_us: u64,
}

impl<B: RegisterBus, CLK> Adxl345<B, CLK> {
    pub fn new(bus: B, clock: CLK) -> Self {
        Self {
            bus,
            clock,
            cfg: Config::default(),
            poll_timeout_us: DEFAULT_POLL_TIMEOUT_US,
        }
    }

    /// Release the bus and clock
    pub fn release(self) -> (B, CLK) {
        (self.bus, self.clock)
    }

    /// Configuration as last applied to the device
    pub fn config(&self) -> Config {
        self.cfg
    }

    /// Ceiling for every busy-wait poll: if no new sample shows up within
    /// this window the acquisition fails with [`Error::Timeout`] instead of
    /// spinning forever.
    pub fn set_poll_timeout_us(&mut self, us: u64) {
        self.poll_timeout_us = us;
    }

    // ——————————————————————————————————————————— Raw —————————————————————————————————————————————

    pub(crate) fn read_byte(&mut self, reg_addr: u8) -> Result<u8, Error<B::Error>> {
        let mut buf = [0u8; 1];
        self.bus.read_register(reg_addr, &mut buf).map_err(Error::Bus)?;
        Ok(buf[0])
    }

    pub(crate) fn write_byte(&mut self, reg_addr: u8, value: u8) -> Result<(), Error<B::Error>> {
        self.bus.write_register(reg_addr, &[value]).map_err(Error::Bus)
    }

    // —————————————————————————————————————————— Init —————————————————————————————————————————————

    /// Device ID
    pub fn device_id(&mut self) -> Result<u8, Error<B::Error>> {
        self.read_byte(reg::DEVID)
    }

    /// Read the device id and compare it against the fixed ADXL345 identity.
    /// A mismatch usually means wrong wiring or a reinitialised bus.
    pub fn check_device_id(&mut self) -> Result<(), Error<B::Error>> {
        let id = self.device_id()?;
        if id != reg::DEVICE_ID {
            return Err(Error::WrongDeviceId(id));
        }
        Ok(())
    }

    /// Validate the device identity, then apply standby power, the given
    /// range and rate, and a bypassed FIFO.
    pub fn init(&mut self, range: Range, rate: Rate) -> Result<(), Error<B::Error>> {
        self.check_device_id()?;
        self.set_power_mode(PowerMode::Standby)?;
        self.set_g_range(range)?;
        self.set_sampling_rate(rate)?;
        self.set_fifo_mode(FifoMode::Bypass, self.cfg.watermark)?;
        Ok(())
    }

    // —————————————————————————————————————————— Status ———————————————————————————————————————————

    /// INT_SOURCE bit 7: a new unread sample exists
    pub fn is_data_ready(&mut self) -> Result<bool, Error<B::Error>> {
        Ok(self.read_byte(reg::INT_SOURCE)? & reg::INT_DATA_READY != 0)
    }

    /// INT_SOURCE bit 1: the FIFO fill level has reached the watermark
    pub fn is_watermark_reached(&mut self) -> Result<bool, Error<B::Error>> {
        Ok(self.read_byte(reg::INT_SOURCE)? & reg::INT_WATERMARK != 0)
    }

    /// Number of samples waiting in the FIFO (an xyz triple counts one)
    pub fn fifo_count(&mut self) -> Result<u8, Error<B::Error>> {
        Ok(self.read_byte(reg::FIFO_STATUS)? & reg::FIFO_ENTRIES)
    }

    // ——————————————————————————————————————————— Set —————————————————————————————————————————————

    /// Set POWER_CTL: standby or measure
    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<B::Error>> {
        self.write_byte(reg::POWER_CTL, mode as u8)?;
        self.cfg.power = mode;
        Ok(())
    }

    /// Set DATA_FORMAT: full-scale range (10-bit right-justified format)
    pub fn set_g_range(&mut self, range: Range) -> Result<(), Error<B::Error>> {
        self.write_byte(reg::DATA_FORMAT, range as u8)?;
        self.cfg.range = Some(range);
        Ok(())
    }

    /// Set the range from a plain g value; anything outside {2, 4, 8, 16}
    /// is rejected before touching the bus.
    pub fn set_g_range_g(&mut self, g: u8) -> Result<(), Error<B::Error>> {
        let range = Range::from_g(g).ok_or(Error::InvalidConfigValue)?;
        self.set_g_range(range)
    }

    /// Set BW_RATE: output data rate
    pub fn set_sampling_rate(&mut self, rate: Rate) -> Result<(), Error<B::Error>> {
        self.write_byte(reg::BW_RATE, rate as u8)?;
        self.cfg.rate = Some(rate);
        Ok(())
    }

    /// Set the rate from a plain Hz value; anything outside the twelve legal
    /// rates is rejected before touching the bus.
    pub fn set_sampling_rate_hz(&mut self, hz: f32) -> Result<(), Error<B::Error>> {
        let rate = Rate::from_hz(hz).ok_or(Error::InvalidConfigValue)?;
        self.set_sampling_rate(rate)
    }

    /// Set FIFO_CTL: queue mode plus watermark level (0–31). Levels above 31
    /// are rejected, not clamped.
    pub fn set_fifo_mode(&mut self, mode: FifoMode, watermark: u8) -> Result<(), Error<B::Error>> {
        if watermark > reg::WATERMARK_MAX {
            return Err(Error::InvalidConfigValue);
        }
        self.write_byte(reg::FIFO_CTL, mode.encode(watermark))?;
        self.cfg.fifo = mode;
        self.cfg.watermark = watermark;
        Ok(())
    }

    /// Set the watermark level, switching the FIFO to stream mode
    pub fn set_watermark_level(&mut self, level: u8) -> Result<(), Error<B::Error>> {
        self.set_fifo_mode(FifoMode::Stream, level)
    }

    /// Flush the FIFO by cycling bypass and stream mode. Without this, the
    /// first values drained were recorded before the capture actually
    /// started.
    pub fn clear_fifo(&mut self) -> Result<(), Error<B::Error>> {
        let watermark = self.cfg.watermark;
        self.set_fifo_mode(FifoMode::Bypass, watermark)?;
        self.set_fifo_mode(FifoMode::Stream, watermark)
    }

    /// Clear a stale data-ready condition with one throwaway sample read
    pub fn clear_data_ready(&mut self) -> Result<(), Error<B::Error>> {
        let mut buf = [0u8; SAMPLE_LEN];
        self.bus.read_register(reg::DATAX0, &mut buf).map_err(Error::Bus)
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Error
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Debug> {
    /// Unsupported mode / range / rate / watermark argument; rejected before
    /// any bus write
    InvalidConfigValue,
    /// The device id register did not hold the ADXL345 identity
    WrongDeviceId(u8),
    /// A duration-based capture was requested before a sampling rate was
    /// applied
    NotConfigured,
    /// Buffer length not divisible by the sample frame size
    MalformedBuffer,
    /// A busy-wait poll exceeded its wall-clock ceiling
    Timeout,
    /// The acquisition was aborted through its [`CancelFlag`]
    Cancelled,
    Bus(E),
}

impl<E: Debug + Display> Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        match &self {
            Error::InvalidConfigValue => write!(f, "unsupported configuration value"),
            Error::WrongDeviceId(id) => write!(f, "unexpected device id {:#04x}", id),
            Error::NotConfigured => write!(f, "sampling rate not applied yet"),
            Error::MalformedBuffer => write!(f, "buffer is not whole frames"),
            Error::Timeout => write!(f, "device never became ready"),
            Error::Cancelled => write!(f, "acquisition cancelled"),
            Error::Bus(e) => Display::fmt(e, f),
        }
    }
}

impl<E: Debug> From<MalformedBuffer> for Error<E> {
    fn from(_: MalformedBuffer) -> Self {
        Error::MalformedBuffer
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
pub(crate) mod testutil {
    //! Scripted bus and clock fakes shared by the unit tests

    use std::collections::VecDeque;

    use crate::bus::RegisterBus;
    use crate::capture::MonotonicUs;
    use crate::reg;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScriptError;

    impl std::fmt::Display for ScriptError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "scripted bus error")
        }
    }

    /// Scripted register bus: status bytes pop from per-register queues,
    /// sample payloads are a deterministic rolling counter, writes are
    /// recorded.
    pub struct ScriptBus {
        pub writes:             Vec<(u8, u8)>,
        pub status_seq:         VecDeque<u8>,
        pub default_status:     u8,
        pub fifo_seq:           VecDeque<u8>,
        pub default_fifo:       u8,
        pub devid:              u8,
        pub clear_reads:        usize,
        pub frame_reads:        usize,
        pub fail_frame_read_at: Option<usize>,
        counter:                u8,
    }

    pub const ARTIFACT: u8 = 0xA5;

    impl ScriptBus {
        pub fn new() -> Self {
            Self {
                writes:             Vec::new(),
                status_seq:         VecDeque::new(),
                default_status:     reg::INT_DATA_READY,
                fifo_seq:           VecDeque::new(),
                default_fifo:       0,
                devid:              reg::DEVICE_ID,
                clear_reads:        0,
                frame_reads:        0,
                fail_frame_read_at: None,
                counter:            0,
            }
        }

        fn next_byte(&mut self) -> u8 {
            self.counter = self.counter.wrapping_add(1);
            self.counter
        }

        fn status_byte(&mut self, reg_addr: u8) -> u8 {
            match reg_addr {
                reg::INT_SOURCE => self.status_seq.pop_front().unwrap_or(self.default_status),
                reg::FIFO_STATUS => self.fifo_seq.pop_front().unwrap_or(self.default_fifo),
                reg::DEVID => self.devid,
                _ => 0,
            }
        }
    }

    impl RegisterBus for ScriptBus {
        type Error = ScriptError;

        fn read_register(&mut self, reg_addr: u8, buf: &mut [u8]) -> Result<(), ScriptError> {
            if reg_addr == reg::DATAX0 {
                self.clear_reads += 1;
                for b in buf.iter_mut() {
                    *b = self.next_byte();
                }
            }
            else {
                buf[0] = self.status_byte(reg_addr);
            }
            Ok(())
        }

        fn write_register(&mut self, reg_addr: u8, data: &[u8]) -> Result<(), ScriptError> {
            self.writes.push((reg_addr, data[0]));
            Ok(())
        }

        fn read_frame_into(&mut self, reg_addr: u8, frame: &mut [u8]) -> Result<(), ScriptError> {
            if reg_addr == reg::DATAX0 {
                if self.fail_frame_read_at == Some(self.frame_reads) {
                    return Err(ScriptError);
                }
                self.frame_reads += 1;
                frame[0] = ARTIFACT;
                for b in frame[1..].iter_mut() {
                    *b = self.next_byte();
                }
            }
            else {
                frame[0] = ARTIFACT;
                frame[1] = self.status_byte(reg_addr);
            }
            Ok(())
        }
    }

    /// Clock that advances by a fixed step on every read
    pub struct StepClock {
        pub now:  u64,
        pub step: u64,
    }

    impl StepClock {
        pub fn new(step: u64) -> Self {
            Self { now: 0, step }
        }
    }

    impl MonotonicUs for StepClock {
        fn now_us(&mut self) -> u64 {
            self.now += self.step;
            self.now
        }
    }
}
