//! Bus transport
//!
//! Transport-agnostic [`RegisterBus`] trait plus the four-wire SPI
//! implementation. A read transaction clocks out the control byte (register
//! address OR'd with the read bit, plus the multi-byte bit when more than one
//! byte follows) and then n don't-care bytes, capturing n + 1 bytes in. The
//! first captured byte arrives during the address phase and carries no data.
//!
//! Chip select is asserted before and deasserted after every transaction,
//! including when the transfer itself fails.

use core::fmt::Debug;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// OR'd into the control byte for any read transaction
pub const READ_BIT: u8 = 0x80;
/// Additionally OR'd when more than one byte is clocked
pub const MULTI_BIT: u8 = 0x40;

/// Temp write buffer for appending reg addr.
pub const MAX_BUF_LEN: usize = 16;

/// Transport-agnostic bus trait
///
/// The driver talks to the device exclusively through this seam, which also
/// makes the acquisition and configuration logic testable off-target.
pub trait RegisterBus {
    type Error: Debug;

    /// Read `buf.len()` payload bytes; the address-phase artifact byte is
    /// already stripped.
    fn read_register(&mut self, reg_addr: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` starting at `reg_addr`.
    fn write_register(&mut self, reg_addr: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Capture a whole transaction frame, leading artifact byte included,
    /// straight into `frame`. The acquisition hot loops use this to land each
    /// sample in its pre-allocated slot and defer stripping until the capture
    /// is complete.
    fn read_frame_into(&mut self, reg_addr: u8, frame: &mut [u8]) -> Result<(), Self::Error>;
}

// ————————————————————————————————————————————— SPI ———————————————————————————————————————————————

/// Four-wire SPI bus with a GPIO chip select
pub struct AdxlBusSpi<SPI, CS> {
    pub spi:    SPI,
    pub spi_cs: CS,
}

impl<SPI: SpiBus, CS: OutputPin> RegisterBus for AdxlBusSpi<SPI, CS> {
    type Error = SPI::Error;

    fn read_register(&mut self, reg_addr: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        assert!(buf.len() <= MAX_BUF_LEN, "buffer too large");

        let mut frame = [0u8; MAX_BUF_LEN + 1];
        self.read_frame_into(reg_addr, &mut frame[..buf.len() + 1])?;

        // Skip the address-phase byte
        buf.copy_from_slice(&frame[1..buf.len() + 1]);
        Ok(())
    }

    fn write_register(&mut self, reg_addr: u8, data: &[u8]) -> Result<(), Self::Error> {
        assert!(!data.is_empty() && data.len() <= MAX_BUF_LEN, "buffer size");

        let addr_byte = if data.len() > 1 {
            reg_addr | MULTI_BIT
        }
        else {
            reg_addr
        };

        // Prepare buffer: first byte = address, rest = data
        let mut buf = [0u8; MAX_BUF_LEN + 1];
        buf[0] = addr_byte;
        buf[1..data.len() + 1].copy_from_slice(data);

        self.spi_cs.set_low().expect("SPI CS pin");
        let result = self.spi.write(&buf[..data.len() + 1]);
        self.spi_cs.set_high().expect("SPI CS pin");

        result
    }

    fn read_frame_into(&mut self, reg_addr: u8, frame: &mut [u8]) -> Result<(), Self::Error> {
        assert!(frame.len() >= 2 && frame.len() <= MAX_BUF_LEN + 1, "frame size");

        let addr_byte = if frame.len() > 2 {
            reg_addr | READ_BIT | MULTI_BIT
        }
        else {
            reg_addr | READ_BIT
        };

        // Control byte followed by don't-care bytes
        let mut tx = [0u8; MAX_BUF_LEN + 1];
        tx[0] = addr_byte;

        self.spi_cs.set_low().expect("SPI CS pin");
        let result = self.spi.transfer(frame, &tx[..frame.len()]);
        self.spi_cs.set_high().expect("SPI CS pin");

        result
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    fn cs_cycle() -> [PinTransaction; 2] {
        [
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]
    }

    #[test]
    fn single_byte_read_sets_read_bit_and_strips_artifact() {
        let spi = SpiMock::new(&[SpiTransaction::transfer(
            vec![0x30 | 0x80, 0x00],
            vec![0xFF, 0x82],
        )]);
        let cs = PinMock::new(&cs_cycle());
        let mut bus = AdxlBusSpi { spi, spi_cs: cs };

        let mut buf = [0u8; 1];
        bus.read_register(0x30, &mut buf).unwrap();
        assert_eq!(buf, [0x82]);

        bus.spi.done();
        bus.spi_cs.done();
    }

    #[test]
    fn multi_byte_read_also_sets_multi_bit() {
        let spi = SpiMock::new(&[SpiTransaction::transfer(
            vec![0x32 | 0x80 | 0x40, 0, 0, 0, 0, 0, 0],
            vec![0xFF, 1, 2, 3, 4, 5, 6],
        )]);
        let cs = PinMock::new(&cs_cycle());
        let mut bus = AdxlBusSpi { spi, spi_cs: cs };

        let mut buf = [0u8; 6];
        bus.read_register(0x32, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);

        bus.spi.done();
        bus.spi_cs.done();
    }

    #[test]
    fn raw_frame_read_keeps_artifact_byte() {
        let spi = SpiMock::new(&[SpiTransaction::transfer(
            vec![0x32 | 0x80 | 0x40, 0, 0, 0, 0, 0, 0],
            vec![0xAA, 1, 2, 3, 4, 5, 6],
        )]);
        let cs = PinMock::new(&cs_cycle());
        let mut bus = AdxlBusSpi { spi, spi_cs: cs };

        let mut frame = [0u8; 7];
        bus.read_frame_into(0x32, &mut frame).unwrap();
        assert_eq!(frame, [0xAA, 1, 2, 3, 4, 5, 6]);

        bus.spi.done();
        bus.spi_cs.done();
    }

    #[test]
    fn single_byte_write_frames_address_and_data() {
        let spi = SpiMock::new(&[SpiTransaction::write_vec(vec![0x2D, 0x08])]);
        let cs = PinMock::new(&cs_cycle());
        let mut bus = AdxlBusSpi { spi, spi_cs: cs };

        bus.write_register(0x2D, &[0x08]).unwrap();

        bus.spi.done();
        bus.spi_cs.done();
    }
}
