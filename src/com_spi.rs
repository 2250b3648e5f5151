use super::com::{Com, ComError};
use crate::register::Register;
use alloc::vec;
use alloc::vec::Vec;
use embedded_hal::blocking::spi;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::spi::{Mode, Phase, Polarity};

/// SPI mode 0, as required by the MFRC522.
pub const MODE: Mode = Mode {
    polarity: Polarity::IdleLow,
    phase: Phase::CaptureOnFirstTransition,
};

/// MFRC522 attached over SPI with a software-driven chip select.
pub struct ComSpi<SPI, NSS> {
    spi: SPI,
    nss: NSS,
}

impl<SPI, NSS> ComSpi<SPI, NSS> {
    pub fn new(spi: SPI, nss: NSS) -> Self {
        Self { spi, nss }
    }

    pub fn release(self) -> (SPI, NSS) {
        (self.spi, self.nss)
    }

    // Datasheet 8.1.2.3: MSB selects read, LSB is always 0.
    fn read_address(reg: Register) -> u8 {
        ((reg.addr() << 1) & 0b0111_1110) | 0b1000_0000
    }

    fn write_address(reg: Register) -> u8 {
        (reg.addr() << 1) & 0b0111_1110
    }
}

impl<E, SPI, NSS> ComSpi<SPI, NSS>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    NSS: OutputPin,
{
    fn with_nss_low<F, T>(&mut self, f: F) -> Result<T, ComError>
    where
        F: FnOnce(&mut SPI) -> Result<T, E>,
    {
        self.nss.set_low().map_err(|_| ComError)?;
        let f_result = f(&mut self.spi).map_err(|_| ComError);
        let pin_result = self.nss.set_high().map_err(|_| ComError);
        let value = f_result?;
        pin_result?;
        Ok(value)
    }
}

impl<E, SPI, NSS> Com for ComSpi<SPI, NSS>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    NSS: OutputPin,
{
    fn read(&mut self, reg: Register, value: &mut [u8]) -> Result<(), ComError> {
        if value.is_empty() {
            return Ok(());
        }
        // The address is clocked out once per byte; a trailing 0 ends the burst.
        let address = Self::read_address(reg);
        let mut buf = vec![address; value.len() + 1];
        buf[value.len()] = 0;
        let rx = self.with_nss_low(|spi| spi.transfer(&mut buf).map(|rx| rx.to_vec()))?;
        value.copy_from_slice(&rx[1..]);
        Ok(())
    }

    fn write(&mut self, reg: Register, value: &[u8]) -> Result<(), ComError> {
        let mut tx_buf = Vec::with_capacity(value.len() + 1);
        tx_buf.push(Self::write_address(reg));
        tx_buf.extend_from_slice(value);
        self.with_nss_low(|spi| spi.write(&tx_buf))
    }
}
