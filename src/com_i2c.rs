use super::com::{Com, ComError};
use crate::register::Register;
use alloc::vec::Vec;
use embedded_hal::blocking::i2c;

/// MFRC522 attached over I2C. The register address is sent as-is before each transfer.
pub struct ComI2c<I2C> {
    com: I2C,
    addr: u8,
}
impl<I2C> ComI2c<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { com: i2c, addr }
    }

    pub fn release(self) -> I2C {
        self.com
    }
}
impl<I2C> Com for ComI2c<I2C>
where
    I2C: i2c::Read + i2c::Write,
{
    fn read(&mut self, reg: Register, value: &mut [u8]) -> Result<(), ComError> {
        if value.is_empty() {
            return Ok(());
        }
        self.com.write(self.addr, &[reg.addr()]).map_err(|_| ComError)?;
        self.com.read(self.addr, value).map_err(|_| ComError)
    }
    fn write(&mut self, reg: Register, value: &[u8]) -> Result<(), ComError> {
        let mut tx_buf = Vec::with_capacity(value.len() + 1);
        tx_buf.push(reg.addr());
        tx_buf.extend_from_slice(value);
        self.com.write(self.addr, &tx_buf).map_err(|_| ComError)
    }
}
