use crate::register::Register;

/// The bus adapter could not complete a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComError;

/// Register-level access to the reader chip.
///
/// `read` fills `value` with consecutive reads of the same register (the FIFO when `reg` is
/// `FIFODataReg`), `write` writes every byte of `value` to the same register. Both complete
/// fully or fail.
pub trait Com {
    fn read(&mut self, reg: Register, value: &mut [u8]) -> Result<(), ComError>;
    fn write(&mut self, reg: Register, value: &[u8]) -> Result<(), ComError>;
}

impl<T: Com + ?Sized> Com for &mut T {
    fn read(&mut self, reg: Register, value: &mut [u8]) -> Result<(), ComError> {
        (**self).read(reg, value)
    }
    fn write(&mut self, reg: Register, value: &[u8]) -> Result<(), ComError> {
        (**self).write(reg, value)
    }
}
