//! MFRC522 driver for ISO/IEC 14443-3 type A cards.
//!
//! The driver talks to the reader chip through the [`Com`] trait, resolves card UIDs with
//! the cascade anticollision procedure, and performs MIFARE Classic authentication, block
//! I/O and value-block arithmetic. Every wait inside the driver is a bounded poll; nothing
//! blocks forever and nothing is retried behind the caller's back.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod block;
pub mod com;
pub mod com_i2c;
pub mod com_spi;
pub mod config;
pub mod mfrc522;
pub mod mifare;
pub mod picc;
pub mod poll;
pub mod reader;
pub mod register;
pub mod select;
pub mod util;

pub use com::{Com, ComError};
pub use com_i2c::ComI2c;
pub use com_spi::ComSpi;
pub use config::{Config, RxGain};
pub use mfrc522::{Received, MFRC522};
pub use mifare::{KeyType, MifareKey, DEFAULT_KEY};
pub use picc::{PiccType, Uid, UidSize};

/// Failure of a driver operation. Each variant corresponds to one non-Ok [`StatusCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The bus adapter reported a failure.
    #[error("Bus transfer failed.")]
    Com,
    #[error("Error in communication.")]
    Communication,
    #[error("Collision detected.")]
    Collision,
    #[error("Timeout in communication.")]
    Timeout,
    #[error("A buffer is not big enough.")]
    NoRoom,
    #[error("Internal error in the code. Should not happen.")]
    InternalError,
    #[error("Invalid argument.")]
    Invalid,
    #[error("The CRC_A does not match.")]
    CrcWrong,
    #[error("A MIFARE PICC responded with NAK.")]
    MifareNack,
}

impl From<ComError> for Error {
    fn from(_: ComError) -> Self {
        Error::Com
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Com | Error::Communication => StatusCode::Error,
            Error::Collision => StatusCode::Collision,
            Error::Timeout => StatusCode::Timeout,
            Error::NoRoom => StatusCode::NoRoom,
            Error::InternalError => StatusCode::InternalError,
            Error::Invalid => StatusCode::Invalid,
            Error::CrcWrong => StatusCode::CrcWrong,
            Error::MifareNack => StatusCode::MifareNack,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Outcome of a protocol operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Error,
    Collision,
    Timeout,
    NoRoom,
    InternalError,
    Invalid,
    CrcWrong,
    MifareNack,
}

impl StatusCode {
    pub fn name(&self) -> &'static str {
        match self {
            StatusCode::Ok => "Success.",
            StatusCode::Error => "Error in communication.",
            StatusCode::Collision => "Collision detected.",
            StatusCode::Timeout => "Timeout in communication.",
            StatusCode::NoRoom => "A buffer is not big enough.",
            StatusCode::InternalError => "Internal error in the code. Should not happen.",
            StatusCode::Invalid => "Invalid argument.",
            StatusCode::CrcWrong => "The CRC_A does not match.",
            StatusCode::MifareNack => "A MIFARE PICC responded with NAK.",
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == StatusCode::Ok
    }
}

impl core::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl<T> From<&Result<T>> for StatusCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => StatusCode::Ok,
            Err(e) => e.status(),
        }
    }
}
