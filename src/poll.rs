//! Bounded busy-wait polling.
//!
//! The chip signals completion through interrupt flags that are read over the bus. Each read
//! takes a roughly constant time on a given bus, so the wait is bounded by a number of reads
//! rather than a clock.

use crate::{Error, Result};
use core::task::Poll;

/// CalcCRC completion: 5000 reads, about 89 ms at 17.73 µs per read.
pub const CRC_BUDGET: u16 = 5000;
/// Transceive/MFAuthent completion: 2000 reads, about 36 ms at 17.86 µs per read.
pub const TRANSCEIVE_BUDGET: u16 = 2000;

/// Calls `check` until it is ready or fails, at most `budget` times.
///
/// Exhausting the budget yields [`Error::Timeout`].
pub fn poll_bounded<T, F>(budget: u16, mut check: F) -> Result<T>
where
    F: FnMut() -> Result<Poll<T>>,
{
    for _ in 0..budget {
        if let Poll::Ready(value) = check()? {
            return Ok(value);
        }
    }
    Err(Error::Timeout)
}
