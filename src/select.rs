//! ISO/IEC 14443-3 anticollision and selection (section 6.5.3).
//!
//! A UID is resolved four bytes at a time, one cascade level per round:
//!
//! ```text
//!  UID size  Cascade level  Byte2  Byte3  Byte4  Byte5
//!  ========  =============  =====  =====  =====  =====
//!   4 bytes        1        uid0   uid1   uid2   uid3
//!   7 bytes        1        CT     uid0   uid1   uid2
//!                  2        uid3   uid4   uid5   uid6
//!  10 bytes        1        CT     uid0   uid1   uid2
//!                  2        CT     uid3   uid4   uid5
//!                  3        uid6   uid7   uid8   uid9
//! ```
//!
//! Each level uses its own frame:
//!
//! ```text
//!  Byte 0: SEL    cascade level command
//!  Byte 1: NVB    number of valid bits; high nibble whole bytes, low nibble extra bits
//!  Byte 2..5:     UID data or CT
//!  Byte 6: BCC    XOR of bytes 2..5
//!  Byte 7, 8:     CRC_A
//! ```
//!
//! BCC and CRC_A are only sent once all 32 bits of the level are known.

use core::cmp::min;

use log::debug;

use crate::com::Com;
use crate::mfrc522::{Received, MFRC522};
use crate::picc::{Command, Uid, UidSize, SAK_CASCADE};
use crate::register::{Register, COLL_POS, COLL_POS_NOT_VALID, VALUES_AFTER_COLL};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeLevel {
    One,
    Two,
    Three,
}

impl CascadeLevel {
    fn sel(self) -> u8 {
        match self {
            CascadeLevel::One => Command::SelCl1 as u8,
            CascadeLevel::Two => Command::SelCl2 as u8,
            CascadeLevel::Three => Command::SelCl3 as u8,
        }
    }

    /// First index in the UID that this level resolves.
    fn uid_offset(self) -> usize {
        match self {
            CascadeLevel::One => 0,
            CascadeLevel::Two => 3,
            CascadeLevel::Three => 6,
        }
    }

    fn number(self) -> u8 {
        match self {
            CascadeLevel::One => 1,
            CascadeLevel::Two => 2,
            CascadeLevel::Three => 3,
        }
    }

    fn next(self) -> Option<CascadeLevel> {
        match self {
            CascadeLevel::One => Some(CascadeLevel::Two),
            CascadeLevel::Two => Some(CascadeLevel::Three),
            CascadeLevel::Three => None,
        }
    }

    /// The caller's UID is known to continue past this level.
    fn needs_cascade_tag(self, known_len: usize, valid_bits: u8) -> bool {
        valid_bits != 0
            && match self {
                CascadeLevel::One => known_len > 4,
                CascadeLevel::Two => known_len > 7,
                CascadeLevel::Three => false,
            }
    }
}

impl<C: Com> MFRC522<C> {
    /// Runs SELECT/ANTICOLLISION until one READY PICC is ACTIVE and its UID is known.
    ///
    /// `known` holds UID bytes the caller already knows and `valid_bits` how many of their
    /// bits are valid; pass `&[]` and 0 to select whichever card wins the anticollision.
    /// When two cards collide the one with a 1 at the colliding bit is chosen.
    pub fn select(&mut self, known: &[u8], valid_bits: u8) -> Result<Uid> {
        if valid_bits > 80 || valid_bits as usize > known.len() * 8 {
            return Err(Error::Invalid);
        }

        // ValuesAfterColl=0 => bits received after a collision are cleared
        self.clear_register_bitmask(Register::CollReg, VALUES_AFTER_COLL)?;

        let mut uid = [0u8; 10];
        let mut level = CascadeLevel::One;
        loop {
            let sak = self.select_level(level, known, valid_bits, &mut uid)?;
            if sak & SAK_CASCADE == 0 {
                let size = UidSize::from_levels(level.number()).ok_or(Error::InternalError)?;
                return Ok(Uid::new(uid, size, sak));
            }
            debug!("cascade level {} done, UID continues", level.number());
            level = level.next().ok_or(Error::InternalError)?;
        }
    }

    /// Resolves one cascade level into `uid` and returns the SAK.
    fn select_level(
        &mut self,
        level: CascadeLevel,
        known: &[u8],
        valid_bits: u8,
        uid: &mut [u8; 10],
    ) -> Result<u8> {
        let offset = level.uid_offset();
        let use_cascade_tag = level.needs_cascade_tag(known.len(), valid_bits);

        let mut frame = [0u8; 9];
        frame[0] = level.sel();

        let mut known_bits = (valid_bits as usize).saturating_sub(8 * offset);
        let mut index = 2;
        if use_cascade_tag {
            frame[index] = Command::CT as u8;
            index += 1;
        }
        let max_bytes = if use_cascade_tag { 3 } else { 4 };
        let bytes_to_copy = min((known_bits + 7) / 8, max_bytes);
        if bytes_to_copy != 0 {
            frame[index..index + bytes_to_copy]
                .copy_from_slice(&known[offset..offset + bytes_to_copy]);
        }
        if use_cascade_tag {
            known_bits += 8;
        }

        let mut sak = [0u8; 3];
        let mut sak_received = None;
        // Every collision raises known_bits, so 32 rounds plus the SELECT always suffice.
        for _ in 0..=32 {
            let selecting = known_bits >= 32;
            let result = if selecting {
                frame[1] = 0x70;
                frame[6] = frame[2] ^ frame[3] ^ frame[4] ^ frame[5];
                let crc = self.calculate_crc(&frame[..7])?;
                frame[7..].copy_from_slice(&crc);
                self.transceive_data(&frame, Some(&mut sak), 0, 0, false)
            } else {
                let tx_last_bits = (known_bits % 8) as u8;
                let index = 2 + known_bits / 8;
                frame[1] = ((index as u8) << 4) | tx_last_bits;
                let used = index + if tx_last_bits != 0 { 1 } else { 0 };
                // The answer continues the partially sent byte in place.
                let tx = frame;
                self.transceive_data(
                    &tx[..used],
                    Some(&mut frame[index..]),
                    tx_last_bits,
                    tx_last_bits,
                    false,
                )
            };

            match result {
                Ok(received) if selecting => {
                    sak_received = Some(received);
                    break;
                }
                Ok(_) => known_bits = 32,
                Err(Error::Collision) => {
                    let coll = self.read_register(Register::CollReg)?;
                    if coll & COLL_POS_NOT_VALID != 0 {
                        return Err(Error::Collision);
                    }
                    let mut collision_pos = (coll & COLL_POS) as usize;
                    if collision_pos == 0 {
                        collision_pos = 32;
                    }
                    if collision_pos <= known_bits {
                        return Err(Error::InternalError);
                    }
                    debug!(
                        "cascade level {}: collision at bit {} after {} known",
                        level.number(),
                        collision_pos,
                        known_bits
                    );
                    known_bits = collision_pos;
                    let check_bit = (known_bits - 1) % 8;
                    let index = 1 + known_bits / 8 + if known_bits % 8 != 0 { 1 } else { 0 };
                    frame[index] |= 1 << check_bit;
                }
                Err(e) => return Err(e),
            }
        }
        let received = sak_received.ok_or(Error::InternalError)?;

        // BCC is not checked, it was computed here.
        let (src, count) = if frame[2] == Command::CT as u8 { (3, 3) } else { (2, 4) };
        uid[offset..offset + count].copy_from_slice(&frame[src..src + count]);

        check_sak(received)?;
        let crc = self.calculate_crc(&sak[..1])?;
        if crc != sak[1..] {
            return Err(Error::CrcWrong);
        }
        Ok(sak[0])
    }
}

/// SAK must be exactly 24 bits: 1 byte + CRC_A.
fn check_sak(received: Received) -> Result<()> {
    if received.len != 3 || received.valid_bits != 0 {
        return Err(Error::Communication);
    }
    Ok(())
}
