//! MIFARE Classic memory layout: value blocks, sector trailers and access bits
//! (MF1S503x sections 8.6 and 8.7).

use crate::{Error, Result};

pub const BLOCK_SIZE: usize = 16;

/// A value block: a signed 32-bit value kept three times (plain, inverted, plain) and
/// a block address kept four times (plain, inverted, plain, inverted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueBlock {
    pub value: i32,
    pub addr: u8,
}

impl ValueBlock {
    pub fn new(value: i32, addr: u8) -> Self {
        ValueBlock { value, addr }
    }

    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let v = self.value.to_le_bytes();
        let mut block = [0u8; BLOCK_SIZE];
        block[0..4].copy_from_slice(&v);
        for (dst, src) in block[4..8].iter_mut().zip(v.iter()) {
            *dst = !src;
        }
        block[8..12].copy_from_slice(&v);
        block[12] = self.addr;
        block[13] = !self.addr;
        block[14] = self.addr;
        block[15] = !self.addr;
        block
    }

    /// Decodes `block`, rejecting it with [`Error::Invalid`] when the redundant copies
    /// disagree.
    pub fn decode(block: &[u8; BLOCK_SIZE]) -> Result<ValueBlock> {
        let value = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        let inverted = i32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        let copy = i32::from_le_bytes([block[8], block[9], block[10], block[11]]);
        let addr = block[12];
        if inverted != !value
            || copy != value
            || block[13] != !addr
            || block[14] != addr
            || block[15] != !addr
        {
            return Err(Error::Invalid);
        }
        Ok(ValueBlock { value, addr })
    }
}

/// Location of a block inside a MIFARE Classic card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    pub number: u8,
    pub first_block: u8,
    pub blocks: u8,
}

impl Sector {
    /// Sectors 0..32 have 4 blocks, sectors 32..40 (4K cards only) have 16.
    pub fn new(number: u8) -> Option<Sector> {
        match number {
            0..=31 => Some(Sector { number, first_block: number * 4, blocks: 4 }),
            32..=39 => Some(Sector {
                number,
                first_block: 128 + (number - 32) * 16,
                blocks: 16,
            }),
            _ => None,
        }
    }

    pub fn of_block(block: u8) -> Sector {
        if block < 128 {
            Sector { number: block / 4, first_block: block & !0x03, blocks: 4 }
        } else {
            Sector { number: 32 + (block - 128) / 16, first_block: block & !0x0F, blocks: 16 }
        }
    }

    pub fn trailer(&self) -> u8 {
        self.first_block + (self.blocks - 1)
    }

    /// Access-bit group (0..=3) governing `offset` within the sector.
    pub fn group_of(&self, offset: u8) -> u8 {
        if self.blocks == 4 {
            offset
        } else {
            offset / 5
        }
    }
}

/// Access conditions of one sector: `groups[i]` holds `[C1 C2 C3]` for group `i` with C1 as
/// the most significant bit. Group 3 is the sector trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessBits {
    pub groups: [u8; 4],
    /// The stored inverted copies did not match.
    pub inverted_error: bool,
}

impl AccessBits {
    /// Parses bytes 6, 7 and 8 of a sector trailer.
    pub fn parse(bytes: &[u8; 3]) -> AccessBits {
        let c1 = bytes[1] >> 4;
        let c2 = bytes[2] & 0x0F;
        let c3 = bytes[2] >> 4;
        let c1_ = bytes[0] & 0x0F;
        let c2_ = bytes[0] >> 4;
        let c3_ = bytes[1] & 0x0F;
        let inverted_error = c1 != (!c1_ & 0x0F) || c2 != (!c2_ & 0x0F) || c3 != (!c3_ & 0x0F);

        let mut groups = [0u8; 4];
        for (i, g) in groups.iter_mut().enumerate() {
            *g = (((c1 >> i) & 1) << 2) | (((c2 >> i) & 1) << 1) | ((c3 >> i) & 1);
        }
        AccessBits { groups, inverted_error }
    }

    /// Packs four `[C1 C2 C3]` groups into sector trailer bytes 6, 7 and 8.
    pub fn encode(groups: [u8; 4]) -> [u8; 3] {
        let (mut c1, mut c2, mut c3) = (0u8, 0u8, 0u8);
        for (i, g) in groups.iter().enumerate() {
            c1 |= ((g >> 2) & 1) << i;
            c2 |= ((g >> 1) & 1) << i;
            c3 |= (g & 1) << i;
        }
        [
            ((!c2 & 0x0F) << 4) | (!c1 & 0x0F),
            (c1 << 4) | (!c3 & 0x0F),
            (c3 << 4) | c2,
        ]
    }

    /// Data group `group` is configured as a value block: [C1 C2 C3] = [110] or [001].
    pub fn is_value_block(&self, group: u8) -> bool {
        group < 3 && matches!(self.groups[group as usize], 0b110 | 0b001)
    }
}
