//! Diagnostic dumps of the chip registers and of card memory, written to the `log` facade.

use core::fmt;

use log::{debug, info, warn};

use crate::block::{AccessBits, Sector, ValueBlock};
use crate::com::Com;
use crate::mfrc522::MFRC522;
use crate::mifare::{KeyType, MifareKey};
use crate::picc::{PiccType, Uid};
use crate::register::Register;
use crate::{Error, Result};

/// Formats bytes as upper case hex, with a wider gap after every fourth byte.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(if i % 4 == 0 { "  " } else { " " })?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

pub fn dump_registers<C: Com>(mfrc: &mut MFRC522<C>) -> Result<()> {
    for reg in Register::DUMP {
        debug!("{:?}: {:#04x}", reg, mfrc.read_register(reg)?);
    }
    Ok(())
}

/// Dumps UID, type and, for MIFARE Classic and Ultralight, the memory of a selected PICC.
/// Classic sectors are read with key A `key`. The PICC is halted afterwards.
pub fn dump_card<C: Com>(mfrc: &mut MFRC522<C>, uid: &Uid, key: &MifareKey) -> Result<()> {
    let picc_type = uid.picc_type();
    info!("Card UID: {}", Hex(uid.as_bytes()));
    info!("PICC type: {}", picc_type.name());

    match picc_type {
        PiccType::MifareMini | PiccType::Mifare1k | PiccType::Mifare4k => {
            let sectors = picc_type.classic_sectors().unwrap_or(0);
            info!("Sector Block  0  1  2  3   4  5  6  7   8  9 10 11  12 13 14 15  AccessBits");
            for sector in (0..sectors).rev() {
                if let Err(e) = dump_classic_sector(mfrc, uid, key, sector) {
                    warn!("sector {}: {}", sector, e);
                }
            }
            // halt before leaving the encrypted session
            let halted = mfrc.halt_a();
            mfrc.stop_crypto1()?;
            halted
        }
        PiccType::MifareUL => {
            dump_ultralight(mfrc)?;
            mfrc.halt_a()
        }
        PiccType::Iso14443_4 | PiccType::Iso18092 | PiccType::MifarePlus | PiccType::TNP3XXX => {
            info!("Dumping memory contents not implemented for that PICC type.");
            mfrc.halt_a()
        }
        PiccType::Unknown | PiccType::NotComplete => mfrc.halt_a(),
    }
}

/// Dumps one MIFARE Classic sector, highest block first, annotating access bits and
/// value blocks. Fails only when the sector cannot be authenticated.
pub fn dump_classic_sector<C: Com>(
    mfrc: &mut MFRC522<C>,
    uid: &Uid,
    key: &MifareKey,
    sector: u8,
) -> Result<()> {
    let sector = Sector::new(sector).ok_or(Error::Invalid)?;
    // Only key A can always read the access bits.
    mfrc.authenticate(KeyType::A, sector.first_block, key, uid)?;

    let mut access: Option<AccessBits> = None;
    for offset in (0..sector.blocks).rev() {
        let addr = sector.first_block + offset;
        let label = if offset == sector.blocks - 1 { sector.number as i16 } else { -1 };
        let data = match mfrc.mifare_read(addr) {
            Ok(data) => data,
            Err(e) => {
                info!("{} {:>4}  read failed: {}", SectorLabel(label), addr, e);
                continue;
            }
        };
        if offset == sector.blocks - 1 {
            access = Some(AccessBits::parse(&[data[6], data[7], data[8]]));
        }

        let group = sector.group_of(offset);
        let first_in_group = sector.blocks == 4 || group == 3 || group != (offset + 1) / 5;
        match access {
            Some(bits) if first_in_group => {
                let g = bits.groups[group as usize];
                info!(
                    "{} {:>4}  {}  [ {} {} {} ]{}{}",
                    SectorLabel(label),
                    addr,
                    Hex(&data),
                    (g >> 2) & 1,
                    (g >> 1) & 1,
                    g & 1,
                    if bits.inverted_error { " Inverted access bits did not match!" } else { "" },
                    ValueNote(bits, group, &data),
                );
            }
            Some(bits) => {
                info!("{} {:>4}  {}{}", SectorLabel(label), addr, Hex(&data), ValueNote(bits, group, &data));
            }
            None => info!("{} {:>4}  {}", SectorLabel(label), addr, Hex(&data)),
        }
    }
    Ok(())
}

/// Dumps the 16 pages of a MIFARE Ultralight.
pub fn dump_ultralight<C: Com>(mfrc: &mut MFRC522<C>) -> Result<()> {
    info!("Page  0  1  2  3");
    // Read returns 4 pages at a time.
    for page in (0u8..16).step_by(4) {
        let data = mfrc.mifare_read(page)?;
        for (i, chunk) in data.chunks(4).enumerate() {
            info!("{:>4}  {}", page as usize + i, Hex(chunk));
        }
    }
    Ok(())
}

struct SectorLabel(i16);

impl fmt::Display for SectorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            f.write_str("      ")
        } else {
            write!(f, "{:>6}", self.0)
        }
    }
}

struct ValueNote<'a>(AccessBits, u8, &'a [u8; 16]);

impl fmt::Display for ValueNote<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ValueNote(bits, group, data) = self;
        if !bits.is_value_block(*group) {
            return Ok(());
        }
        match ValueBlock::decode(data) {
            Ok(v) => write!(f, " Value={:#x} Adr={:#04x}", v.value, v.addr),
            Err(_) => f.write_str(" Value block layout broken"),
        }
    }
}
