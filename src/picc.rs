//! PICC side of the protocol: ISO/IEC 14443-3 and MIFARE commands, UIDs and card types.

/// Commands sent to the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    REQA = 0x26, // REQuest command, Type A. Invites PICCs in state IDLE to go to READY and prepare for anticollision or selection. 7 bit frame.
    WUPA = 0x52, // Wake-UP command, Type A. Invites PICCs in state IDLE and HALT to go to READY(*) and prepare for anticollision or selection. 7 bit frame.
    CT = 0x88,   // Cascade Tag. Not really a command, but used during anti collision.
    SelCl1 = 0x93, // Anti collision/Select, Cascade Level 1
    SelCl2 = 0x95, // Anti collision/Select, Cascade Level 2
    SelCl3 = 0x97, // Anti collision/Select, Cascade Level 3
    HLTA = 0x50, // HaLT command, Type A. Instructs an ACTIVE PICC to go to state HALT.
    RATS = 0xE0, // Request command for Answer To Reset.
    // MIFARE Classic (MF1S503x section 9). Authenticate with MFAuthent first.
    // Read and write are also used for MIFARE Ultralight.
    MfAuthKeyA = 0x60,  // Perform authentication with Key A
    MfAuthKeyB = 0x61,  // Perform authentication with Key B
    MfRead = 0x30, // Reads one 16 byte block from the authenticated sector of the PICC. Also used for MIFARE Ultralight.
    MfWrite = 0xA0, // Writes one 16 byte block to the authenticated sector of the PICC. Called "COMPATIBILITY WRITE" for MIFARE Ultralight.
    MfDecrement = 0xC0, // Decrements the contents of a block and stores the result in the internal data register.
    MfIncrement = 0xC1, // Increments the contents of a block and stores the result in the internal data register.
    MfRestore = 0xC2,   // Reads the contents of a block into the internal data register.
    MfTransfer = 0xB0,  // Writes the contents of the internal data register to a block.
    // MIFARE Ultralight (MF0ICU1 section 8.6)
    UlWrite = 0xA2, // Writes one 4 byte page to the PICC.
}

/// The 4-bit MIFARE acknowledge. Anything else in a 4-bit reply is a NAK.
pub const MF_ACK: u8 = 0x0A;

/// SAK bit 3: the UID continues in the next cascade level.
pub const SAK_CASCADE: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiccType {
    Unknown,
    Iso14443_4,    // PICC compliant with ISO/IEC 14443-4
    Iso18092,      // PICC compliant with ISO/IEC 18092 (NFC)
    MifareMini,    // MIFARE Classic protocol, 320 bytes
    Mifare1k,      // MIFARE Classic protocol, 1KB
    Mifare4k,      // MIFARE Classic protocol, 4KB
    MifareUL,      // MIFARE Ultralight or Ultralight C
    MifarePlus,    // MIFARE Plus
    TNP3XXX,       // Only mentioned in NXP AN 10833 MIFARE Type Identification Procedure
    NotComplete,   // SAK indicates UID is not complete.
}

impl PiccType {
    /// Classifies a SAK byte (NXP AN10833, 3.2 Coding of Select Acknowledge).
    pub fn from_sak(sak: u8) -> PiccType {
        // bit 8 is ignored; some Infineon cards set it
        let sak = sak & 0x7F;
        if sak & SAK_CASCADE != 0 {
            return PiccType::NotComplete;
        }
        match sak {
            0x09 => PiccType::MifareMini,
            0x08 => PiccType::Mifare1k,
            0x18 => PiccType::Mifare4k,
            0x00 => PiccType::MifareUL,
            0x10 | 0x11 => PiccType::MifarePlus,
            0x01 => PiccType::TNP3XXX,
            0x20 => PiccType::Iso14443_4,
            0x40 => PiccType::Iso18092,
            _ => PiccType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PiccType::Iso14443_4 => "PICC compliant with ISO/IEC 14443-4",
            PiccType::Iso18092 => "PICC compliant with ISO/IEC 18092 (NFC)",
            PiccType::MifareMini => "MIFARE Mini, 320 bytes",
            PiccType::Mifare1k => "MIFARE 1KB",
            PiccType::Mifare4k => "MIFARE 4KB",
            PiccType::MifareUL => "MIFARE Ultralight or Ultralight C",
            PiccType::MifarePlus => "MIFARE Plus",
            PiccType::TNP3XXX => "MIFARE TNP3XXX",
            PiccType::NotComplete => "SAK indicates UID is not complete.",
            PiccType::Unknown => "Unknown type",
        }
    }

    /// Number of sectors of a MIFARE Classic card, `None` for other types.
    pub fn classic_sectors(&self) -> Option<u8> {
        match self {
            PiccType::MifareMini => Some(5),
            PiccType::Mifare1k => Some(16),
            PiccType::Mifare4k => Some(40),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidSize {
    Single = 4,
    Double = 7,
    Triple = 10,
}

impl UidSize {
    pub(crate) fn from_levels(levels: u8) -> Option<UidSize> {
        match levels {
            1 => Some(UidSize::Single),
            2 => Some(UidSize::Double),
            3 => Some(UidSize::Triple),
            _ => None,
        }
    }

    pub fn len(self) -> usize {
        self as usize
    }
}

/// UID of a selected PICC together with its SAK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uid {
    bytes: [u8; 10],
    size: UidSize,
    sak: u8,
}

impl Uid {
    pub(crate) fn new(bytes: [u8; 10], size: UidSize, sak: u8) -> Self {
        Uid { bytes, size, sak }
    }

    /// The 4, 7 or 10 UID bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.size.len()]
    }

    pub fn size(&self) -> UidSize {
        self.size
    }

    pub fn sak(&self) -> u8 {
        self.sak
    }

    pub fn picc_type(&self) -> PiccType {
        PiccType::from_sak(self.sak)
    }
}
