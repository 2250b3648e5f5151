//! MIFARE Classic session and memory commands.
//!
//! A sector must be authenticated with [`MFRC522::authenticate`] before its blocks can be
//! read or written. The chip then encrypts all traffic until [`MFRC522::stop_crypto1`] is
//! called; no other card can be talked to before that.

use log::debug;

use crate::block::{ValueBlock, BLOCK_SIZE};
use crate::com::Com;
use crate::mfrc522::MFRC522;
use crate::picc::{Command, Uid, MF_ACK};
use crate::register::{PcdCommand, Register, IDLE_IRQ, MF_CRYPTO1_ON};
use crate::{Error, Result};

pub type MifareKey = [u8; 6];

const BACKDOOR_UNLOCK_1: u8 = 0x40;
const BACKDOOR_UNLOCK_2: u8 = 0x43;

/// Factory default key for both key A and key B.
pub const DEFAULT_KEY: MifareKey = [0xFF; 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    #[default]
    A,
    B,
}

impl KeyType {
    fn command(self) -> Command {
        match self {
            KeyType::A => Command::MfAuthKeyA,
            KeyType::B => Command::MfAuthKeyB,
        }
    }
}

impl<C: Com> MFRC522<C> {
    /// Three pass authentication of the sector containing `block` (MF1S503x 10.1).
    ///
    /// A wrong key is not answered by the card, so it is reported as [`Error::Timeout`].
    pub fn authenticate(
        &mut self,
        key_type: KeyType,
        block: u8,
        key: &MifareKey,
        uid: &Uid,
    ) -> Result<()> {
        let mut frame = [0u8; 12];
        frame[0] = key_type.command() as u8;
        frame[1] = block;
        frame[2..8].copy_from_slice(key);
        frame[8..12].copy_from_slice(&uid.as_bytes()[..4]);

        self.communicate(PcdCommand::MFAuthent, IDLE_IRQ, &frame, None, 0, 0, false)
            .map_err(|e| {
                debug!("authentication of block {} with key {:?} failed: {}", block, key_type, e);
                e
            })?;
        Ok(())
    }

    /// Leaves the authenticated state. Must be called after communicating with an
    /// authenticated PICC, otherwise no new communication can start.
    pub fn stop_crypto1(&mut self) -> Result<()> {
        self.clear_register_bitmask(Register::Status2Reg, MF_CRYPTO1_ON)
    }

    /// Reads one 16 byte block. On MIFARE Ultralight this returns pages `block..block + 4`.
    pub fn mifare_read(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let mut cmd = [Command::MfRead as u8, block, 0, 0];
        let crc = self.calculate_crc(&cmd[..2])?;
        cmd[2..].copy_from_slice(&crc);

        let mut buffer = [0u8; BLOCK_SIZE + 2];
        let received = self
            .transceive_data(&cmd, Some(&mut buffer), 0, 0, true)
            .map_err(|e| {
                debug!("read of block {} failed: {}", block, e);
                e
            })?;
        if received.len != BLOCK_SIZE + 2 {
            return Err(Error::Communication);
        }

        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(&buffer[..BLOCK_SIZE]);
        Ok(data)
    }

    /// Writes one 16 byte block. For MIFARE Ultralight only the first 4 bytes land in
    /// page `block`; use [`mifare_ultralight_write`](Self::mifare_ultralight_write) there.
    pub fn mifare_write(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.mifare_transceive(&[Command::MfWrite as u8, block], false)?;
        self.mifare_transceive(data, false)
    }

    /// Writes one 4 byte page to a MIFARE Ultralight.
    pub fn mifare_ultralight_write(&mut self, page: u8, data: &[u8; 4]) -> Result<()> {
        let mut cmd = [0u8; 6];
        cmd[0] = Command::UlWrite as u8;
        cmd[1] = page;
        cmd[2..].copy_from_slice(data);
        self.mifare_transceive(&cmd, false)
    }

    /// Adds `delta` to the value block `block` and keeps the result in the card's transfer
    /// buffer. Follow with [`mifare_transfer`](Self::mifare_transfer) to store it.
    pub fn mifare_increment(&mut self, block: u8, delta: i32) -> Result<()> {
        self.mifare_two_step(Command::MfIncrement, block, delta)
    }

    /// Subtracts `delta` from the value block `block` into the transfer buffer.
    pub fn mifare_decrement(&mut self, block: u8, delta: i32) -> Result<()> {
        self.mifare_two_step(Command::MfDecrement, block, delta)
    }

    /// Copies the value block `block` into the transfer buffer.
    pub fn mifare_restore(&mut self, block: u8) -> Result<()> {
        // The card needs an operand even though restore ignores it.
        self.mifare_two_step(Command::MfRestore, block, 0)
    }

    /// Writes the transfer buffer to `block`.
    pub fn mifare_transfer(&mut self, block: u8) -> Result<()> {
        self.mifare_transceive(&[Command::MfTransfer as u8, block], false)
    }

    /// Reads `block` as a value block.
    pub fn mifare_get_value(&mut self, block: u8) -> Result<i32> {
        let data = self.mifare_read(block)?;
        let value = ValueBlock::decode(&data).map_err(|e| {
            debug!("block {} is not a value block", block);
            e
        })?;
        Ok(value.value)
    }

    /// Formats `block` as a value block holding `value`.
    pub fn mifare_set_value(&mut self, block: u8, value: i32) -> Result<()> {
        self.mifare_write(block, &ValueBlock::new(value, block).encode())
    }

    /// Sends `data` plus CRC_A and expects the 4-bit MIFARE ACK.
    ///
    /// With `accept_timeout` a silent card counts as success; the second step of
    /// increment, decrement and restore is never acknowledged.
    pub fn mifare_transceive(&mut self, data: &[u8], accept_timeout: bool) -> Result<()> {
        if data.len() > BLOCK_SIZE {
            return Err(Error::Invalid);
        }

        let mut cmd = [0u8; BLOCK_SIZE + 2];
        cmd[..data.len()].copy_from_slice(data);
        let crc = self.calculate_crc(data)?;
        cmd[data.len()..data.len() + 2].copy_from_slice(&crc);
        let send = &cmd[..data.len() + 2];

        let mut back = [0u8; BLOCK_SIZE + 2];
        let received = match self.transceive_data(send, Some(&mut back), 0, 0, false) {
            Err(Error::Timeout) if accept_timeout => return Ok(()),
            Err(e) => return Err(e),
            Ok(received) => received,
        };
        if received.len != 1 || received.valid_bits != 4 {
            return Err(Error::Communication);
        }
        if back[0] != MF_ACK {
            debug!("MIFARE NAK {:#04x}", back[0]);
            return Err(Error::MifareNack);
        }
        Ok(())
    }

    /// Unlocks block 0 of UID changeable MIFARE Classic clones with HLTA, `0x40` (7 bits),
    /// `0x43`. Works on unselected cards and on cards readers no longer recognise.
    pub fn mifare_open_uid_backdoor(&mut self) -> Result<()> {
        // the card usually answers with silence; anything else is not fatal here
        if let Err(e) = self.halt_a() {
            debug!("HLTA before backdoor: {}", e);
        }
        self.backdoor_step(BACKDOOR_UNLOCK_1, 7)?;
        self.backdoor_step(BACKDOOR_UNLOCK_2, 0)
    }

    /// Writes `new_uid` and its BCC into block 0 of a UID changeable card, keeping the
    /// manufacturer data. Sector 0 must use the default key A.
    ///
    /// When `uid` is no longer selected the next card in the field is selected instead.
    /// The card is woken up with WUPA afterwards.
    pub fn mifare_set_uid(&mut self, uid: &Uid, new_uid: &[u8]) -> Result<()> {
        // UID and BCC have to fit into one block
        if new_uid.is_empty() || new_uid.len() >= BLOCK_SIZE {
            return Err(Error::Invalid);
        }

        match self.authenticate(KeyType::A, 1, &DEFAULT_KEY, uid) {
            Ok(()) => {}
            Err(Error::Timeout) => {
                if !self.new_card_present() {
                    return Err(Error::Timeout);
                }
                let uid = self.read_card_serial()?;
                self.authenticate(KeyType::A, 1, &DEFAULT_KEY, &uid)?;
            }
            Err(e) => return Err(e),
        }

        let mut block0 = self.mifare_read(0)?;
        block0[..new_uid.len()].copy_from_slice(new_uid);
        block0[new_uid.len()] = new_uid.iter().fold(0, |bcc, b| bcc ^ b);
        self.stop_crypto1()?;

        self.mifare_open_uid_backdoor()?;
        self.mifare_write(0, &block0)?;

        if let Err(e) = self.wakeup_a() {
            debug!("WUPA after UID change: {}", e);
        }
        Ok(())
    }

    /// Overwrites block 0 of a UID changeable card with UID `01 02 03 04` so that it can
    /// be selected again.
    pub fn mifare_unbrick_uid_sector(&mut self) -> Result<()> {
        self.mifare_open_uid_backdoor()?;
        let mut block0 = [0u8; BLOCK_SIZE];
        block0[..5].copy_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x04]);
        self.mifare_write(0, &block0)
    }

    fn backdoor_step(&mut self, cmd: u8, tx_last_bits: u8) -> Result<()> {
        let mut back = [0u8; 2];
        let received = self
            .transceive_data(&[cmd], Some(&mut back), tx_last_bits, 0, false)
            .map_err(|e| {
                debug!("no answer to backdoor command {:#04x}: {}", cmd, e);
                e
            })?;
        if received.len != 1 || back[0] != MF_ACK {
            debug!("bad answer {:#04x} to backdoor command {:#04x}", back[0], cmd);
            return Err(Error::Communication);
        }
        Ok(())
    }

    fn mifare_two_step(&mut self, command: Command, block: u8, operand: i32) -> Result<()> {
        self.mifare_transceive(&[command as u8, block], false)?;
        self.mifare_transceive(&operand.to_le_bytes(), true)
    }
}
