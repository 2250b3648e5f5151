//! Card reader loop: detects MIFARE Classic cards, reads the card id stored in an
//! identification block and hands the matching media URI to a player.
//!
//! The card id is a little endian `u16` in the first two bytes of the block. Cards are
//! not halted after reading; a card stays ACTIVE until it leaves the field and is
//! therefore reported once per presentation.

use alloc::string::String;

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, warn};

use crate::block::BLOCK_SIZE;
use crate::com::Com;
use crate::mfrc522::MFRC522;
use crate::mifare::{KeyType, MifareKey, DEFAULT_KEY};
use crate::picc::Uid;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub key_type: KeyType,
    pub key: MifareKey,
    /// Block holding the card id.
    pub block: u8,
    /// Delay between two detection attempts.
    pub poll_interval_ms: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            key_type: KeyType::A,
            key: DEFAULT_KEY,
            block: 8,
            poll_interval_ms: 500,
        }
    }
}

/// Maps card ids to media URIs.
pub trait CardDirectory {
    fn lookup(&mut self, card_id: u16) -> Option<String>;
}

pub trait Player {
    fn play(&mut self, uri: &str);
}

/// A card was presented to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardEvent {
    pub uid: Uid,
    pub card_id: u16,
    /// `None` when the directory does not know the card.
    pub uri: Option<String>,
}

pub struct CardReader<C> {
    mfrc522: MFRC522<C>,
    config: ReaderConfig,
}

impl<C: Com> CardReader<C> {
    pub fn new(mfrc522: MFRC522<C>, config: ReaderConfig) -> Self {
        CardReader { mfrc522, config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn mfrc522(&mut self) -> &mut MFRC522<C> {
        &mut self.mfrc522
    }

    pub fn release(self) -> MFRC522<C> {
        self.mfrc522
    }

    /// One detection attempt. `Ok(None)` when no new card answered.
    pub fn poll_once<D: CardDirectory>(&mut self, directory: &mut D) -> Result<Option<CardEvent>> {
        let uid = match self.select_card()? {
            Some(uid) => uid,
            None => return Ok(None),
        };

        let data = self.with_session(&uid, |mfrc522, block| mfrc522.mifare_read(block))?;
        let card_id = u16::from_le_bytes([data[0], data[1]]);
        info!("card #{} detected, UID {:02x?}", card_id, uid.as_bytes());

        let uri = directory.lookup(card_id);
        if uri.is_none() {
            warn!("no media registered for card #{}", card_id);
        }
        Ok(Some(CardEvent { uid, card_id, uri }))
    }

    /// Polls forever, starting playback for every known card.
    pub fn run<D, P, T>(&mut self, directory: &mut D, player: &mut P, delay: &mut T) -> !
    where
        D: CardDirectory,
        P: Player,
        T: DelayMs<u32>,
    {
        loop {
            match self.poll_once(directory) {
                Ok(Some(CardEvent { uri: Some(uri), card_id, .. })) => {
                    info!("card #{}: playing {}", card_id, uri);
                    player.play(&uri);
                }
                Ok(_) => {}
                Err(e) => debug!("card read aborted: {}", e),
            }
            delay.delay_ms(self.config.poll_interval_ms);
        }
    }

    /// Stores `card_id` in the identification block of the next presented card.
    ///
    /// Returns the UID of the written card, or `None` when no card was presented.
    pub fn write_card_id(&mut self, card_id: u16) -> Result<Option<Uid>> {
        let uid = match self.select_card()? {
            Some(uid) => uid,
            None => return Ok(None),
        };

        let mut data = [0u8; BLOCK_SIZE];
        data[..2].copy_from_slice(&card_id.to_le_bytes());
        self.with_session(&uid, |mfrc522, block| mfrc522.mifare_write(block, &data))?;
        info!("card #{} written, UID {:02x?}", card_id, uid.as_bytes());
        Ok(Some(uid))
    }

    fn select_card(&mut self) -> Result<Option<Uid>> {
        if !self.mfrc522.new_card_present() {
            return Ok(None);
        }
        match self.mfrc522.read_card_serial() {
            Ok(uid) => Ok(Some(uid)),
            // the card left the field between REQA and SELECT
            Err(Error::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Authenticates the identification block, runs `f` and leaves the session again.
    fn with_session<T, F>(&mut self, uid: &Uid, f: F) -> Result<T>
    where
        F: FnOnce(&mut MFRC522<C>, u8) -> Result<T>,
    {
        let block = self.config.block;
        if let Err(e) = self
            .mfrc522
            .authenticate(self.config.key_type, block, &self.config.key, uid)
        {
            warn!("failed to authenticate block {}: {}", block, e);
            return Err(e);
        }
        let result = f(&mut self.mfrc522, block);
        self.mfrc522.stop_crypto1()?;
        result
    }
}
