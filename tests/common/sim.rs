//! Register-level model of an MFRC522 with ISO/IEC 14443-3 type A cards in its field.
//!
//! The model implements enough of the chip for the driver: FIFO, CommandReg (Idle, Mem,
//! CalcCRC, Transceive, MFAuthent, SoftReset), the interrupt request registers with their
//! Set1 write semantics, CollReg and the digital self-test. Cards answer REQA/WUPA,
//! anticollision and SELECT bit-exactly, including collisions between several cards.
//! Crypto1 is not modelled; authentication only checks the key.
//!
//! Faults can be injected through the public `SimChip` fields: corrupted CRC_A on card
//! answers, a fixed CollReg content and a fixed FIFO level.

use std::collections::VecDeque;

use rfid_picc::register::Register;
use rfid_picc::{Com, ComError};

// Datasheet 16.1.1, version 2.0.
const SELF_TEST_V2_0: [u8; 64] = [
    0x00, 0xEB, 0x66, 0xBA, 0x57, 0xBF, 0x23, 0x95, 0xD0, 0xE3, 0x0D, 0x3D, 0x27, 0x89, 0x5C, 0xDE,
    0x9D, 0x3B, 0xA7, 0x00, 0x21, 0x5B, 0x89, 0x82, 0x51, 0x3A, 0xEB, 0x02, 0x0C, 0xA5, 0x00, 0x49,
    0x7C, 0x84, 0x4D, 0xB3, 0xCC, 0xD2, 0x1B, 0x81, 0x5D, 0x48, 0x76, 0xD5, 0x71, 0x61, 0x21, 0xA9,
    0x86, 0x96, 0x83, 0x38, 0xCF, 0x9D, 0x5B, 0x6D, 0xDC, 0x15, 0xBA, 0x3E, 0x7D, 0x95, 0x3B, 0x2F,
];

const CMD_MEM: u8 = 0x01;
const CMD_CALC_CRC: u8 = 0x03;
const CMD_TRANSCEIVE: u8 = 0x0C;
const CMD_MF_AUTHENT: u8 = 0x0E;
const CMD_SOFT_RESET: u8 = 0x0F;

const TIMER_IRQ: u8 = 0x01;
const IDLE_IRQ: u8 = 0x10;
const RX_IRQ: u8 = 0x20;
const CRC_IRQ: u8 = 0x04;
const COLL_ERR: u8 = 0x08;
const CRYPTO1_ON: u8 = 0x08;

const ACK: u8 = 0x0A;
const NAK: u8 = 0x04;

/// Bitwise CRC_A, ISO/IEC 14443-3 annex B: preset 0x6363, reflected polynomial 0x8408.
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    crc.to_le_bytes()
}

/// MIFARE value block layout, built independently of the driver.
pub fn value_block(value: i32, addr: u8) -> [u8; 16] {
    let v = value.to_le_bytes();
    let n = (!value).to_le_bytes();
    [
        v[0], v[1], v[2], v[3], n[0], n[1], n[2], n[3], v[0], v[1], v[2], v[3], addr, !addr,
        addr, !addr,
    ]
}

fn parse_value_block(block: &[u8]) -> Option<(i32, u8)> {
    let value = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    if value_block(value, block[12]) == block[..16] {
        Some((value, block[12]))
    } else {
        None
    }
}

fn bit(bytes: &[u8], i: usize) -> u8 {
    (bytes[i / 8] >> (i % 8)) & 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Idle,
    Ready,
    Active,
    Halt,
}

/// UID backdoor of "magic" MIFARE Classic clones: HLTA, 0x40 (7 bits), 0x43.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backdoor {
    Closed,
    Armed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Write(u8),
    Value(u8, u8),
}

#[derive(Debug, Clone)]
pub struct SimCard {
    pub uid: Vec<u8>,
    /// SAK of the last cascade level.
    pub sak: u8,
    pub key_a: [u8; 6],
    pub key_b: [u8; 6],
    pub memory: Vec<u8>,
    pub state: CardState,
    ultralight: bool,
    magic: bool,
    backdoor: Backdoor,
    /// Cascade levels completed since REQA/WUPA.
    level: usize,
    auth_sector: Option<u8>,
    pending: Option<Pending>,
    transfer: Option<(i32, u8)>,
}

impl SimCard {
    /// MIFARE Classic 1K in transport configuration: all keys FF, access bits FF 07 80.
    pub fn classic_1k(uid: &[u8]) -> Self {
        let mut memory = vec![0u8; 64 * 16];
        for trailer in (3..64).step_by(4) {
            let t = &mut memory[trailer * 16..trailer * 16 + 16];
            t[6..10].copy_from_slice(&[0xFF, 0x07, 0x80, 0x69]);
            t[10..16].copy_from_slice(&[0xFF; 6]);
        }
        memory[..uid.len().min(16)].copy_from_slice(&uid[..uid.len().min(16)]);
        Self::new(uid, 0x08, memory, false)
    }

    /// MIFARE Ultralight, 16 pages of 4 bytes.
    pub fn ultralight(uid: &[u8]) -> Self {
        let mut memory = vec![0u8; 64];
        for (i, b) in memory.iter_mut().enumerate().skip(16) {
            *b = i as u8;
        }
        Self::new(uid, 0x00, memory, true)
    }

    fn new(uid: &[u8], sak: u8, memory: Vec<u8>, ultralight: bool) -> Self {
        assert!(matches!(uid.len(), 4 | 7 | 10));
        SimCard {
            uid: uid.to_vec(),
            sak,
            key_a: [0xFF; 6],
            key_b: [0xFF; 6],
            memory,
            state: CardState::Idle,
            ultralight,
            magic: false,
            backdoor: Backdoor::Closed,
            level: 0,
            auth_sector: None,
            pending: None,
            transfer: None,
        }
    }

    /// A 1K clone whose block 0 can be written after the backdoor sequence.
    pub fn magic_1k(uid: &[u8]) -> Self {
        let mut card = Self::classic_1k(uid);
        card.magic = true;
        card
    }

    pub fn with_key_a(mut self, key: [u8; 6]) -> Self {
        self.key_a = key;
        self
    }

    pub fn block(&self, block: u8) -> &[u8] {
        let start = block as usize * 16;
        &self.memory[start..start + 16]
    }

    pub fn set_block(&mut self, block: u8, data: &[u8; 16]) {
        let start = block as usize * 16;
        self.memory[start..start + 16].copy_from_slice(data);
    }

    fn levels(&self) -> usize {
        (self.uid.len() - 1) / 3
    }

    /// UID bytes of cascade level `level` (0 based) followed by their BCC.
    fn level_frame(&self, level: usize) -> [u8; 5] {
        let mut frame = [0u8; 5];
        if level + 1 < self.levels() {
            frame[0] = 0x88;
            frame[1..4].copy_from_slice(&self.uid[3 * level..3 * level + 3]);
        } else {
            frame[..4].copy_from_slice(&self.uid[3 * level..3 * level + 4]);
        }
        frame[4] = frame[0] ^ frame[1] ^ frame[2] ^ frame[3];
        frame
    }

    fn sector_of(block: u8) -> u8 {
        if block < 128 {
            block / 4
        } else {
            32 + (block - 128) / 16
        }
    }

    fn authenticated_for(&self, block: u8, crypto_on: bool) -> bool {
        crypto_on && self.auth_sector == Some(Self::sector_of(block))
    }

    /// Answer to a standard frame while ACTIVE. `None` is silence.
    fn mifare(&mut self, frame: &[u8], crypto_on: bool) -> Option<(Vec<u8>, u8)> {
        let ack = Some((vec![ACK], 4));
        let nak = Some((vec![NAK], 4));
        if frame.len() < 3 || crc_a(&frame[..frame.len() - 2]) != frame[frame.len() - 2..] {
            return None;
        }
        let payload = &frame[..frame.len() - 2];

        if let Some(pending) = self.pending.take() {
            return match pending {
                Pending::Write(block) if payload.len() == 16 => {
                    let data: [u8; 16] = payload.try_into().ok()?;
                    self.set_block(block, &data);
                    if block == 0 && self.backdoor == Backdoor::Open && self.uid.len() == 4 {
                        self.uid = data[..4].to_vec();
                    }
                    ack
                }
                Pending::Value(cmd, block) if payload.len() == 4 => {
                    let operand = i32::from_le_bytes(payload.try_into().ok()?);
                    let (value, addr) = parse_value_block(self.block(block))?;
                    let result = match cmd {
                        0xC1 => value.wrapping_add(operand),
                        0xC0 => value.wrapping_sub(operand),
                        _ => value,
                    };
                    self.transfer = Some((result, addr));
                    // the second step is never acknowledged
                    None
                }
                _ => nak,
            };
        }

        let (cmd, addr) = (payload[0], *payload.get(1).unwrap_or(&0));
        if self.ultralight {
            return match (cmd, payload.len()) {
                (0x30, 2) => {
                    let start = (addr as usize % 16) * 4;
                    let mut data: Vec<u8> =
                        (0..16).map(|i| self.memory[(start + i) % self.memory.len()]).collect();
                    let crc = crc_a(&data);
                    data.extend_from_slice(&crc);
                    Some((data, 0))
                }
                (0xA2, 6) if (2..16).contains(&addr) => {
                    let start = addr as usize * 4;
                    self.memory[start..start + 4].copy_from_slice(&payload[2..6]);
                    ack
                }
                _ => nak,
            };
        }

        let unlocked = self.backdoor == Backdoor::Open && addr == 0;
        if payload.len() != 2 || !(unlocked || self.authenticated_for(addr, crypto_on)) {
            return nak;
        }
        match cmd {
            0x30 => {
                let mut data = self.block(addr).to_vec();
                let crc = crc_a(&data);
                data.extend_from_slice(&crc);
                Some((data, 0))
            }
            0xA0 => {
                self.pending = Some(Pending::Write(addr));
                ack
            }
            0xC0 | 0xC1 | 0xC2 if parse_value_block(self.block(addr)).is_some() => {
                self.pending = Some(Pending::Value(cmd, addr));
                ack
            }
            0xB0 => match self.transfer {
                Some((value, src)) => {
                    self.set_block(addr, &value_block(value, src));
                    ack
                }
                None => nak,
            },
            _ => nak,
        }
    }
}

enum Reply {
    Silent,
    Data(Vec<u8>, u8),
    /// Partial data and the 1 based position of the first colliding bit within the level.
    Collision(Vec<u8>, usize),
}

pub struct SimChip {
    regs: [u8; 64],
    fifo: VecDeque<u8>,
    pub cards: Vec<SimCard>,
    /// The chip never raises an interrupt.
    pub dead: bool,
    /// Flip the last CRC_A byte of every card answer that carries one.
    pub corrupt_crc: bool,
    /// CollPos and CollPosNotValid bits reported on every collision.
    pub coll_reg: Option<u8>,
    /// Value read from FIFOLevelReg instead of the real level.
    pub fifo_level: Option<u8>,
    pub com_irq_reads: usize,
    pub transceives: usize,
}

impl SimChip {
    pub fn new(cards: Vec<SimCard>) -> Self {
        let mut chip = SimChip {
            regs: [0u8; 64],
            fifo: VecDeque::new(),
            cards,
            dead: false,
            corrupt_crc: false,
            coll_reg: None,
            fifo_level: None,
            com_irq_reads: 0,
            transceives: 0,
        };
        chip.soft_reset();
        chip
    }

    pub fn dead() -> Self {
        let mut chip = SimChip::new(Vec::new());
        chip.dead = true;
        chip
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.regs[reg.addr() as usize]
    }

    fn soft_reset(&mut self) {
        self.regs = [0u8; 64];
        self.fifo.clear();
        let r = &mut self.regs;
        r[Register::ComIEnReg.addr() as usize] = 0x80;
        r[Register::ComIrqReg.addr() as usize] = 0x14;
        r[Register::CollReg.addr() as usize] = 0x80;
        r[Register::ModeReg.addr() as usize] = 0x3F;
        r[Register::TxControlReg.addr() as usize] = 0x80;
        r[Register::RFCfgReg.addr() as usize] = 0x48;
        r[Register::ModWidthReg.addr() as usize] = 0x26;
        r[Register::VersionReg.addr() as usize] = 0x92;
    }

    fn raise(&mut self, reg: Register, bits: u8) {
        if !self.dead {
            self.regs[reg.addr() as usize] |= bits;
        }
    }

    fn crypto_on(&self) -> bool {
        self.reg(Register::Status2Reg) & CRYPTO1_ON != 0
    }

    fn execute(&mut self, command: u8) {
        match command {
            CMD_SOFT_RESET => self.soft_reset(),
            CMD_MEM => self.fifo.clear(),
            CMD_CALC_CRC => {
                let data: Vec<u8> = self.fifo.drain(..).collect();
                if self.reg(Register::AutoTestReg) & 0x0F == 0x09 {
                    self.fifo.extend(SELF_TEST_V2_0.iter());
                } else {
                    let crc = crc_a(&data);
                    self.regs[Register::CRCResultRegLow.addr() as usize] = crc[0];
                    self.regs[Register::CRCResultRegHigh.addr() as usize] = crc[1];
                }
                self.raise(Register::DivIrqReg, CRC_IRQ);
            }
            CMD_MF_AUTHENT => self.authenticate(),
            _ => {}
        }
    }

    fn authenticate(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        self.regs[Register::ErrorReg.addr() as usize] = 0;
        let ok = frame.len() == 12
            && match self.cards.iter_mut().find(|c| c.state == CardState::Active) {
                Some(card) => {
                    let key = if frame[0] == 0x61 { card.key_b } else { card.key_a };
                    if frame[2..8] == key && frame[8..12] == card.uid[..4] {
                        card.auth_sector = Some(SimCard::sector_of(frame[1]));
                        true
                    } else {
                        // A failed authentication sends the card back to IDLE.
                        card.state = CardState::Idle;
                        card.auth_sector = None;
                        false
                    }
                }
                None => false,
            };
        if ok {
            self.regs[Register::Status2Reg.addr() as usize] |= CRYPTO1_ON;
            self.raise(Register::ComIrqReg, IDLE_IRQ);
        } else {
            self.raise(Register::ComIrqReg, TIMER_IRQ);
        }
    }

    fn transceive(&mut self) {
        self.transceives += 1;
        let tx: Vec<u8> = self.fifo.drain(..).collect();
        let framing = self.reg(Register::BitFramingReg);
        let tx_last_bits = framing & 0x07;
        let rx_align = (framing >> 4) & 0x07;

        self.regs[Register::ErrorReg.addr() as usize] = 0;
        self.regs[Register::ControlReg.addr() as usize] = 0;
        self.regs[Register::CollReg.addr() as usize] &= 0x80;

        match self.answer(&tx, tx_last_bits, rx_align) {
            Reply::Silent => self.raise(Register::ComIrqReg, TIMER_IRQ),
            Reply::Data(mut data, last_bits) => {
                if self.corrupt_crc && data.len() >= 3 && last_bits == 0 {
                    if let Some(last) = data.last_mut() {
                        *last ^= 0xFF;
                    }
                }
                self.fifo.extend(data);
                self.regs[Register::ControlReg.addr() as usize] = last_bits;
                self.raise(Register::ComIrqReg, RX_IRQ | IDLE_IRQ);
            }
            Reply::Collision(data, pos) => {
                self.fifo.extend(data);
                self.regs[Register::ErrorReg.addr() as usize] = COLL_ERR;
                let coll = self.coll_reg.unwrap_or((pos & 0x1F) as u8);
                self.regs[Register::CollReg.addr() as usize] |= coll & 0x3F;
                self.raise(Register::ComIrqReg, RX_IRQ | IDLE_IRQ);
            }
        }
    }

    fn answer(&mut self, tx: &[u8], tx_last_bits: u8, rx_align: u8) -> Reply {
        if tx.is_empty() {
            return Reply::Silent;
        }
        if tx.len() == 1 && tx_last_bits == 7 {
            return match tx[0] {
                0x40 => self.backdoor(Backdoor::Closed, Backdoor::Armed),
                command => self.request(command),
            };
        }
        if tx == [0x43] {
            return self.backdoor(Backdoor::Armed, Backdoor::Open);
        }
        match tx[0] {
            0x93 | 0x95 | 0x97 if tx.len() >= 2 => {
                let level = ((tx[0] - 0x93) / 2) as usize;
                if tx[1] == 0x70 {
                    self.select(level, tx)
                } else {
                    self.anticollision(level, tx, rx_align)
                }
            }
            0x50 if tx.len() == 4 && tx[1] == 0x00 && crc_a(&tx[..2]) == tx[2..] => {
                if let Some(card) = self.cards.iter_mut().find(|c| c.state == CardState::Active) {
                    card.state = CardState::Halt;
                    card.auth_sector = None;
                }
                for card in self.cards.iter_mut() {
                    card.backdoor = Backdoor::Closed;
                }
                Reply::Silent
            }
            _ => {
                let crypto_on = self.crypto_on();
                match self.cards.iter_mut().find(|c| c.state == CardState::Active) {
                    Some(card) => match card.mifare(tx, crypto_on) {
                        Some((data, bits)) => Reply::Data(data, bits),
                        None => Reply::Silent,
                    },
                    None => Reply::Silent,
                }
            }
        }
    }

    fn request(&mut self, command: u8) -> Reply {
        let mut answered = false;
        for card in self.cards.iter_mut() {
            let wakes = match command {
                0x26 => card.state == CardState::Idle,
                0x52 => matches!(card.state, CardState::Idle | CardState::Halt),
                _ => false,
            };
            if wakes {
                card.state = CardState::Ready;
                card.level = 0;
                answered = true;
            }
        }
        if answered {
            Reply::Data(vec![0x04, 0x00], 0)
        } else {
            Reply::Silent
        }
    }

    /// Magic cards answer the backdoor commands in any state; an open card is ACTIVE.
    fn backdoor(&mut self, from: Backdoor, to: Backdoor) -> Reply {
        let mut answered = false;
        for card in self.cards.iter_mut().filter(|c| c.magic && c.backdoor == from) {
            card.backdoor = to;
            if to == Backdoor::Open {
                card.state = CardState::Active;
            }
            answered = true;
        }
        if answered {
            Reply::Data(vec![ACK], 4)
        } else {
            Reply::Silent
        }
    }

    fn participants(&self, level: usize) -> Vec<usize> {
        (0..self.cards.len())
            .filter(|&i| {
                let c = &self.cards[i];
                c.state == CardState::Ready && c.level == level && level < c.levels()
            })
            .collect()
    }

    fn anticollision(&mut self, level: usize, tx: &[u8], rx_align: u8) -> Reply {
        let nvb = tx[1];
        let known = ((nvb >> 4) as usize).saturating_sub(2) * 8 + (nvb & 0x0F) as usize;
        let sent = &tx[2..];
        let responders: Vec<[u8; 5]> = self
            .participants(level)
            .into_iter()
            .map(|i| self.cards[i].level_frame(level))
            .filter(|frame| (0..known).all(|i| bit(sent, i) == bit(frame, i)))
            .collect();
        let first = match responders.first() {
            Some(frame) => *frame,
            None => return Reply::Silent,
        };

        let collision = (known..40).find(|&i| responders.iter().any(|f| bit(f, i) != bit(&first, i)));
        let mut merged = first;
        if let Some(pos) = collision {
            // ValuesAfterColl=0: everything from the collision on reads as 0
            for i in pos..40 {
                merged[i / 8] &= !(1 << (i % 8));
            }
        }
        let mut data = merged[known / 8..].to_vec();
        data[0] &= 0xFFu8 << rx_align;
        match collision {
            Some(pos) => Reply::Collision(data, pos + 1),
            None => Reply::Data(data, 0),
        }
    }

    fn select(&mut self, level: usize, tx: &[u8]) -> Reply {
        if tx.len() != 9 || crc_a(&tx[..7]) != tx[7..] {
            return Reply::Silent;
        }
        // Cards sharing a cascade tag frame all move on to the next level.
        let matching: Vec<usize> = self
            .participants(level)
            .into_iter()
            .filter(|&i| self.cards[i].level_frame(level) == tx[2..7])
            .collect();
        let first = match matching.first() {
            Some(&i) => i,
            None => return Reply::Silent,
        };

        for (i, card) in self.cards.iter_mut().enumerate() {
            if !matching.contains(&i) && card.state == CardState::Ready {
                card.state = CardState::Idle;
            }
        }
        for &i in &matching {
            let card = &mut self.cards[i];
            card.level = level + 1;
            if card.level == card.levels() {
                card.state = CardState::Active;
            }
        }
        let card = &self.cards[first];
        let sak = if card.level < card.levels() { 0x04 } else { card.sak };
        let crc = crc_a(&[sak]);
        Reply::Data(vec![sak, crc[0], crc[1]], 0)
    }
}

impl Com for SimChip {
    fn read(&mut self, reg: Register, value: &mut [u8]) -> Result<(), ComError> {
        for v in value.iter_mut() {
            *v = match reg {
                Register::FIFODataReg => self.fifo.pop_front().unwrap_or(0),
                Register::FIFOLevelReg => {
                    self.fifo_level.unwrap_or(self.fifo.len().min(0x7F) as u8)
                }
                Register::ComIrqReg => {
                    self.com_irq_reads += 1;
                    self.reg(reg)
                }
                _ => self.reg(reg),
            };
        }
        Ok(())
    }

    fn write(&mut self, reg: Register, value: &[u8]) -> Result<(), ComError> {
        for &v in value {
            let addr = reg.addr() as usize;
            match reg {
                Register::FIFODataReg => self.fifo.push_back(v),
                Register::FIFOLevelReg => {
                    if v & 0x80 != 0 {
                        self.fifo.clear();
                    }
                }
                Register::ComIrqReg | Register::DivIrqReg => {
                    // Set1: bit 7 selects whether the marked bits are set or cleared
                    if v & 0x80 != 0 {
                        self.regs[addr] |= v & 0x7F;
                    } else {
                        self.regs[addr] &= !v;
                    }
                }
                Register::CommandReg => {
                    self.regs[addr] = v & 0x3F;
                    self.execute(v & 0x0F);
                }
                Register::BitFramingReg => {
                    self.regs[addr] = v & 0x7F;
                    if v & 0x80 != 0 && self.reg(Register::CommandReg) & 0x0F == CMD_TRANSCEIVE {
                        self.transceive();
                    }
                }
                Register::CollReg => self.regs[addr] = (self.regs[addr] & 0x7F) | (v & 0x80),
                Register::Status2Reg => {
                    self.regs[addr] = v;
                    if v & CRYPTO1_ON == 0 {
                        for card in self.cards.iter_mut() {
                            card.auth_sector = None;
                        }
                    }
                }
                Register::VersionReg => {}
                _ => self.regs[addr] = v,
            }
        }
        Ok(())
    }
}
