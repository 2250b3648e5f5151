use core::task::Poll;

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, trace};

use crate::com::Com;
use crate::config::{Config, RxGain};
use crate::picc;
use crate::poll::{poll_bounded, CRC_BUDGET, TRANSCEIVE_BUDGET};
use crate::register::*;
use crate::{Error, Result};

// Self-test reference output, datasheet 16.1.1.
const FIRMWARE_REFERENCE_V1_0: [u8; 64] = [
    0x00, 0xC6, 0x37, 0xD5, 0x32, 0xB7, 0x57, 0x5C, 0xC2, 0xD8, 0x7C, 0x4D, 0xD9, 0x70, 0xC7, 0x73,
    0x10, 0xE6, 0xD2, 0xAA, 0x5E, 0xA1, 0x3E, 0x5A, 0x14, 0xAF, 0x30, 0x61, 0xC9, 0x70, 0xDB, 0x2E,
    0x64, 0x22, 0x72, 0xB5, 0xBD, 0x65, 0xF4, 0xEC, 0x22, 0xBC, 0xD3, 0x72, 0x35, 0xCD, 0xAA, 0x41,
    0x1F, 0xA7, 0xF3, 0x53, 0x14, 0xDE, 0x7E, 0x02, 0xD9, 0x0F, 0xB5, 0x5E, 0x25, 0x1D, 0x29, 0x79,
];
const FIRMWARE_REFERENCE_V2_0: [u8; 64] = [
    0x00, 0xEB, 0x66, 0xBA, 0x57, 0xBF, 0x23, 0x95, 0xD0, 0xE3, 0x0D, 0x3D, 0x27, 0x89, 0x5C, 0xDE,
    0x9D, 0x3B, 0xA7, 0x00, 0x21, 0x5B, 0x89, 0x82, 0x51, 0x3A, 0xEB, 0x02, 0x0C, 0xA5, 0x00, 0x49,
    0x7C, 0x84, 0x4D, 0xB3, 0xCC, 0xD2, 0x1B, 0x81, 0x5D, 0x48, 0x76, 0xD5, 0x71, 0x61, 0x21, 0xA9,
    0x86, 0x96, 0x83, 0x38, 0xCF, 0x9D, 0x5B, 0x6D, 0xDC, 0x15, 0xBA, 0x3E, 0x7D, 0x95, 0x3B, 0x2F,
];

/// What a PICC sent back: the number of bytes stored in the receive buffer and the number
/// of valid bits in the last of them (0 means all 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Received {
    pub len: usize,
    pub valid_bits: u8,
}

/// MFRC522 reader chip behind a register transport.
///
/// The chip has one FIFO and one command register, so the driver is a serial resource:
/// every method takes `&mut self` and runs one complete register sequence. Share it between
/// threads only behind a lock that covers whole calls.
pub struct MFRC522<C> {
    com: C,
}

impl<C: Com> MFRC522<C> {
    pub fn new(com: C) -> Self {
        MFRC522 { com }
    }

    pub fn release(self) -> C {
        self.com
    }

    pub fn read_register(&mut self, reg: Register) -> Result<u8> {
        let mut value = [0u8; 1];
        self.com.read(reg, &mut value)?;
        Ok(value[0])
    }

    /// Reads `values.len()` bytes from `reg`. Only bit positions `rx_align..=7` of
    /// `values[0]` are replaced.
    pub fn read_register_multi(&mut self, reg: Register, values: &mut [u8], rx_align: u8) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let first = values[0];
        self.com.read(reg, values)?;
        if rx_align != 0 {
            let mask = 0xFFu8 << (rx_align & 0x07);
            values[0] = (first & !mask) | (values[0] & mask);
        }
        Ok(())
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<()> {
        self.com.write(reg, &[value])?;
        Ok(())
    }

    pub fn write_register_multi(&mut self, reg: Register, values: &[u8]) -> Result<()> {
        self.com.write(reg, values)?;
        Ok(())
    }

    pub fn set_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<()> {
        let tmp = self.read_register(reg)?;
        self.write_register(reg, tmp | mask)
    }

    pub fn clear_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<()> {
        let tmp = self.read_register(reg)?;
        self.write_register(reg, tmp & !mask)
    }

    fn command(&mut self, command: PcdCommand) -> Result<()> {
        self.write_register(Register::CommandReg, command as u8)
    }

    /// Resets the chip and applies `config`. The antenna is switched on afterwards.
    pub fn init<D: DelayMs<u32>>(&mut self, config: &Config, delay: &mut D) -> Result<()> {
        self.reset(delay)?;

        self.write_register(Register::TxModeReg, 0x00)?;
        self.write_register(Register::RxModeReg, 0x00)?;
        // Reset ModWidthReg
        self.write_register(Register::ModWidthReg, 0x26)?;
        // TAuto=1: the timer starts at the end of every transmission and raises TimerIRq
        // when the PICC does not answer in time.
        self.write_register(Register::TModeReg, config.t_mode())?;
        self.write_register(Register::TPrescalerReg, config.t_prescaler())?;
        self.write_register(Register::TReloadRegHigh, (config.timer_reload >> 8) as u8)?;
        self.write_register(Register::TReloadRegLow, config.timer_reload as u8)?;
        let ask = if config.force_100_ask { 0x40 } else { 0x00 };
        self.write_register(Register::TxASKReg, ask)?;
        // CRC coprocessor preset 0x6363 (ISO 14443-3 part 6.2.4)
        self.write_register(Register::ModeReg, 0x3D)?;
        self.set_antenna_gain(config.rx_gain)?;
        self.antenna_on()?;

        info!("MFRC522 ready, version {:#04x}", self.version()?);
        Ok(())
    }

    /// Soft reset. Waits up to 4 × 50 ms for the PowerDown bit to clear.
    pub fn reset<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<()> {
        self.command(PcdCommand::SoftReset)?;
        let mut count = 0;
        loop {
            delay.delay_ms(50);
            let cmd_val = self.read_register(Register::CommandReg)?;
            if cmd_val & POWER_DOWN == 0 || count >= 3 {
                break;
            }
            count += 1;
        }
        Ok(())
    }

    pub fn version(&mut self) -> Result<u8> {
        self.read_register(Register::VersionReg)
    }

    pub fn antenna_on(&mut self) -> Result<()> {
        let control_reg = self.read_register(Register::TxControlReg)?;
        if (control_reg & TX_ANTENNA) != TX_ANTENNA {
            self.write_register(Register::TxControlReg, control_reg | TX_ANTENNA)?;
        }
        Ok(())
    }

    pub fn antenna_off(&mut self) -> Result<()> {
        self.clear_register_bitmask(Register::TxControlReg, TX_ANTENNA)
    }

    pub fn antenna_gain(&mut self) -> Result<RxGain> {
        Ok(RxGain::from_bits(self.read_register(Register::RFCfgReg)? & RX_GAIN))
    }

    pub fn set_antenna_gain(&mut self, gain: RxGain) -> Result<()> {
        if self.antenna_gain()? != gain {
            self.clear_register_bitmask(Register::RFCfgReg, RX_GAIN)?;
            self.set_register_bitmask(Register::RFCfgReg, gain.bits() & RX_GAIN)?;
        }
        Ok(())
    }

    /// Digital self-test (datasheet 16.1.1). Leaves the chip reset; call
    /// [`init`](Self::init) again before talking to cards.
    pub fn perform_self_test<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<bool> {
        self.reset(delay)?;

        // clear the internal buffer with 25 zero bytes
        self.set_register_bitmask(Register::FIFOLevelReg, FLUSH_BUFFER)?;
        self.write_register_multi(Register::FIFODataReg, &[0u8; 25])?;
        self.command(PcdCommand::Mem)?;

        self.write_register(Register::AutoTestReg, 0x09)?;
        self.write_register(Register::FIFODataReg, 0x00)?;
        self.command(PcdCommand::CalcCRC)?;

        // A missing CRCIRq shows up as a mismatch below.
        match poll_bounded(0xFF, || {
            let n = self.read_register(Register::DivIrqReg)?;
            Ok(if n & CRC_IRQ != 0 { Poll::Ready(()) } else { Poll::Pending })
        }) {
            Ok(()) | Err(Error::Timeout) => {}
            Err(e) => return Err(e),
        }
        self.command(PcdCommand::Idle)?;

        let mut result = [0u8; 64];
        self.read_register_multi(Register::FIFODataReg, &mut result, 0)?;
        self.write_register(Register::AutoTestReg, 0x00)?;

        let reference = match self.version()? {
            0x91 => &FIRMWARE_REFERENCE_V1_0,
            0x92 => &FIRMWARE_REFERENCE_V2_0,
            version => {
                debug!("self-test: unknown firmware version {:#04x}", version);
                return Ok(false);
            }
        };
        Ok(result == *reference)
    }

    /// Runs the chip's CRC coprocessor over `data`. Returns CRC_A low byte first.
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        self.command(PcdCommand::Idle)?;
        self.write_register(Register::DivIrqReg, CRC_IRQ)?;
        self.write_register(Register::FIFOLevelReg, FLUSH_BUFFER)?;
        self.write_register_multi(Register::FIFODataReg, data)?;
        self.command(PcdCommand::CalcCRC)?;

        poll_bounded(CRC_BUDGET, || {
            let n = self.read_register(Register::DivIrqReg)?;
            Ok(if n & CRC_IRQ != 0 { Poll::Ready(()) } else { Poll::Pending })
        })
        .map_err(|e| {
            trace!("CalcCRC did not complete: {}", e);
            e
        })?;

        self.command(PcdCommand::Idle)?;
        let res_low = self.read_register(Register::CRCResultRegLow)?;
        let res_high = self.read_register(Register::CRCResultRegHigh)?;
        Ok([res_low, res_high])
    }

    /// Transfers `send` to the FIFO, executes `command` and collects the answer.
    ///
    /// * `wait_irq` - ComIrqReg bits that signal successful completion.
    /// * `back` - receive buffer; its length is the capacity. `None` when no data is expected.
    /// * `tx_last_bits` - valid bits in the last byte of `send`, 0 for all 8.
    /// * `rx_align` - bit position in `back[0]` where the first received bit is stored.
    /// * `check_crc` - validate the trailing CRC_A of the received data.
    #[allow(clippy::too_many_arguments)]
    pub fn communicate(
        &mut self,
        command: PcdCommand,
        wait_irq: u8,
        send: &[u8],
        back: Option<&mut [u8]>,
        tx_last_bits: u8,
        rx_align: u8,
        check_crc: bool,
    ) -> Result<Received> {
        // RxAlign = BitFramingReg[6..4]. TxLastBits = BitFramingReg[2..0]
        let bit_framing = ((rx_align & 0x07) << 4) | (tx_last_bits & 0x07);

        self.command(PcdCommand::Idle)?;
        self.write_register(Register::ComIrqReg, ALL_IRQ)?;
        self.write_register(Register::FIFOLevelReg, FLUSH_BUFFER)?;
        self.write_register_multi(Register::FIFODataReg, send)?;
        self.write_register(Register::BitFramingReg, bit_framing)?;
        self.command(command)?;
        if command == PcdCommand::Transceive {
            self.set_register_bitmask(Register::BitFramingReg, START_SEND)?;
        }

        // The timer was armed by TAuto and fires when the PICC stays silent.
        poll_bounded(TRANSCEIVE_BUDGET, || {
            let n = self.read_register(Register::ComIrqReg)?;
            if n & wait_irq != 0 {
                Ok(Poll::Ready(()))
            } else if n & TIMER_IRQ != 0 {
                Err(Error::Timeout)
            } else {
                Ok(Poll::Pending)
            }
        })
        .map_err(|e| {
            trace!("{:?}: {}", command, e);
            e
        })?;

        // Stop now if any errors except collisions were detected.
        let error_reg_value = self.read_register(Register::ErrorReg)?;
        if error_reg_value & (BUFFER_OVFL | PARITY_ERR | PROTOCOL_ERR) != 0 {
            debug!("{:?}: ErrorReg {:#04x}", command, error_reg_value);
            return Err(Error::Communication);
        }

        let mut back = back;
        let mut received = Received::default();
        if let Some(buf) = back.as_deref_mut() {
            let n = (self.read_register(Register::FIFOLevelReg)? & 0x7F) as usize;
            if n > buf.len() {
                return Err(Error::NoRoom);
            }
            self.read_register_multi(Register::FIFODataReg, &mut buf[..n], rx_align)?;
            received.len = n;
            // RxLastBits: valid bits in the last received byte, 0 for all 8
            received.valid_bits = self.read_register(Register::ControlReg)? & RX_LAST_BITS;
        }
        let data: &[u8] = match back.as_deref() {
            Some(buf) => &buf[..received.len],
            None => &[],
        };

        // Partial data is kept in `back` for the anticollision loop.
        if error_reg_value & COLL_ERR != 0 {
            return Err(Error::Collision);
        }

        if check_crc && !data.is_empty() {
            if data.len() == 1 && received.valid_bits == 4 {
                return Err(Error::MifareNack);
            }
            if data.len() < 2 || received.valid_bits != 0 {
                return Err(Error::CrcWrong);
            }
            let (payload, crc) = data.split_at(data.len() - 2);
            if self.calculate_crc(payload)? != crc {
                debug!("{:?}: CRC_A mismatch", command);
                return Err(Error::CrcWrong);
            }
        }

        Ok(received)
    }

    /// Transceive command, complete on RxIRq or IdleIRq.
    pub fn transceive_data(
        &mut self,
        send: &[u8],
        back: Option<&mut [u8]>,
        tx_last_bits: u8,
        rx_align: u8,
        check_crc: bool,
    ) -> Result<Received> {
        self.communicate(
            PcdCommand::Transceive,
            RX_IRQ | IDLE_IRQ,
            send,
            back,
            tx_last_bits,
            rx_align,
            check_crc,
        )
    }

    /// REQA: invites IDLE PICCs to READY. Returns the ATQA.
    pub fn request_a(&mut self) -> Result<[u8; 2]> {
        self.request_a_or_wakeup_a(picc::Command::REQA)
    }

    /// WUPA: invites IDLE and HALT PICCs to READY. Returns the ATQA.
    pub fn wakeup_a(&mut self) -> Result<[u8; 2]> {
        self.request_a_or_wakeup_a(picc::Command::WUPA)
    }

    fn request_a_or_wakeup_a(&mut self, command: picc::Command) -> Result<[u8; 2]> {
        // ValuesAfterColl=0 => bits received after a collision are cleared
        self.clear_register_bitmask(Register::CollReg, VALUES_AFTER_COLL)?;
        let mut atqa = [0u8; 2];
        // short frame: 7 bits of the only byte
        let received = self.transceive_data(&[command as u8], Some(&mut atqa), 7, 0, false)?;
        if received.len != 2 || received.valid_bits != 0 {
            // ATQA must be exactly 16 bits.
            return Err(Error::Communication);
        }
        Ok(atqa)
    }

    /// HLTA: puts the active PICC into HALT. Silence is the only successful answer.
    pub fn halt_a(&mut self) -> Result<()> {
        let mut buffer = [picc::Command::HLTA as u8, 0, 0, 0];
        let crc = self.calculate_crc(&buffer[..2])?;
        buffer[2..].copy_from_slice(&crc);
        match self.transceive_data(&buffer, None, 0, 0, false) {
            Err(Error::Timeout) => Ok(()),
            Ok(_) => Err(Error::Communication),
            Err(e) => Err(e),
        }
    }

    /// True if a PICC in state IDLE answers REQA. Halted cards are ignored.
    pub fn new_card_present(&mut self) -> bool {
        let reset = self
            .write_register(Register::TxModeReg, 0x00)
            .and_then(|_| self.write_register(Register::RxModeReg, 0x00))
            .and_then(|_| self.write_register(Register::ModWidthReg, 0x26));
        if let Err(e) = reset {
            trace!("new_card_present: {}", e);
            return false;
        }

        match self.request_a() {
            Ok(_) | Err(Error::Collision) => true,
            Err(e) => {
                trace!("new_card_present: {}", e);
                false
            }
        }
    }

    /// Selects one of the READY PICCs without prior UID knowledge.
    pub fn read_card_serial(&mut self) -> Result<picc::Uid> {
        let uid = self.select(&[], 0)?;
        info!("selected PICC, {} byte UID, {}", uid.size().len(), uid.picc_type().name());
        Ok(uid)
    }
}
