//! Chip bring-up settings applied by [`MFRC522::init`](crate::MFRC522::init).

/// Receiver gain, RFCfgReg[6..4] (datasheet table 98).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxGain {
    Db18 = 0x00 << 4,
    Db23 = 0x01 << 4,
    Db18b = 0x02 << 4,
    Db23b = 0x03 << 4,
    Db33 = 0x04 << 4,
    Db38 = 0x05 << 4,
    Db43 = 0x06 << 4,
    Db48 = 0x07 << 4,
}

impl RxGain {
    pub const MIN: RxGain = RxGain::Db18;
    pub const AVG: RxGain = RxGain::Db33;
    pub const MAX: RxGain = RxGain::Db48;

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> RxGain {
        match (bits >> 4) & 0x07 {
            0 => RxGain::Db18,
            1 => RxGain::Db23,
            2 => RxGain::Db18b,
            3 => RxGain::Db23b,
            4 => RxGain::Db33,
            5 => RxGain::Db38,
            6 => RxGain::Db43,
            _ => RxGain::Db48,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// 12-bit timer prescaler, f_timer = 13.56 MHz / (2 * prescaler + 1).
    pub timer_prescaler: u16,
    /// Timer reload value in timer ticks; the PICC response timeout.
    pub timer_reload: u16,
    pub rx_gain: RxGain,
    /// Force 100 % ASK modulation regardless of ModGsPReg.
    pub force_100_ask: bool,
}

impl Default for Config {
    fn default() -> Self {
        // 0x0A9 => 40 kHz timer, 1000 ticks => 25 ms
        Self {
            timer_prescaler: 0x0A9,
            timer_reload: 0x3E8,
            rx_gain: RxGain::AVG,
            force_100_ask: true,
        }
    }
}

impl Config {
    /// TModeReg value: TAuto set, prescaler high nibble.
    pub(crate) fn t_mode(&self) -> u8 {
        0x80 | ((self.timer_prescaler >> 8) as u8 & 0x0F)
    }

    pub(crate) fn t_prescaler(&self) -> u8 {
        self.timer_prescaler as u8
    }

    /// Response timeout in microseconds implied by the timer settings.
    pub fn timeout_us(&self) -> u32 {
        let period_ns = (2 * self.timer_prescaler as u64 + 1) * 1_000_000_000 / 13_560_000;
        (period_ns * self.timer_reload as u64 / 1000) as u32
    }
}
