//! MFRC522 register map and chip commands (datasheet section 9).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    // Reserved         = 0x00,
    CommandReg = 0x01,
    ComIEnReg = 0x02,
    DivIEnReg = 0x03,
    ComIrqReg = 0x04,
    DivIrqReg = 0x05,
    ErrorReg = 0x06,
    Status1Reg = 0x07,
    Status2Reg = 0x08,
    FIFODataReg = 0x09,
    FIFOLevelReg = 0x0A,
    WaterLevelReg = 0x0B,
    ControlReg = 0x0C,
    BitFramingReg = 0x0D,
    CollReg = 0x0E,
    // Reserved         = 0x0F,
    // Reserved         = 0x10,
    ModeReg = 0x11,
    TxModeReg = 0x12,
    RxModeReg = 0x13,
    TxControlReg = 0x14,
    TxASKReg = 0x15,
    TxSelReg = 0x16,
    RxSelReg = 0x17,
    RxThresholdReg = 0x18,
    DemodReg = 0x19,
    // Reserved         = 0x1A,
    // Reserved         = 0x1B,
    MfTxReg = 0x1C,
    MfRxReg = 0x1D,
    // Reserved         = 0x1E,
    SerialSpeedReg = 0x1F,
    // Reserved         = 0x20,
    CRCResultRegHigh = 0x21,
    CRCResultRegLow = 0x22,
    // Reserved         = 0x23,
    ModWidthReg = 0x24,
    // Reserved         = 0x25,
    RFCfgReg = 0x26,
    GsNReg = 0x27,
    CWGsPReg = 0x28,
    ModGsPReg = 0x29,
    TModeReg = 0x2A,
    TPrescalerReg = 0x2B,
    TReloadRegHigh = 0x2C,
    TReloadRegLow = 0x2D,
    TCounterValRegHigh = 0x2E,
    TCounterValRegLow = 0x2F,
    // Reserved         = 0x30,
    TestSel1Reg = 0x31,
    TestSel2Reg = 0x32,
    TestPinEnReg = 0x33,
    TestPinValueReg = 0x34,
    TestBusReg = 0x35,
    AutoTestReg = 0x36,
    VersionReg = 0x37,
    AnalogTestReg = 0x38,
    TestDAC1Reg = 0x39,
    TestDAC2Reg = 0x3A,
    TestADCReg = 0x3B,
    // Reserved         = 0x3C-0x3F,
}

impl Register {
    pub fn addr(self) -> u8 {
        self as u8
    }

    /// Registers printed by a diagnostic dump. The FIFO data and test registers are left
    /// out because reading them has side effects or no meaning outside a self-test.
    pub const DUMP: [Register; 38] = [
        Register::CommandReg,
        Register::ComIEnReg,
        Register::DivIEnReg,
        Register::ComIrqReg,
        Register::DivIrqReg,
        Register::ErrorReg,
        Register::Status1Reg,
        Register::Status2Reg,
        Register::FIFOLevelReg,
        Register::WaterLevelReg,
        Register::ControlReg,
        Register::BitFramingReg,
        Register::CollReg,
        Register::ModeReg,
        Register::TxModeReg,
        Register::RxModeReg,
        Register::TxControlReg,
        Register::TxASKReg,
        Register::TxSelReg,
        Register::RxSelReg,
        Register::RxThresholdReg,
        Register::DemodReg,
        Register::MfTxReg,
        Register::MfRxReg,
        Register::SerialSpeedReg,
        Register::CRCResultRegHigh,
        Register::CRCResultRegLow,
        Register::ModWidthReg,
        Register::RFCfgReg,
        Register::GsNReg,
        Register::CWGsPReg,
        Register::ModGsPReg,
        Register::TModeReg,
        Register::TPrescalerReg,
        Register::TReloadRegHigh,
        Register::TReloadRegLow,
        Register::TCounterValRegHigh,
        Register::TCounterValRegLow,
    ];
}

/// Commands for the chip's CommandReg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdCommand {
    Idle = 0b0000,
    Mem = 0b0001,
    GenerateRandomId = 0b0010,
    CalcCRC = 0b0011,
    Transmit = 0b0100,
    NoCmdChange = 0b0111,
    Receive = 0b1000,
    Transceive = 0b1100,
    MFAuthent = 0b1110,
    SoftReset = 0b1111,
}

// CommandReg
pub const POWER_DOWN: u8 = 1 << 4;

// ComIrqReg
pub const TIMER_IRQ: u8 = 1 << 0;
pub const ERR_IRQ: u8 = 1 << 1;
pub const IDLE_IRQ: u8 = 1 << 4;
pub const RX_IRQ: u8 = 1 << 5;
pub const ALL_IRQ: u8 = 0x7F;

// DivIrqReg
pub const CRC_IRQ: u8 = 1 << 2;

// ErrorReg
pub const PROTOCOL_ERR: u8 = 1 << 0;
pub const PARITY_ERR: u8 = 1 << 1;
pub const COLL_ERR: u8 = 1 << 3;
pub const BUFFER_OVFL: u8 = 1 << 4;

// Status2Reg
pub const MF_CRYPTO1_ON: u8 = 1 << 3;

// FIFOLevelReg
pub const FLUSH_BUFFER: u8 = 1 << 7;

// BitFramingReg
pub const START_SEND: u8 = 1 << 7;

// ControlReg
pub const RX_LAST_BITS: u8 = 0x07;

// CollReg
pub const VALUES_AFTER_COLL: u8 = 1 << 7;
pub const COLL_POS_NOT_VALID: u8 = 1 << 5;
pub const COLL_POS: u8 = 0x1F;

// TxControlReg
pub const TX_ANTENNA: u8 = 0x03;

// RFCfgReg
pub const RX_GAIN: u8 = 0x07 << 4;
