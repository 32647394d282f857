// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! CPCR decoding.

use crate::DecodeError;

pub const CPCR_RST: u32 = 1 << 31;
pub const CPCR_FLG: u32 = 1 << 16;
const PAGE_SHIFT: u32 = 26;
const SBC_SHIFT: u32 = 21;
const FIELD_MASK: u32 = 0x1f;
const OPCODE_MASK: u32 = 0xf;

/// Sub-block code field of CPCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubBlock {
    Scc(usize),
    Spi,
    I2c,
    Rand,
    Timer,
    Fcc(usize),
    Mcc(usize),
}

impl SubBlock {
    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0x04..=0x07 => SubBlock::Scc((code - 0x04) as usize),
            0x0a => SubBlock::Spi,
            0x0b => SubBlock::I2c,
            0x0e => SubBlock::Rand,
            0x0f => SubBlock::Timer,
            0x10..=0x12 => SubBlock::Fcc((code - 0x10) as usize),
            0x1c => SubBlock::Mcc(0),
            0x1d => SubBlock::Mcc(1),
            other => return Err(DecodeError::UnknownSubBlock(other)),
        })
    }

    /// Highest parameter RAM page the sub-block may address.
    pub fn max_page(&self) -> u8 {
        match self {
            SubBlock::Scc(_) => 3,
            SubBlock::Fcc(_) => 6,
            _ => 0x1f,
        }
    }

    /// SCC and FCC commands carry an opcode from the channel command table.
    pub fn takes_channel_opcode(&self) -> bool {
        matches!(self, SubBlock::Scc(_) | SubBlock::Fcc(_))
    }
}

/// Channel commands (opcode field) of the SCC/FCC family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    InitRxTxParams,
    InitRxParams,
    InitTxParams,
    EnterHuntMode,
    StopTx,
    GracefulStopTx,
    RestartTx,
    SetGroupAddress,
    ResetBcs,
}

impl Opcode {
    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0x0 => Opcode::InitRxTxParams,
            0x1 => Opcode::InitRxParams,
            0x2 => Opcode::InitTxParams,
            0x3 => Opcode::EnterHuntMode,
            0x4 => Opcode::StopTx,
            0x5 => Opcode::GracefulStopTx,
            0x6 => Opcode::RestartTx,
            0x8 => Opcode::SetGroupAddress,
            0xa => Opcode::ResetBcs,
            other => return Err(DecodeError::UnknownOpcode(other)),
        })
    }
}

/// Raw CPCR fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandWord {
    pub reset: bool,
    pub page: u8,
    pub sbc: u8,
    pub busy: bool,
    pub opcode: u8,
}

impl CommandWord {
    pub fn decode(raw: u32) -> Self {
        Self {
            reset: raw & CPCR_RST != 0,
            page: ((raw >> PAGE_SHIFT) & FIELD_MASK) as u8,
            sbc: ((raw >> SBC_SHIFT) & FIELD_MASK) as u8,
            busy: raw & CPCR_FLG != 0,
            opcode: (raw & OPCODE_MASK) as u8,
        }
    }

    pub fn encode(&self) -> u32 {
        let mut raw = ((self.page as u32 & FIELD_MASK) << PAGE_SHIFT)
            | ((self.sbc as u32 & FIELD_MASK) << SBC_SHIFT)
            | (self.opcode as u32 & OPCODE_MASK);
        if self.reset {
            raw |= CPCR_RST;
        }
        if self.busy {
            raw |= CPCR_FLG;
        }
        raw
    }
}

/// A fully decoded, dispatchable command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Channel {
        block: SubBlock,
        page: u8,
        opcode: Opcode,
    },
    /// A known sub-block outside the SCC/FCC family. Its opcode is kept raw.
    Block { block: SubBlock, page: u8, opcode: u8 },
}

impl Command {
    pub fn decode(raw: u32) -> Result<Self, DecodeError> {
        let word = CommandWord::decode(raw);
        if word.reset {
            return Ok(Command::Reset);
        }

        let block = SubBlock::from_code(word.sbc)?;
        if !block.takes_channel_opcode() {
            return Ok(Command::Block {
                block,
                page: word.page,
                opcode: word.opcode,
            });
        }

        let opcode = Opcode::from_code(word.opcode)?;
        if word.page > block.max_page() {
            return Err(DecodeError::InvalidPage {
                page: word.page,
                sbc: word.sbc,
            });
        }
        Ok(Command::Channel {
            block,
            page: word.page,
            opcode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpcr(page: u8, sbc: u8, opcode: u8) -> u32 {
        CommandWord {
            reset: false,
            page,
            sbc,
            busy: true,
            opcode,
        }
        .encode()
    }

    #[test]
    fn test_field_layout() {
        // SCC1 INIT RX AND TX, as issued by the Linux cpm_uart driver
        let raw = 0x0080_0000 | CPCR_FLG;
        let word = CommandWord::decode(raw);
        assert!(!word.reset);
        assert!(word.busy);
        assert_eq!(word.page, 0);
        assert_eq!(word.sbc, 0x04);
        assert_eq!(word.opcode, 0);
        assert_eq!(word.encode(), raw);

        let w = CommandWord::decode(0x8000_0000 | (0x1f << 26) | (0x1f << 21) | 0xf);
        assert!(w.reset);
        assert_eq!((w.page, w.sbc, w.opcode), (0x1f, 0x1f, 0xf));
    }

    #[test]
    fn test_decode_scc_command() {
        assert_eq!(
            Command::decode(cpcr(1, 0x05, 0x6)),
            Ok(Command::Channel {
                block: SubBlock::Scc(1),
                page: 1,
                opcode: Opcode::RestartTx
            })
        );
    }

    #[test]
    fn test_reset_wins_over_garbage_fields() {
        assert_eq!(Command::decode(CPCR_RST | 0x0000_000f), Ok(Command::Reset));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Command::decode(cpcr(0, 0x01, 0)),
            Err(DecodeError::UnknownSubBlock(0x01))
        );
        assert_eq!(
            Command::decode(cpcr(0, 0x04, 0x7)),
            Err(DecodeError::UnknownOpcode(0x7))
        );
        assert_eq!(
            Command::decode(cpcr(4, 0x04, 0)),
            Err(DecodeError::InvalidPage { page: 4, sbc: 0x04 })
        );
    }

    #[test]
    fn test_known_non_serial_blocks() {
        assert_eq!(SubBlock::from_code(0x10), Ok(SubBlock::Fcc(0)));
        assert_eq!(SubBlock::from_code(0x1d), Ok(SubBlock::Mcc(1)));
        assert_eq!(SubBlock::from_code(0x0a), Ok(SubBlock::Spi));
    }

    #[test]
    fn test_non_serial_opcode_not_checked() {
        // Opcode 7 is unassigned for SCCs but belongs to the timer block
        assert_eq!(
            Command::decode(cpcr(0, 0x0f, 0x7)),
            Ok(Command::Block {
                block: SubBlock::Timer,
                page: 0,
                opcode: 0x7
            })
        );
        assert!(matches!(
            Command::decode(cpcr(0x1f, 0x0a, 0xf)),
            Ok(Command::Block {
                block: SubBlock::Spi,
                ..
            })
        ));
        // FCCs still go through the channel table
        assert_eq!(
            Command::decode(cpcr(0, 0x10, 0x7)),
            Err(DecodeError::UnknownOpcode(0x7))
        );
    }
}
