// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! SCC parameter RAM pages in DPRAM bank 2.

use crate::memory::{SystemMemory, DPRAM2_OFFSET};
use crate::SimResult;

pub const PAGE_SIZE: u64 = 0x100;

pub const RBASE: u64 = 0x00;
pub const TBASE: u64 = 0x02;
pub const RFCR: u64 = 0x04;
pub const TFCR: u64 = 0x05;
pub const MRBLR: u64 = 0x06;
pub const RSTATE: u64 = 0x08;
pub const R_PTR: u64 = 0x0c;
pub const RBPTR: u64 = 0x10;
pub const R_CNT: u64 = 0x12;
pub const RTEMP: u64 = 0x14;
pub const TSTATE: u64 = 0x18;
pub const T_PTR: u64 = 0x1c;
pub const TBPTR: u64 = 0x20;
pub const T_CNT: u64 = 0x22;
pub const TTEMP: u64 = 0x24;
pub const RCRC: u64 = 0x28;
pub const TCRC: u64 = 0x2c;

/// View over one SCC parameter RAM page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SccParams {
    base: u64,
}

impl SccParams {
    pub fn page(page: u8) -> Self {
        Self {
            base: DPRAM2_OFFSET + page as u64 * PAGE_SIZE,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn rbase(&self, mem: &dyn SystemMemory) -> SimResult<u16> {
        mem.read_u16(self.base + RBASE)
    }

    pub fn tbase(&self, mem: &dyn SystemMemory) -> SimResult<u16> {
        mem.read_u16(self.base + TBASE)
    }

    pub fn mrblr(&self, mem: &dyn SystemMemory) -> SimResult<u16> {
        mem.read_u16(self.base + MRBLR)
    }

    pub fn rbptr(&self, mem: &dyn SystemMemory) -> SimResult<u16> {
        mem.read_u16(self.base + RBPTR)
    }

    pub fn tbptr(&self, mem: &dyn SystemMemory) -> SimResult<u16> {
        mem.read_u16(self.base + TBPTR)
    }

    pub fn set_rbptr(&self, mem: &mut dyn SystemMemory, value: u16) -> SimResult<()> {
        mem.write_u16(self.base + RBPTR, value)
    }

    /// `INIT RX AND TX PARAMETERS`: both rings restart at their bases.
    pub fn init_rx_tx(&self, mem: &mut dyn SystemMemory) -> SimResult<u16> {
        let tbase = self.tbase(mem)?;
        mem.write_u16(self.base + TBPTR, tbase)?;
        mem.write_u32(self.base + TSTATE, 0)?;

        let rbase = self.rbase(mem)?;
        mem.write_u16(self.base + RBPTR, rbase)?;
        mem.write_u32(self.base + RSTATE, 0)?;
        Ok(rbase)
    }
}
