// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sub-width access arithmetic for big-endian registers.
//!
//! A register of width `W` bytes at `base` can be accessed with any
//! `S`-byte access that lies fully inside it. Lower addresses hold the
//! more significant bytes, so an access at `delta` bytes into the
//! register covers bits `(W - S - delta) * 8 ..` of the stored value.

use crate::{SimResult, SimulationError};

/// Where an access lands inside a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAccess {
    pub shift: u32,
    pub mask: u32,
}

impl SubAccess {
    /// Locates an access of `size` bytes at `addr` within a `width`-byte
    /// register at `base`.
    pub fn locate(
        register: &'static str,
        base: u64,
        width: u8,
        addr: u64,
        size: u8,
    ) -> SimResult<Self> {
        let bad = || SimulationError::BadAccess {
            register,
            offset: addr,
            size,
            width,
        };

        if !matches!(size, 1 | 2 | 4) || !matches!(width, 1 | 2 | 4) || addr < base {
            return Err(bad());
        }
        let delta = addr - base;
        if delta + size as u64 > width as u64 {
            return Err(bad());
        }

        let shift = (width as u32 - size as u32 - delta as u32) * 8;
        let field = (1u64 << (size as u32 * 8)) - 1;
        let reg_bits = (1u64 << (width as u32 * 8)) - 1;
        let mask = ((field << shift) & reg_bits) as u32;
        Ok(Self { shift, mask })
    }

    /// Mask of the accessed field, right-aligned.
    pub fn field_mask(&self) -> u32 {
        self.mask >> self.shift
    }

    pub fn read(&self, reg: u32) -> u32 {
        (reg & self.mask) >> self.shift
    }

    /// Bits of `value` moved into register position.
    pub fn positioned(&self, value: u32) -> u32 {
        (value & self.field_mask()) << self.shift
    }

    pub fn write_normal(&self, reg: u32, value: u32) -> u32 {
        (reg & !self.mask) | self.positioned(value)
    }

    pub fn write_clear(&self, reg: u32, value: u32) -> u32 {
        reg & !self.positioned(value)
    }
}
