// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! CPM block layout as seen from CCSR + 0x8_0000.

use crate::peripherals::cpm::registers::Window;
use crate::peripherals::cpm::Cpm;
use crate::{Peripheral, SimResult, SimulationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Dpram,
    Registers(Window),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionEntry {
    pub name: &'static str,
    pub region: Region,
    pub base: u64,
    pub size: u64,
}

impl RegionEntry {
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.base && offset < self.base + self.size
    }
}

/// Regions in lookup order. The three narrow windows sit inside the
/// general window and win over it.
pub const CPM_REGIONS: [RegionEntry; 6] = [
    RegionEntry {
        name: "dpram1",
        region: Region::Dpram,
        base: 0x0000,
        size: 0x4000,
    },
    RegionEntry {
        name: "dpram2",
        region: Region::Dpram,
        base: 0x8000,
        size: 0x4000,
    },
    RegionEntry {
        name: "interrupt",
        region: Region::Registers(Window::Interrupt),
        base: 0x1_0c00,
        size: 0x80,
    },
    RegionEntry {
        name: "command",
        region: Region::Registers(Window::Command),
        base: 0x1_19c0,
        size: 0x30,
    },
    RegionEntry {
        name: "channels",
        region: Region::Registers(Window::Channels),
        base: 0x1_1a00,
        size: 0x80,
    },
    RegionEntry {
        name: "general",
        region: Region::Registers(Window::General),
        base: 0x1_0000,
        size: 0x2000,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CpmAddressMap;

impl CpmAddressMap {
    pub fn regions(&self) -> &'static [RegionEntry] {
        &CPM_REGIONS
    }

    /// Region hit by `offset` and the offset within it. DPRAM offsets stay
    /// CPM-relative since both banks share one address space.
    pub fn resolve(&self, offset: u64) -> Option<(Region, u64)> {
        let entry = CPM_REGIONS.iter().find(|r| r.contains(offset))?;
        Some(match entry.region {
            Region::Dpram => (Region::Dpram, offset),
            region => (region, offset - entry.base),
        })
    }
}

impl Peripheral for Cpm {
    fn read(&self, offset: u64, size: u8) -> SimResult<u32> {
        match CpmAddressMap.resolve(offset) {
            Some((Region::Dpram, off)) => self.read_dpram(off, size),
            Some((Region::Registers(window), off)) => Ok(self.read_window(window, off, size)),
            None => Err(SimulationError::MemoryViolation(offset)),
        }
    }

    fn write(&mut self, offset: u64, size: u8, value: u32) -> SimResult<()> {
        match CpmAddressMap.resolve(offset) {
            Some((Region::Dpram, off)) => self.write_dpram(off, size, value),
            Some((Region::Registers(window), off)) => {
                self.write_window(window, off, size, value);
                Ok(())
            }
            None => Err(SimulationError::MemoryViolation(offset)),
        }
    }

    fn reset(&mut self) {
        Cpm::reset(self);
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot_state()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_windows_overlay_general() {
        let map = CpmAddressMap;
        assert_eq!(
            map.resolve(0x1_0c0c),
            Some((Region::Registers(Window::Interrupt), 0x0c))
        );
        assert_eq!(
            map.resolve(0x1_19c0),
            Some((Region::Registers(Window::Command), 0x0))
        );
        assert_eq!(
            map.resolve(0x1_1a10),
            Some((Region::Registers(Window::Channels), 0x10))
        );
        assert_eq!(
            map.resolve(0x1_0c80),
            Some((Region::Registers(Window::General), 0xc80))
        );
    }

    #[test]
    fn test_dpram_and_holes() {
        let map = CpmAddressMap;
        assert_eq!(map.resolve(0x8006), Some((Region::Dpram, 0x8006)));
        assert_eq!(map.resolve(0x4000), None);
        assert_eq!(map.resolve(0xc000), None);
        assert_eq!(map.resolve(0x1_2000), None);
    }
}
