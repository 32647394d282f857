// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! SCC buffer descriptors and event bits.

use crate::memory::SystemMemory;
use crate::SimResult;
use bitflags::bitflags;

/// Size of one buffer descriptor in DPRAM.
pub const BD_SIZE: u64 = 8;
const BD_LENGTH: u64 = 2;
const BD_POINTER: u64 = 4;

bitflags! {
    /// Status and control half-word of a buffer descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BdStatus: u16 {
        /// Ready (TX) / Empty (RX): the CPM owns the descriptor.
        const READY = 0x8000;
        /// Last descriptor of the ring.
        const WRAP = 0x2000;
        /// Raise an event when the descriptor is closed.
        const INTERRUPT = 0x1000;
        /// Last buffer of a frame.
        const LAST = 0x0800;
    }
}

impl BdStatus {
    /// Receive descriptors call the ownership bit "empty".
    pub const EMPTY: BdStatus = BdStatus::READY;
}

bitflags! {
    /// SCCE/SCCM bits for UART mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SccEvents: u16 {
        /// A receive buffer was closed.
        const RX = 0x0001;
        /// A transmit buffer was sent.
        const TX = 0x0002;
    }
}

/// A descriptor as read from memory. `addr` is its DPRAM offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub addr: u64,
    pub raw_status: u16,
    pub length: u16,
    pub pointer: u32,
}

impl BufferDescriptor {
    pub fn load(mem: &dyn SystemMemory, addr: u64) -> SimResult<Self> {
        Ok(Self {
            addr,
            raw_status: mem.read_u16(addr)?,
            length: mem.read_u16(addr + BD_LENGTH)?,
            pointer: mem.read_u32(addr + BD_POINTER)?,
        })
    }

    pub fn status(&self) -> BdStatus {
        BdStatus::from_bits_retain(self.raw_status)
    }

    pub fn owned_by_cpm(&self) -> bool {
        self.status().contains(BdStatus::READY)
    }

    pub fn wraps(&self) -> bool {
        self.status().contains(BdStatus::WRAP)
    }

    pub fn interrupts(&self) -> bool {
        self.status().contains(BdStatus::INTERRUPT)
    }

    /// Hands the descriptor back to software, keeping every other bit.
    pub fn release(&mut self, mem: &mut dyn SystemMemory) -> SimResult<()> {
        self.raw_status &= !BdStatus::READY.bits();
        mem.write_u16(self.addr, self.raw_status)
    }

    pub fn store_length(&mut self, mem: &mut dyn SystemMemory, length: u16) -> SimResult<()> {
        self.length = length;
        mem.write_u16(self.addr + BD_LENGTH, length)
    }

    /// Where the ring continues after this descriptor.
    pub fn next_addr(&self, ring_base: u64) -> u64 {
        if self.wraps() {
            ring_base
        } else {
            self.addr + BD_SIZE
        }
    }

    /// True when a write of `size` bytes at `addr` touches the status half-word.
    pub fn status_overlaps(bd_addr: u64, addr: u64, size: u8) -> bool {
        addr < bd_addr + 2 && bd_addr < addr + size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinearMemory;

    #[test]
    fn test_load_and_release() {
        let mut mem = LinearMemory::new(64, 0);
        mem.load(0x10, &[0xb0, 0x00, 0x00, 0x05, 0x00, 0x00, 0x01, 0x00]);

        let mut bd = BufferDescriptor::load(&mem, 0x10).unwrap();
        assert!(bd.owned_by_cpm());
        assert!(bd.wraps());
        assert!(bd.interrupts());
        assert_eq!(bd.length, 5);
        assert_eq!(bd.pointer, 0x100);

        bd.release(&mut mem).unwrap();
        assert_eq!(mem.data[0x10..0x12], [0x30, 0x00]);
        assert_eq!(bd.next_addr(0x0), 0x0);
    }

    #[test]
    fn test_sequential_next() {
        let mut mem = LinearMemory::new(64, 0);
        mem.load(0x20, &[0x90, 0x00]);
        let bd = BufferDescriptor::load(&mem, 0x20).unwrap();
        assert_eq!(bd.next_addr(0x0), 0x28);
    }

    #[test]
    fn test_status_overlap_window() {
        assert!(BufferDescriptor::status_overlaps(0x80, 0x80, 2));
        assert!(BufferDescriptor::status_overlaps(0x80, 0x81, 1));
        assert!(BufferDescriptor::status_overlaps(0x80, 0x7e, 4));
        assert!(!BufferDescriptor::status_overlaps(0x80, 0x82, 2));
        assert!(!BufferDescriptor::status_overlaps(0x80, 0x7e, 2));
    }
}
