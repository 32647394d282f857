// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use std::sync::{Arc, Mutex};

/// Offset of DPRAM bank 1 inside the CPM block.
pub const DPRAM1_OFFSET: u64 = 0x0000;
/// Offset of DPRAM bank 2 inside the CPM block.
pub const DPRAM2_OFFSET: u64 = 0x8000;
/// Decoded size of one DPRAM bank.
pub const DPRAM_BANK_SIZE: usize = 0x4000;

/// Memory the CPM reaches through buffer descriptor pointers.
///
/// All multi-byte helpers are big-endian, matching the PowerQUICC data bus.
pub trait SystemMemory: Send {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;

    fn read_u16(&self, addr: u64) -> SimResult<u16> {
        let hi = self.read_u8(addr)? as u16;
        let lo = self.read_u8(addr + 1)? as u16;
        Ok((hi << 8) | lo)
    }

    fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let hi = self.read_u16(addr)? as u32;
        let lo = self.read_u16(addr + 2)? as u32;
        Ok((hi << 16) | lo)
    }

    fn write_u16(&mut self, addr: u64, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value >> 8) as u8)?;
        self.write_u8(addr + 1, value as u8)
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write_u16(addr, (value >> 16) as u16)?;
        self.write_u16(addr + 2, value as u16)
    }
}

/// A simple flat memory storage
#[derive(Debug, Clone)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_addr && addr < self.base_addr + self.data.len() as u64
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        if self.contains(addr) {
            Some(self.data[(addr - self.base_addr) as usize])
        } else {
            None
        }
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        if self.contains(addr) {
            self.data[(addr - self.base_addr) as usize] = value;
            true
        } else {
            false
        }
    }

    /// Copies `bytes` to `addr`. Nothing is written unless the whole range fits.
    pub fn load(&mut self, addr: u64, bytes: &[u8]) -> bool {
        let end_addr = addr + bytes.len() as u64;
        let mem_end = self.base_addr + self.data.len() as u64;

        if addr >= self.base_addr && end_addr <= mem_end {
            let offset = (addr - self.base_addr) as usize;
            self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
            return true;
        }
        false
    }
}

impl SystemMemory for LinearMemory {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        LinearMemory::read_u8(self, addr).ok_or(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        if LinearMemory::write_u8(self, addr, value) {
            Ok(())
        } else {
            Err(SimulationError::MemoryViolation(addr))
        }
    }
}

/// System RAM shared between the host and the CPM.
#[derive(Debug, Clone)]
pub struct SharedMemory {
    inner: Arc<Mutex<LinearMemory>>,
}

impl SharedMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LinearMemory::new(size, base_addr))),
        }
    }

    pub fn load(&self, addr: u64, bytes: &[u8]) -> bool {
        self.inner
            .lock()
            .map(|mut mem| mem.load(addr, bytes))
            .unwrap_or(false)
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> Option<Vec<u8>> {
        let mem = self.inner.lock().ok()?;
        (0..len as u64).map(|i| mem.read_u8(addr + i)).collect()
    }
}

impl SystemMemory for SharedMemory {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        let mem = self
            .inner
            .lock()
            .map_err(|_| SimulationError::MemoryViolation(addr))?;
        SystemMemory::read_u8(&*mem, addr)
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        let mut mem = self
            .inner
            .lock()
            .map_err(|_| SimulationError::MemoryViolation(addr))?;
        SystemMemory::write_u8(&mut *mem, addr, value)
    }
}

/// Stand-in for machines that give the CPM no external memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemory;

impl SystemMemory for NoMemory {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        Err(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, _value: u8) -> SimResult<()> {
        Err(SimulationError::MemoryViolation(addr))
    }
}

/// The two CPM dual-port RAM banks, addressed by offset from the CPM base.
///
/// Bank 1 holds buffer descriptors and data, bank 2 holds parameter RAM.
#[derive(Debug, Clone)]
pub struct DualPortRam {
    bank1: LinearMemory,
    bank2: LinearMemory,
}

impl DualPortRam {
    pub fn new(bank_size: usize) -> Self {
        Self {
            bank1: LinearMemory::new(bank_size, DPRAM1_OFFSET),
            bank2: LinearMemory::new(bank_size, DPRAM2_OFFSET),
        }
    }

    pub fn bank_size(&self) -> usize {
        self.bank1.data.len()
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.bank1.contains(offset) || self.bank2.contains(offset)
    }

    fn bank(&self, offset: u64) -> Option<&LinearMemory> {
        if self.bank1.contains(offset) {
            Some(&self.bank1)
        } else if self.bank2.contains(offset) {
            Some(&self.bank2)
        } else {
            None
        }
    }

    fn bank_mut(&mut self, offset: u64) -> Option<&mut LinearMemory> {
        if self.bank1.contains(offset) {
            Some(&mut self.bank1)
        } else if self.bank2.contains(offset) {
            Some(&mut self.bank2)
        } else {
            None
        }
    }

    pub fn load(&mut self, offset: u64, bytes: &[u8]) -> bool {
        self.bank_mut(offset)
            .map(|bank| bank.load(offset, bytes))
            .unwrap_or(false)
    }
}

impl SystemMemory for DualPortRam {
    fn read_u8(&self, offset: u64) -> SimResult<u8> {
        self.bank(offset)
            .and_then(|bank| bank.read_u8(offset))
            .ok_or(SimulationError::MemoryViolation(offset))
    }

    fn write_u8(&mut self, offset: u64, value: u8) -> SimResult<()> {
        match self.bank_mut(offset).map(|bank| bank.write_u8(offset, value)) {
            Some(true) => Ok(()),
            _ => Err(SimulationError::MemoryViolation(offset)),
        }
    }
}
