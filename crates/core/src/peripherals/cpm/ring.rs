// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! SCC buffer descriptor ring walker.

use super::descriptor::BufferDescriptor;
use super::fifo::ReceiveFifo;
use super::pram::SccParams;
use crate::memory::{DualPortRam, SystemMemory, DPRAM1_OFFSET};
use crate::serial::SerialBackend;
use crate::SimResult;

/// Physical span decoded as DPRAM, starting at CCSR + 0x8_0000.
const DPRAM_WINDOW: u64 = 0x1_0000;

/// Memory as seen by the CPM's SDMA: buffer pointers that fall inside the
/// DPRAM banks stay internal, everything else goes to system memory.
/// Descriptors themselves are addressed by DPRAM offset through `dpram`.
pub struct DataPath<'a> {
    pub dpram: &'a mut DualPortRam,
    pub system: &'a mut dyn SystemMemory,
    /// Physical address of DPRAM bank 1.
    pub dpram_phys: u64,
}

impl DataPath<'_> {
    fn dpram_offset(&self, addr: u64) -> Option<u64> {
        let off = addr.checked_sub(self.dpram_phys)?;
        (off < DPRAM_WINDOW && self.dpram.contains(off)).then_some(off)
    }
}

impl SystemMemory for DataPath<'_> {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        match self.dpram_offset(addr) {
            Some(off) => self.dpram.read_u8(off),
            None => self.system.read_u8(addr),
        }
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        match self.dpram_offset(addr) {
            Some(off) => self.dpram.write_u8(off, value),
            None => self.system.write_u8(addr, value),
        }
    }
}

/// What the caller must schedule after a receive drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rearm {
    #[default]
    None,
    /// A buffer is still open; poll again to close it once the line idles.
    Poll,
    /// The ring is full; retry after software returns a descriptor.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxDrain {
    pub consumed: usize,
    pub closed: usize,
    /// A closed descriptor asked for an interrupt.
    pub raise: bool,
    pub rearm: Rearm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct TxReport {
    pub sent: usize,
    pub raise: bool,
}

/// Ring position of one SCC.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ChannelRing {
    pub channel: usize,
    /// Current receive descriptor, as a bank-1 offset. Unset until the
    /// channel is initialized, in which case RBPTR is used.
    pub rx_current: Option<u16>,
    /// Bytes already stored in the current receive buffer.
    pub rx_count: u16,
}

impl ChannelRing {
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            ..Default::default()
        }
    }

    pub fn params(&self) -> SccParams {
        SccParams::page(self.channel as u8)
    }

    /// Bank-1 offset of the descriptor that a TX trigger watches.
    pub fn tx_current(&self, dpram: &DualPortRam) -> SimResult<u64> {
        Ok(DPRAM1_OFFSET + self.params().tbptr(dpram)? as u64)
    }

    /// `INIT RX AND TX PARAMETERS` on this channel's page.
    pub fn init(&mut self, dpram: &mut DualPortRam) -> SimResult<()> {
        let rbase = self.params().init_rx_tx(dpram)?;
        self.rx_current = Some(rbase);
        self.rx_count = 0;
        tracing::debug!("SCC{} ring init, RBASE {:#x}", self.channel + 1, rbase);
        Ok(())
    }

    /// Sends the buffer of the current transmit descriptor, byte by byte,
    /// and hands the descriptor back to software.
    pub fn transmit(
        &mut self,
        path: &mut DataPath<'_>,
        mut backend: Option<&mut (dyn SerialBackend + 'static)>,
    ) -> SimResult<TxReport> {
        let bd_addr = self.tx_current(&*path.dpram)?;
        let mut bd = BufferDescriptor::load(&*path.dpram, bd_addr)?;
        if !bd.owned_by_cpm() {
            return Ok(TxReport::default());
        }

        for i in 0..bd.length as u64 {
            let byte = path.read_u8(bd.pointer as u64 + i)?;
            tracing::trace!("SCC{} TX {:#04x}", self.channel + 1, byte);
            match backend.as_deref_mut() {
                Some(b) => b.send_byte(byte),
                None => tracing::trace!("SCC{} has no backend, byte dropped", self.channel + 1),
            }
        }

        bd.release(&mut *path.dpram)?;
        Ok(TxReport {
            sent: bd.length as usize,
            raise: bd.interrupts(),
        })
    }

    fn current_rx(&self, path: &DataPath<'_>) -> SimResult<u64> {
        let off = match self.rx_current {
            Some(off) => off,
            None => self.params().rbptr(&*path.dpram)?,
        };
        Ok(DPRAM1_OFFSET + off as u64)
    }

    fn close(&mut self, path: &mut DataPath<'_>, bd: &mut BufferDescriptor, report: &mut RxDrain) -> SimResult<()> {
        bd.release(&mut *path.dpram)?;
        tracing::debug!(
            "SCC{} RX BD {:#x} closed with {} bytes",
            self.channel + 1,
            bd.addr,
            self.rx_count
        );
        self.rx_count = 0;
        report.closed += 1;
        report.raise |= bd.interrupts();
        Ok(())
    }

    fn advance(&mut self, path: &mut DataPath<'_>, bd: &BufferDescriptor) -> SimResult<u64> {
        let rbase = DPRAM1_OFFSET + self.params().rbase(&*path.dpram)? as u64;
        let next = bd.next_addr(rbase);
        let off = (next - DPRAM1_OFFSET) as u16;
        self.rx_current = Some(off);
        self.params().set_rbptr(&mut *path.dpram, off)?;
        Ok(next)
    }

    /// Moves bytes from `fifo` into the receive ring.
    pub fn drain_rx(&mut self, path: &mut DataPath<'_>, fifo: &mut ReceiveFifo) -> SimResult<RxDrain> {
        let mut report = RxDrain::default();
        let mut current = self.current_rx(path)?;

        if fifo.is_empty() {
            if self.rx_count > 0 {
                let mut bd = BufferDescriptor::load(&*path.dpram, current)?;
                if bd.owned_by_cpm() {
                    self.close(path, &mut bd, &mut report)?;
                    self.advance(path, &bd)?;
                } else {
                    self.rx_count = 0;
                }
            }
            return Ok(report);
        }

        let mrblr = self.params().mrblr(&*path.dpram)?;
        if mrblr == 0 {
            tracing::warn!("SCC{} MRBLR is zero, receive stalled", self.channel + 1);
            return Ok(report);
        }

        while !fifo.is_empty() {
            let mut bd = BufferDescriptor::load(&*path.dpram, current)?;
            if !bd.owned_by_cpm() {
                // Software took back a partially filled buffer
                self.rx_count = 0;
                tracing::debug!(
                    "SCC{} RX ring exhausted at {:#x}, {} bytes waiting",
                    self.channel + 1,
                    current,
                    fifo.len()
                );
                report.rearm = Rearm::Retry;
                return Ok(report);
            }

            if self.rx_count >= mrblr {
                self.close(path, &mut bd, &mut report)?;
                current = self.advance(path, &bd)?;
                continue;
            }

            let Some(byte) = fifo.pop() else { break };
            path.write_u8(bd.pointer as u64 + self.rx_count as u64, byte)?;
            self.rx_count += 1;
            bd.store_length(&mut *path.dpram, self.rx_count)?;
            report.consumed += 1;
        }

        if self.rx_count > 0 {
            report.rearm = Rearm::Poll;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{LinearMemory, DPRAM_BANK_SIZE};
    use crate::peripherals::cpm::descriptor::BdStatus;
    use crate::peripherals::cpm::pram;
    use crate::serial::CaptureBackend;
    use std::sync::{Arc, Mutex};

    const DPRAM_PHYS: u64 = 0xe108_0000;
    const RING: u64 = 0x40;
    const BUF0: u64 = 0x1000;
    const BUF1: u64 = 0x1100;

    fn setup(mrblr: u16) -> (DualPortRam, LinearMemory, ChannelRing) {
        let mut dpram = DualPortRam::new(DPRAM_BANK_SIZE);
        let pram = SccParams::page(0).base();
        dpram.write_u16(pram + pram::RBASE, RING as u16).unwrap();
        dpram.write_u16(pram + pram::TBASE, 0x80).unwrap();
        dpram.write_u16(pram + pram::MRBLR, mrblr).unwrap();

        dpram.write_u16(RING, BdStatus::EMPTY.bits() | BdStatus::INTERRUPT.bits()).unwrap();
        dpram.write_u32(RING + 4, BUF0 as u32).unwrap();
        dpram
            .write_u16(
                RING + 8,
                (BdStatus::EMPTY | BdStatus::WRAP | BdStatus::INTERRUPT).bits(),
            )
            .unwrap();
        dpram.write_u32(RING + 12, BUF1 as u32).unwrap();

        let mut ring = ChannelRing::new(0);
        ring.init(&mut dpram).unwrap();
        (dpram, LinearMemory::new(0x2000, 0), ring)
    }

    fn fill(fifo: &mut ReceiveFifo, bytes: &[u8]) {
        for b in bytes {
            fifo.push(*b).unwrap();
        }
    }

    #[test]
    fn test_rx_closes_at_mrblr_and_waits_when_exhausted() {
        let (mut dpram, mut sys, mut ring) = setup(4);
        let mut fifo = ReceiveFifo::default();
        fill(&mut fifo, b"0123456789");

        let mut path = DataPath {
            dpram: &mut dpram,
            system: &mut sys,
            dpram_phys: DPRAM_PHYS,
        };
        let report = ring.drain_rx(&mut path, &mut fifo).unwrap();
        assert_eq!(report.consumed, 8);
        assert_eq!(report.closed, 2);
        assert!(report.raise);
        assert_eq!(report.rearm, Rearm::Retry);
        assert_eq!(fifo.len(), 2);

        assert_eq!(sys.data[BUF0 as usize..BUF0 as usize + 4], *b"0123");
        assert_eq!(sys.data[BUF1 as usize..BUF1 as usize + 4], *b"4567");
        assert_eq!(dpram.read_u16(RING + 2).unwrap(), 4);
        assert_eq!(dpram.read_u16(RING).unwrap() & 0x8000, 0);
        assert_eq!(dpram.read_u16(RING + 8).unwrap() & 0x8000, 0);
        // Wrapped back to the base
        assert_eq!(ring.rx_current, Some(RING as u16));

        // Software returns BD0, the leftovers land there
        dpram.write_u16(RING, 0x9000).unwrap();
        let mut path = DataPath {
            dpram: &mut dpram,
            system: &mut sys,
            dpram_phys: DPRAM_PHYS,
        };
        let report = ring.drain_rx(&mut path, &mut fifo).unwrap();
        assert_eq!(report.consumed, 2);
        assert_eq!(report.rearm, Rearm::Poll);
        assert_eq!(report.closed, 0);

        // Idle poll closes the partial buffer
        let report = ring.drain_rx(&mut path, &mut fifo).unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(report.rearm, Rearm::None);
        assert_eq!(dpram.read_u16(RING).unwrap(), 0x1000);
        assert_eq!(dpram.read_u16(RING + 2).unwrap(), 2);
        assert_eq!(sys.data[BUF0 as usize..BUF0 as usize + 2], *b"89");
        assert_eq!(ring.rx_current, Some(RING as u16 + 8));
    }

    #[test]
    fn test_rx_buffer_inside_dpram() {
        let (mut dpram, mut sys, mut ring) = setup(8);
        dpram.write_u32(RING + 4, (DPRAM_PHYS + 0x200) as u32).unwrap();
        let mut fifo = ReceiveFifo::default();
        fill(&mut fifo, b"hi");

        let mut path = DataPath {
            dpram: &mut dpram,
            system: &mut sys,
            dpram_phys: DPRAM_PHYS,
        };
        ring.drain_rx(&mut path, &mut fifo).unwrap();
        assert_eq!(dpram.read_u16(0x200).unwrap(), u16::from_be_bytes(*b"hi"));
    }

    #[test]
    fn test_rx_zero_mrblr_consumes_nothing() {
        let (mut dpram, mut sys, mut ring) = setup(0);
        let mut fifo = ReceiveFifo::default();
        fill(&mut fifo, b"x");
        let mut path = DataPath {
            dpram: &mut dpram,
            system: &mut sys,
            dpram_phys: DPRAM_PHYS,
        };
        let report = ring.drain_rx(&mut path, &mut fifo).unwrap();
        assert_eq!(report.consumed, 0);
        assert_eq!(fifo.len(), 1);
    }

    #[test]
    fn test_tx_sends_and_releases() {
        let (mut dpram, mut sys, mut ring) = setup(4);
        sys.load(0x1800, b"hello");
        dpram.write_u16(0x82, 5).unwrap();
        dpram.write_u32(0x84, 0x1800).unwrap();
        dpram.write_u16(0x80, 0x9000).unwrap();

        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut backend = CaptureBackend::new(sink.clone(), false);
        let mut path = DataPath {
            dpram: &mut dpram,
            system: &mut sys,
            dpram_phys: DPRAM_PHYS,
        };
        let report = ring.transmit(&mut path, Some(&mut backend)).unwrap();
        assert_eq!(report, TxReport { sent: 5, raise: true });
        assert_eq!(sink.lock().unwrap().as_slice(), b"hello");
        assert_eq!(dpram.read_u16(0x80).unwrap(), 0x1000);

        // Already released: a second trigger is a no-op
        let mut path = DataPath {
            dpram: &mut dpram,
            system: &mut sys,
            dpram_phys: DPRAM_PHYS,
        };
        assert_eq!(ring.transmit(&mut path, None).unwrap().sent, 0);
    }
}
