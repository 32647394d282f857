// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! MPC8560 Communications Processor Module.
//!
//! The CPM owns four register windows, the dual-port RAM, the SCC1
//! receive FIFO and the descriptor rings. Every entry point (bus access,
//! inbound bytes, timer delivery, reset) runs to completion on `&mut self`,
//! so a host that shares the instance wraps it in a single lock.

pub mod aggregator;
pub mod command;
pub mod descriptor;
pub mod fifo;
pub mod pram;
pub mod registers;
pub mod ring;

use crate::interrupt::InterruptSink;
use crate::memory::{DualPortRam, SystemMemory, DPRAM_BANK_SIZE};
use crate::serial::{LineEvent, LineParams, SerialBackend};
use crate::snapshot::{ChannelSnapshot, CpmSnapshot};
use crate::timer::{TimerHandle, TimerService};
use crate::{SimResult, SimulationError};
use aggregator::InterruptAggregator;
use anyhow::Context;
use command::{Command, Opcode, SubBlock, CPCR_FLG};
use descriptor::{BdStatus, BufferDescriptor, SccEvents};
use fifo::ReceiveFifo;
use labwired_cpm_config::CpmDescriptor;
use registers::{cp, scc, RegisterBank, SideEffect, Window, WriteOutcome};
use ring::{ChannelRing, DataPath, Rearm};
use std::fmt;

/// Offset of the CPM block from CCSRBAR.
pub const CPM_OFFSET: u64 = 0x8_0000;

/// Channels with a working ring engine. SCC2..SCC4 are register storage only.
const ACTIVE_CHANNELS: usize = 1;
/// Channel fed by the receive FIFO.
const RX_CHANNEL: usize = 0;

pub struct Cpm {
    name: String,
    ccsr_base: u64,
    general: RegisterBank,
    intc: RegisterBank,
    cp: RegisterBank,
    chans: RegisterBank,
    dpram: DualPortRam,
    system: Box<dyn SystemMemory>,
    fifo: ReceiveFifo,
    rings: Vec<ChannelRing>,
    irq: InterruptAggregator,
    timer: Box<dyn TimerService>,
    poll: Option<TimerHandle>,
    serial: Option<Box<dyn SerialBackend>>,
    line_params: LineParams,
    poll_interval_ns: u64,
    rx_retry_ns: u64,
    break_as_nul: bool,
}

impl fmt::Debug for Cpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpm")
            .field("name", &self.name)
            .field("ccsr_base", &format_args!("{:#x}", self.ccsr_base))
            .field("fifo", &self.fifo)
            .field("rings", &self.rings)
            .field("irq", &self.irq)
            .field("poll", &self.poll)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

fn read_sized(mem: &dyn SystemMemory, addr: u64, size: u8) -> SimResult<u32> {
    match size {
        1 => mem.read_u8(addr).map(u32::from),
        2 => mem.read_u16(addr).map(u32::from),
        4 => mem.read_u32(addr),
        _ => Err(SimulationError::BadAccess {
            register: "memory",
            offset: addr,
            size,
            width: 4,
        }),
    }
}

fn write_sized(mem: &mut dyn SystemMemory, addr: u64, size: u8, value: u32) -> SimResult<()> {
    match size {
        1 => mem.write_u8(addr, value as u8),
        2 => mem.write_u16(addr, value as u16),
        4 => mem.write_u32(addr, value),
        _ => Err(SimulationError::BadAccess {
            register: "memory",
            offset: addr,
            size,
            width: 4,
        }),
    }
}

impl Cpm {
    /// A CPM with default configuration.
    pub fn new(
        system: Box<dyn SystemMemory>,
        irq: Box<dyn InterruptSink>,
        timer: Box<dyn TimerService>,
    ) -> Self {
        let cfg = CpmDescriptor::default();
        Self::build(&cfg, DPRAM_BANK_SIZE, system, irq, timer)
    }

    pub fn from_config(
        cfg: &CpmDescriptor,
        system: Box<dyn SystemMemory>,
        irq: Box<dyn InterruptSink>,
        timer: Box<dyn TimerService>,
    ) -> anyhow::Result<Self> {
        cfg.validate()
            .with_context(|| format!("invalid CPM descriptor '{}'", cfg.name))?;
        let bank_size = cfg.dpram_bytes()?;
        Ok(Self::build(cfg, bank_size, system, irq, timer))
    }

    fn build(
        cfg: &CpmDescriptor,
        bank_size: usize,
        system: Box<dyn SystemMemory>,
        irq: Box<dyn InterruptSink>,
        timer: Box<dyn TimerService>,
    ) -> Self {
        Self {
            name: cfg.name.clone(),
            ccsr_base: cfg.ccsr_base,
            general: RegisterBank::new(Window::General),
            intc: RegisterBank::new(Window::Interrupt),
            cp: RegisterBank::new(Window::Command),
            chans: RegisterBank::new(Window::Channels),
            dpram: DualPortRam::new(bank_size),
            system,
            fifo: ReceiveFifo::new(cfg.rx_fifo_capacity),
            rings: (0..scc::CHANNELS).map(ChannelRing::new).collect(),
            irq: InterruptAggregator::new(irq),
            timer,
            poll: None,
            serial: None,
            line_params: LineParams::from(&cfg.serial),
            poll_interval_ns: cfg.poll_interval_ns,
            rx_retry_ns: cfg.rx_retry_ns,
            break_as_nul: cfg.break_as_nul,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical address of DPRAM bank 1.
    pub fn dpram_phys(&self) -> u64 {
        self.ccsr_base + CPM_OFFSET
    }

    pub fn registers(&self, window: Window) -> &RegisterBank {
        match window {
            Window::General => &self.general,
            Window::Interrupt => &self.intc,
            Window::Command => &self.cp,
            Window::Channels => &self.chans,
        }
    }

    fn registers_mut(&mut self, window: Window) -> &mut RegisterBank {
        match window {
            Window::General => &mut self.general,
            Window::Interrupt => &mut self.intc,
            Window::Command => &mut self.cp,
            Window::Channels => &mut self.chans,
        }
    }

    pub fn ring(&self, channel: usize) -> Option<&ChannelRing> {
        self.rings.get(channel)
    }

    pub fn irq_asserted(&self) -> bool {
        self.irq.is_asserted()
    }

    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    pub fn fifo_overruns(&self) -> u64 {
        self.fifo.overruns()
    }

    pub fn line_params(&self) -> LineParams {
        self.line_params
    }

    pub fn poll_armed(&self) -> bool {
        self.poll.is_some()
    }

    // -- register windows --

    pub fn try_read(&self, window: Window, offset: u64, size: u8) -> SimResult<u32> {
        self.registers(window).read(offset, size)
    }

    pub fn try_write(&mut self, window: Window, offset: u64, size: u8, value: u32) -> SimResult<()> {
        let outcome = self.registers_mut(window).write(offset, size, value)?;
        if let Some(effect) = outcome.side_effect {
            self.apply_side_effect(effect, &outcome);
        }
        Ok(())
    }

    /// Bus-facing read: addressing errors are logged and read as zero.
    pub fn read_window(&self, window: Window, offset: u64, size: u8) -> u32 {
        self.try_read(window, offset, size).unwrap_or_else(|e| {
            tracing::warn!("{}: read failed: {}", self.name, e);
            0
        })
    }

    /// Bus-facing write: addressing errors are logged and the write dropped.
    pub fn write_window(&mut self, window: Window, offset: u64, size: u8, value: u32) {
        if let Err(e) = self.try_write(window, offset, size, value) {
            tracing::warn!("{}: write failed: {}", self.name, e);
        }
    }

    fn apply_side_effect(&mut self, effect: SideEffect, outcome: &WriteOutcome) {
        match effect {
            SideEffect::Command => self.execute_command(outcome.new),
            SideEffect::EventsCleared(ch) => {
                self.irq
                    .lower_on_clear(&mut self.intc, ch, outcome.written, outcome.old)
            }
            SideEffect::MaskAlias(ch) => {
                self.chans.set(scc::offset(ch, scc::SCCM), outcome.new);
            }
            SideEffect::InterruptRefresh => self.irq.refresh(&mut self.intc),
        }
    }

    // -- command processor --

    fn execute_command(&mut self, raw: u32) {
        let command = match Command::decode(raw) {
            Ok(Command::Reset) => {
                self.reset();
                return;
            }
            Ok(command) => Some(command),
            Err(e) => {
                tracing::warn!("{}: CPCR {:#010x}: {}", self.name, raw, e);
                None
            }
        };

        match command {
            Some(Command::Channel {
                block,
                page,
                opcode,
            }) => self.dispatch(block, page, opcode),
            Some(Command::Block {
                block,
                page,
                opcode,
            }) => {
                tracing::debug!(
                    "{}: {:?} opcode {:#x} page {} not modeled",
                    self.name,
                    block,
                    opcode,
                    page
                );
            }
            Some(Command::Reset) | None => {}
        }

        let cpcr = self.cp.get(cp::CPCR) & !CPCR_FLG;
        self.cp.set(cp::CPCR, cpcr);
    }

    fn dispatch(&mut self, block: SubBlock, page: u8, opcode: Opcode) {
        match (block, opcode) {
            (SubBlock::Scc(_), Opcode::InitRxTxParams) => {
                tracing::debug!("{}: INIT RX AND TX PARAMS, page {}", self.name, page);
                let ring = &mut self.rings[page as usize];
                if let Err(e) = ring.init(&mut self.dpram) {
                    tracing::warn!("{}: ring init failed: {}", self.name, e);
                }
            }
            (SubBlock::Scc(n), op) => {
                tracing::debug!("{}: SCC{} {:?} accepted, no effect", self.name, n + 1, op);
            }
            (other, op) => {
                tracing::debug!("{}: {:?} {:?} not modeled", self.name, other, op);
            }
        }
    }

    // -- dual-port RAM --

    /// Big-endian DPRAM read at a CPM-relative offset.
    pub fn read_dpram(&self, offset: u64, size: u8) -> SimResult<u32> {
        read_sized(&self.dpram, offset, size)
    }

    /// Big-endian DPRAM store. A store that sets R on an active channel's
    /// current transmit descriptor sends it.
    pub fn write_dpram(&mut self, offset: u64, size: u8, value: u32) -> SimResult<()> {
        write_sized(&mut self.dpram, offset, size, value)?;
        for ch in 0..ACTIVE_CHANNELS {
            if self.tx_triggered(ch, offset, size)? {
                self.transmit(ch);
            }
        }
        Ok(())
    }

    fn tx_triggered(&self, ch: usize, offset: u64, size: u8) -> SimResult<bool> {
        let bd = self.rings[ch].tx_current(&self.dpram)?;
        if !BufferDescriptor::status_overlaps(bd, offset, size) {
            return Ok(false);
        }
        let status = BdStatus::from_bits_retain(self.dpram.read_u16(bd)?);
        Ok(status.contains(BdStatus::READY))
    }

    fn transmit(&mut self, ch: usize) {
        let dpram_phys = self.dpram_phys();
        let mut path = DataPath {
            dpram: &mut self.dpram,
            system: &mut *self.system,
            dpram_phys,
        };
        match self.rings[ch].transmit(&mut path, self.serial.as_deref_mut()) {
            Ok(report) => {
                tracing::debug!("{}: SCC{} sent {} bytes", self.name, ch + 1, report.sent);
                if report.raise {
                    self.latch_event(ch, SccEvents::TX);
                }
            }
            Err(e) => tracing::warn!("{}: SCC{} transmit failed: {}", self.name, ch + 1, e),
        }
    }

    fn latch_event(&mut self, ch: usize, event: SccEvents) {
        let off = scc::offset(ch, scc::SCCE);
        self.chans.set(off, self.chans.get(off) | event.bits() as u32);
        self.irq.raise(&mut self.intc, &self.chans, ch);
    }

    // -- physical view used by buffer pointers --

    fn phys_to_dpram(&self, addr: u64) -> Option<u64> {
        let off = addr.checked_sub(self.dpram_phys())?;
        self.dpram.contains(off).then_some(off)
    }

    pub fn read_phys(&self, addr: u64, size: u8) -> SimResult<u32> {
        match self.phys_to_dpram(addr) {
            Some(off) => self.read_dpram(off, size),
            None => read_sized(&*self.system, addr, size),
        }
    }

    pub fn write_phys(&mut self, addr: u64, size: u8, value: u32) -> SimResult<()> {
        match self.phys_to_dpram(addr) {
            Some(off) => self.write_dpram(off, size, value),
            None => write_sized(&mut *self.system, addr, size, value),
        }
    }

    /// Bulk copy to a physical address. Never triggers a transmit.
    pub fn load_phys(&mut self, addr: u64, bytes: &[u8]) -> SimResult<()> {
        for (i, byte) in bytes.iter().enumerate() {
            let at = addr + i as u64;
            match self.phys_to_dpram(at) {
                Some(off) => self.dpram.write_u8(off, *byte)?,
                None => self.system.write_u8(at, *byte)?,
            }
        }
        Ok(())
    }

    // -- serial backend --

    pub fn attach_serial(&mut self, mut backend: Box<dyn SerialBackend>) {
        backend.set_line_params(&self.line_params);
        tracing::info!(
            "{}: serial backend attached at {} baud",
            self.name,
            self.line_params.baud
        );
        self.serial = Some(backend);
    }

    pub fn can_receive(&self) -> bool {
        !self.fifo.is_full()
    }

    /// Queues inbound bytes and arms the poll. Returns how many were kept.
    pub fn receive(&mut self, bytes: &[u8]) -> usize {
        let mut kept = 0;
        for byte in bytes {
            match self.fifo.push(*byte) {
                Ok(()) => kept += 1,
                Err(e) => tracing::warn!("{}: byte {:#04x} dropped: {}", self.name, byte, e),
            }
        }
        if !self.fifo.is_empty() {
            self.arm_poll(self.poll_interval_ns);
        }
        kept
    }

    pub fn line_event(&mut self, event: LineEvent) {
        match event {
            LineEvent::Break if self.break_as_nul => {
                tracing::debug!("{}: break received as NUL", self.name);
                self.receive(&[0]);
            }
            LineEvent::Break => tracing::debug!("{}: break ignored", self.name),
            LineEvent::Opened | LineEvent::Closed => {
                tracing::info!("{}: serial line {:?}", self.name, event)
            }
        }
    }

    // -- poll timer --

    fn arm_poll(&mut self, delay_ns: u64) {
        self.disarm_poll();
        let handle = self.timer.schedule_after(delay_ns);
        tracing::debug!("{}: poll armed, +{}ns", self.name, delay_ns);
        self.poll = Some(handle);
    }

    fn disarm_poll(&mut self) {
        if let Some(handle) = self.poll.take() {
            self.timer.cancel(handle);
        }
    }

    /// Timer delivery from the host. Returns false for handles this
    /// instance no longer waits on.
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        if self.poll != Some(handle) {
            tracing::trace!("{}: stale timer {}", self.name, handle.id());
            return false;
        }
        self.poll = None;
        self.poll_rx();
        true
    }

    /// Runs the receive drain once.
    pub fn poll_rx(&mut self) {
        let dpram_phys = self.dpram_phys();
        let mut path = DataPath {
            dpram: &mut self.dpram,
            system: &mut *self.system,
            dpram_phys,
        };
        let report = match self.rings[RX_CHANNEL].drain_rx(&mut path, &mut self.fifo) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("{}: receive drain failed: {}", self.name, e);
                return;
            }
        };

        if report.raise {
            self.latch_event(RX_CHANNEL, SccEvents::RX);
        }
        match report.rearm {
            Rearm::Poll => self.arm_poll(self.poll_interval_ns),
            Rearm::Retry => self.arm_poll(self.rx_retry_ns),
            Rearm::None => {}
        }
    }

    // -- lifecycle --

    /// Restores every register to its power-on value, lowers the line and
    /// disarms the poll. DPRAM and queued bytes are left alone.
    pub fn reset(&mut self) {
        for bank in [
            &mut self.general,
            &mut self.intc,
            &mut self.cp,
            &mut self.chans,
        ] {
            bank.reset();
        }
        self.irq.reset();
        self.disarm_poll();
        self.rings = (0..scc::CHANNELS).map(ChannelRing::new).collect();
        tracing::info!("{}: reset", self.name);
    }

    pub fn snapshot_state(&self) -> CpmSnapshot {
        CpmSnapshot {
            name: self.name.clone(),
            registers: Window::ALL
                .iter()
                .map(|w| (w.name().to_string(), self.registers(*w).named_values()))
                .collect(),
            channels: self
                .rings
                .iter()
                .map(|r| ChannelSnapshot {
                    channel: r.channel,
                    rx_current: r.rx_current,
                    rx_count: r.rx_count,
                })
                .collect(),
            fifo_len: self.fifo.len(),
            fifo_overruns: self.fifo.overruns(),
            irq: self.irq.is_asserted().into(),
            poll_armed: self.poll.is_some(),
        }
    }
}

impl Drop for Cpm {
    fn drop(&mut self) {
        self.disarm_poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinearMemory;
    use crate::serial::CaptureBackend;
    use crate::signals::InterruptLine;
    use crate::timer::SharedClock;
    use registers::intc;
    use std::sync::{Arc, Mutex};

    fn fixture() -> (Cpm, InterruptLine, SharedClock) {
        let line = InterruptLine::new();
        let clock = SharedClock::new();
        let cpm = Cpm::new(
            Box::new(LinearMemory::new(0x1_0000, 0)),
            Box::new(line.clone()),
            Box::new(clock.clone()),
        );
        (cpm, line, clock)
    }

    #[test]
    fn test_busy_flag_cleared_after_command() {
        let (mut cpm, _, _) = fixture();
        cpm.write_window(Window::Command, cp::CPCR, 4, 0x0080_0000 | CPCR_FLG);
        assert_eq!(cpm.read_window(Window::Command, cp::CPCR, 4), 0x0080_0000);

        // Decode errors still complete the command
        cpm.write_window(Window::Command, cp::CPCR, 4, (0x01 << 21) | CPCR_FLG);
        assert_eq!(cpm.read_window(Window::Command, cp::CPCR, 4) & CPCR_FLG, 0);
    }

    #[test]
    fn test_non_serial_command_is_accepted() {
        let (mut cpm, _, _) = fixture();
        // TIMER block, opcode 7
        cpm.write_window(Window::Command, cp::CPCR, 4, (0x0f << 21) | 0x7 | CPCR_FLG);
        assert_eq!(cpm.read_window(Window::Command, cp::CPCR, 4), (0x0f << 21) | 0x7);
        assert_eq!(cpm.ring(0).unwrap().rx_current, None);
    }

    #[test]
    fn test_init_then_receive_fills_descriptor() {
        let (mut cpm, line, _) = fixture();
        let pram = pram::SccParams::page(0).base();
        cpm.write_dpram(pram + pram::RBASE, 2, 0x40).unwrap();
        cpm.write_dpram(pram + pram::MRBLR, 2, 4).unwrap();
        cpm.write_dpram(0x40, 2, 0xb000).unwrap();
        cpm.write_dpram(0x44, 4, 0x1000).unwrap();
        cpm.write_window(Window::Channels, scc::SCCM, 2, SccEvents::RX.bits() as u32);
        cpm.write_window(Window::Interrupt, intc::SIMR_L, 4, 0x0080_0000);

        cpm.write_window(Window::Command, cp::CPCR, 4, 0x0081_0000);
        assert_eq!(cpm.ring(0).unwrap().rx_current, Some(0x40));

        assert_eq!(cpm.receive(b"ab"), 2);
        cpm.poll_rx();
        assert_eq!(cpm.fifo_len(), 0);
        assert_eq!(cpm.read_dpram(0x42, 2).unwrap(), 2);
        assert_eq!(cpm.read_phys(0x1000, 2).unwrap(), u16::from_be_bytes(*b"ab") as u32);
        assert!(cpm.poll_armed());
        assert!(!line.is_asserted());

        // Idle poll closes the buffer and raises the SCC1 interrupt
        cpm.poll_rx();
        assert_eq!(cpm.read_dpram(0x40, 2).unwrap(), 0x3000);
        assert_eq!(cpm.read_window(Window::Channels, scc::SCCE, 2), 0x1);
        assert!(line.is_asserted());
    }

    #[test]
    fn test_unmapped_access_degrades() {
        let (mut cpm, _, _) = fixture();
        assert_eq!(cpm.read_window(Window::Interrupt, 0x10, 4), 0);
        cpm.write_window(Window::Interrupt, 0x10, 4, 0xffff_ffff);
        assert!(matches!(
            cpm.try_read(Window::Interrupt, 0x10, 4),
            Err(SimulationError::Unmapped { .. })
        ));
    }

    #[test]
    fn test_errata_register_mirrors_into_mask() {
        let (mut cpm, _, _) = fixture();
        cpm.write_window(Window::Channels, scc::RESV, 2, 0x0003);
        assert_eq!(cpm.read_window(Window::Channels, scc::SCCM, 2), 0x0003);
    }

    #[test]
    fn test_reset_disarms_poll_and_keeps_fifo() {
        let (mut cpm, _, clock) = fixture();
        cpm.write_window(Window::Interrupt, intc::SIMR_L, 4, 0x0080_0000);
        assert_eq!(cpm.receive(b"ab"), 2);
        assert!(cpm.poll_armed());
        assert_eq!(clock.pending_count(), 1);

        cpm.write_window(Window::Command, cp::CPCR, 4, 0x8001_0000);
        assert!(!cpm.poll_armed());
        assert_eq!(clock.pending_count(), 0);
        assert_eq!(cpm.read_window(Window::Interrupt, intc::SIMR_L, 4), 0);
        assert_eq!(cpm.fifo_len(), 2);
    }

    #[test]
    fn test_stale_timer_ignored() {
        let (mut cpm, _, clock) = fixture();
        cpm.receive(b"x");
        let mut fired = Vec::new();
        clock.run_for(10_000_000, |h| fired.push(h));
        assert_eq!(fired.len(), 1);

        // Re-arming replaces the handle the CPM waits on
        cpm.receive(b"y");
        assert!(!cpm.on_timer(fired[0]));

        let mut delivered = Vec::new();
        clock.run_for(10_000_000, |h| delivered.push(cpm.on_timer(h)));
        assert_eq!(delivered, vec![true]);
    }

    #[test]
    fn test_attach_negotiates_line_params() {
        let (mut cpm, _, _) = fixture();
        let sink = Arc::new(Mutex::new(Vec::new()));
        cpm.attach_serial(Box::new(CaptureBackend::new(sink, false)));
        assert_eq!(cpm.line_params().baud, 114_583);
    }

    #[test]
    fn test_break_as_nul() {
        let line = InterruptLine::new();
        let cfg = CpmDescriptor {
            break_as_nul: true,
            ..Default::default()
        };
        let mut cpm = Cpm::from_config(
            &cfg,
            Box::new(crate::memory::NoMemory),
            Box::new(line),
            Box::new(SharedClock::new()),
        )
        .unwrap();
        cpm.line_event(LineEvent::Break);
        assert_eq!(cpm.fifo_len(), 1);

        let (mut plain, _, _) = fixture();
        plain.line_event(LineEvent::Break);
        assert_eq!(plain.fifo_len(), 0);
    }

    #[test]
    fn test_drop_cancels_poll() {
        let (mut cpm, _, clock) = fixture();
        cpm.receive(b"z");
        assert_eq!(clock.pending_count(), 1);
        drop(cpm);
        assert_eq!(clock.pending_count(), 0);
    }
}
