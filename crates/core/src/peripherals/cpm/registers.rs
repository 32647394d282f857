// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Table-driven register windows of the CPM.
//!
//! Each window is a flat list of [`RegisterSpec`] rows. Accesses resolve to
//! the row whose byte range contains the address, then go through
//! [`SubAccess`] so byte and half-word accesses work at any lane.

use crate::bitfield::SubAccess;
use crate::{SimResult, SimulationError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// I/O ports, clocks, BRGs and the CPM mux.
    General,
    /// SIU interrupt controller.
    Interrupt,
    /// Communications processor command registers.
    Command,
    /// SCC1..SCC4 channel registers.
    Channels,
}

impl Window {
    pub const ALL: [Window; 4] = [
        Window::General,
        Window::Interrupt,
        Window::Command,
        Window::Channels,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Window::General => "general",
            Window::Interrupt => "interrupt",
            Window::Command => "command",
            Window::Channels => "channels",
        }
    }

    pub fn registers(&self) -> Vec<RegisterSpec> {
        match self {
            Window::General => general_registers(),
            Window::Interrupt => interrupt_registers(),
            Window::Command => command_registers(),
            Window::Channels => channel_registers(),
        }
    }
}

impl From<labwired_cpm_config::RegisterWindow> for Window {
    fn from(w: labwired_cpm_config::RegisterWindow) -> Self {
        use labwired_cpm_config::RegisterWindow;
        match w {
            RegisterWindow::General => Window::General,
            RegisterWindow::Interrupt => Window::Interrupt,
            RegisterWindow::Command => Window::Command,
            RegisterWindow::Channels => Window::Channels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    Normal,
    /// Write-one-to-clear.
    ClearOnWrite,
    ReadOnly,
}

/// Behaviour hooked onto a register write, run after the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// CPCR: decode and execute a command.
    Command,
    /// SCCE of a channel: software acknowledged events.
    EventsCleared(usize),
    /// SCC1 errata register, mirrored into SCCM.
    MaskAlias(usize),
    /// SIPNR/SIMR: re-evaluate the interrupt line.
    InterruptRefresh,
}

#[derive(Debug, Clone)]
pub struct RegisterSpec {
    pub name: &'static str,
    pub channel: Option<usize>,
    pub offset: u64,
    pub width: u8,
    pub policy: WritePolicy,
    /// Bits that survive a store.
    pub effective_mask: u32,
    pub reset: u32,
    pub side_effect: Option<SideEffect>,
}

impl RegisterSpec {
    pub fn new(name: &'static str, offset: u64, width: u8) -> Self {
        Self {
            name,
            channel: None,
            offset,
            width,
            policy: WritePolicy::Normal,
            effective_mask: ((1u64 << (width as u32 * 8)) - 1) as u32,
            reset: 0,
            side_effect: None,
        }
    }

    pub fn reset(mut self, value: u32) -> Self {
        self.reset = value;
        self
    }

    pub fn clear_on_write(mut self) -> Self {
        self.policy = WritePolicy::ClearOnWrite;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.policy = WritePolicy::ReadOnly;
        self
    }

    pub fn bits(mut self, mask: u32) -> Self {
        self.effective_mask = mask;
        self
    }

    pub fn effect(mut self, effect: SideEffect) -> Self {
        self.side_effect = Some(effect);
        self
    }

    pub fn channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.offset + self.width as u64
    }

    /// Name as the reference manual spells it, e.g. `SCCE1`.
    pub fn display_name(&self) -> String {
        match self.channel {
            Some(ch) => format!("{}{}", self.name, ch + 1),
            None => self.name.to_string(),
        }
    }
}

/// Result of a register store, handed to the side-effect dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub old: u32,
    pub new: u32,
    /// The written value moved into register position.
    pub written: u32,
    pub side_effect: Option<SideEffect>,
}

/// Power-on and live values for one window.
#[derive(Debug, Clone)]
pub struct RegisterBank {
    window: Window,
    specs: Vec<RegisterSpec>,
    values: Vec<u32>,
}

impl RegisterBank {
    pub fn new(window: Window) -> Self {
        Self::with_specs(window, window.registers())
    }

    pub fn with_specs(window: Window, specs: Vec<RegisterSpec>) -> Self {
        let values = specs.iter().map(|s| s.reset).collect();
        Self {
            window,
            specs,
            values,
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn specs(&self) -> &[RegisterSpec] {
        &self.specs
    }

    pub fn reset(&mut self) {
        for (value, spec) in self.values.iter_mut().zip(&self.specs) {
            *value = spec.reset;
        }
    }

    fn resolve(&self, offset: u64) -> SimResult<usize> {
        self.specs
            .iter()
            .position(|s| s.contains(offset))
            .ok_or(SimulationError::Unmapped {
                window: self.window.name(),
                offset,
            })
    }

    pub fn read(&self, offset: u64, size: u8) -> SimResult<u32> {
        let idx = self.resolve(offset)?;
        let spec = &self.specs[idx];
        let acc = SubAccess::locate(spec.name, spec.offset, spec.width, offset, size)?;
        Ok(acc.read(self.values[idx]))
    }

    pub fn write(&mut self, offset: u64, size: u8, value: u32) -> SimResult<WriteOutcome> {
        let idx = self.resolve(offset)?;
        let spec = &self.specs[idx];
        let acc = SubAccess::locate(spec.name, spec.offset, spec.width, offset, size)?;
        let old = self.values[idx];

        let new = match spec.policy {
            WritePolicy::Normal => acc.write_normal(old, value) & spec.effective_mask,
            WritePolicy::ClearOnWrite => acc.write_clear(old, value),
            WritePolicy::ReadOnly => {
                tracing::debug!(
                    "{} write to read-only {} ignored",
                    self.window.name(),
                    spec.display_name()
                );
                old
            }
        };
        self.values[idx] = new;

        tracing::trace!(
            "{} {} <- {:#x} ({:#x} -> {:#x})",
            self.window.name(),
            spec.display_name(),
            value,
            old,
            new
        );

        Ok(WriteOutcome {
            old,
            new,
            written: acc.positioned(value),
            side_effect: spec.side_effect,
        })
    }

    /// Full value of the register starting at `offset`.
    pub fn get(&self, offset: u64) -> u32 {
        self.specs
            .iter()
            .position(|s| s.offset == offset)
            .map_or(0, |idx| self.values[idx])
    }

    /// Stores a full value, bypassing the write policy.
    pub fn set(&mut self, offset: u64, value: u32) {
        if let Some(idx) = self.specs.iter().position(|s| s.offset == offset) {
            self.values[idx] = value & self.specs[idx].effective_mask;
        }
    }

    pub fn named_values(&self) -> BTreeMap<String, u32> {
        self.specs
            .iter()
            .zip(&self.values)
            .map(|(spec, value)| (spec.display_name(), *value))
            .collect()
    }
}

/// Offsets in the general window (CCSR + 0x9_0000).
pub mod general {
    pub const SCCR: u64 = 0xc80;
    pub const PORT_BASE: u64 = 0xd00;
    pub const PORT_STRIDE: u64 = 0x20;
    pub const PDIR: u64 = 0x00;
    pub const PPAR: u64 = 0x04;
    pub const PSOR: u64 = 0x08;
    pub const PODR: u64 = 0x0c;
    pub const PDAT: u64 = 0x10;
    pub const BRGC1: u64 = 0x19f0;
    pub const CMXSI1CR: u64 = 0x1b00;
    pub const CMXSI2CR: u64 = 0x1b02;
    pub const CMXFCR: u64 = 0x1b04;
    pub const CMXSCR: u64 = 0x1b08;
    pub const CMXUAR: u64 = 0x1b0e;
}

/// Offsets in the interrupt window (CCSR + 0x9_0C00).
pub mod intc {
    pub const SICR: u64 = 0x00;
    pub const SIVEC: u64 = 0x04;
    pub const SIPNR_H: u64 = 0x08;
    pub const SIPNR_L: u64 = 0x0c;
    pub const SCPRR_H: u64 = 0x14;
    pub const SCPRR_L: u64 = 0x18;
    pub const SIMR_H: u64 = 0x1c;
    pub const SIMR_L: u64 = 0x20;
    pub const SIEXR: u64 = 0x24;

    pub const SCPRR_RESET: u32 = 0x0530_9770;
}

/// Offsets in the command window (CCSR + 0x9_19C0).
pub mod cp {
    pub const CPCR: u64 = 0x00;
    pub const RCCR: u64 = 0x04;
    pub const RTER: u64 = 0x16;
    pub const RTMR: u64 = 0x1a;
    pub const RTSCR: u64 = 0x1c;
    pub const RTSR: u64 = 0x20;
}

/// Per-channel offsets in the channel window (CCSR + 0x9_1A00).
pub mod scc {
    pub const CHANNELS: usize = 4;
    pub const STRIDE: u64 = 0x20;

    pub const GSMR_L: u64 = 0x00;
    pub const GSMR_H: u64 = 0x04;
    pub const PSMR: u64 = 0x08;
    pub const TODR: u64 = 0x0c;
    pub const DSR: u64 = 0x0e;
    pub const SCCE: u64 = 0x10;
    pub const RESV: u64 = 0x12;
    pub const SCCM: u64 = 0x14;
    pub const SCCS: u64 = 0x17;

    pub const DSR_RESET: u32 = 0x7e7e;

    pub fn offset(channel: usize, reg: u64) -> u64 {
        channel as u64 * STRIDE + reg
    }
}

pub fn general_registers() -> Vec<RegisterSpec> {
    use general::*;
    const PORTS: [[&str; 5]; 4] = [
        ["PDIRA", "PPARA", "PSORA", "PODRA", "PDATA"],
        ["PDIRB", "PPARB", "PSORB", "PODRB", "PDATB"],
        ["PDIRC", "PPARC", "PSORC", "PODRC", "PDATC"],
        ["PDIRD", "PPARD", "PSORD", "PODRD", "PDATD"],
    ];
    const BRGS: [&str; 4] = ["BRGC1", "BRGC2", "BRGC3", "BRGC4"];

    let mut regs = vec![RegisterSpec::new("SCCR", SCCR, 4).reset(1)];
    for (port, names) in PORTS.iter().enumerate() {
        let base = PORT_BASE + port as u64 * PORT_STRIDE;
        for (name, off) in names.iter().zip([PDIR, PPAR, PSOR, PODR, PDAT]) {
            regs.push(RegisterSpec::new(*name, base + off, 4));
        }
    }
    for (i, name) in BRGS.iter().enumerate() {
        regs.push(RegisterSpec::new(*name, BRGC1 + 4 * i as u64, 4));
    }
    regs.extend([
        RegisterSpec::new("CMXSI1CR", CMXSI1CR, 1),
        RegisterSpec::new("CMXSI2CR", CMXSI2CR, 1),
        RegisterSpec::new("CMXFCR", CMXFCR, 4),
        RegisterSpec::new("CMXSCR", CMXSCR, 4),
        RegisterSpec::new("CMXUAR", CMXUAR, 2),
    ]);
    regs
}

pub fn interrupt_registers() -> Vec<RegisterSpec> {
    use intc::*;
    vec![
        RegisterSpec::new("SICR", SICR, 4).bits(0xffff),
        RegisterSpec::new("SIVEC", SIVEC, 4),
        RegisterSpec::new("SIPNR_H", SIPNR_H, 4)
            .clear_on_write()
            .effect(SideEffect::InterruptRefresh),
        RegisterSpec::new("SIPNR_L", SIPNR_L, 4)
            .clear_on_write()
            .effect(SideEffect::InterruptRefresh),
        RegisterSpec::new("SCPRR_H", SCPRR_H, 4).reset(SCPRR_RESET),
        RegisterSpec::new("SCPRR_L", SCPRR_L, 4).reset(SCPRR_RESET),
        RegisterSpec::new("SIMR_H", SIMR_H, 4).effect(SideEffect::InterruptRefresh),
        RegisterSpec::new("SIMR_L", SIMR_L, 4).effect(SideEffect::InterruptRefresh),
        RegisterSpec::new("SIEXR", SIEXR, 4),
    ]
}

pub fn command_registers() -> Vec<RegisterSpec> {
    use cp::*;
    vec![
        RegisterSpec::new("CPCR", CPCR, 4).effect(SideEffect::Command),
        RegisterSpec::new("RCCR", RCCR, 4),
        RegisterSpec::new("RTER", RTER, 2),
        RegisterSpec::new("RTMR", RTMR, 2),
        RegisterSpec::new("RTSCR", RTSCR, 2),
        // 32-bit slot, only the low half is implemented
        RegisterSpec::new("RTSR", RTSR, 4).bits(0xffff),
    ]
}

pub fn channel_registers() -> Vec<RegisterSpec> {
    use scc::*;
    let mut regs = Vec::new();
    for ch in 0..CHANNELS {
        let at = |reg| offset(ch, reg);
        regs.extend([
            RegisterSpec::new("GSMR_L", at(GSMR_L), 4).channel(ch),
            RegisterSpec::new("GSMR_H", at(GSMR_H), 4).channel(ch),
            RegisterSpec::new("PSMR", at(PSMR), 2).channel(ch),
            RegisterSpec::new("TODR", at(TODR), 2).channel(ch),
            RegisterSpec::new("DSR", at(DSR), 2).channel(ch).reset(DSR_RESET),
            RegisterSpec::new("SCCE", at(SCCE), 2)
                .channel(ch)
                .clear_on_write()
                .effect(SideEffect::EventsCleared(ch)),
            RegisterSpec::new("SCCM", at(SCCM), 2).channel(ch),
            RegisterSpec::new("SCCS", at(SCCS), 1).channel(ch),
        ]);
        if ch == 0 {
            regs.push(
                RegisterSpec::new("RESV", at(RESV), 2)
                    .channel(ch)
                    .effect(SideEffect::MaskAlias(ch)),
            );
        }
    }
    regs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_unique_within_each_window() {
        for window in Window::ALL {
            let specs = window.registers();
            for (i, a) in specs.iter().enumerate() {
                for b in &specs[i + 1..] {
                    let overlap = a.offset < b.offset + b.width as u64
                        && b.offset < a.offset + a.width as u64;
                    assert!(
                        !overlap,
                        "{} overlaps {} in {}",
                        a.display_name(),
                        b.display_name(),
                        window.name()
                    );
                }
            }
        }
    }

    #[test]
    fn test_power_on_values() {
        let intc = RegisterBank::new(Window::Interrupt);
        assert_eq!(intc.read(intc::SCPRR_H, 4).unwrap(), 0x0530_9770);
        assert_eq!(intc.read(intc::SCPRR_L, 4).unwrap(), 0x0530_9770);
        assert_eq!(intc.read(intc::SIPNR_L, 4).unwrap(), 0);

        let chans = RegisterBank::new(Window::Channels);
        for ch in 0..scc::CHANNELS {
            assert_eq!(chans.read(scc::offset(ch, scc::DSR), 2).unwrap(), 0x7e7e);
        }

        let gen = RegisterBank::new(Window::General);
        assert_eq!(gen.read(general::SCCR, 4).unwrap(), 1);
    }

    #[test]
    fn test_unmapped_offset() {
        let bank = RegisterBank::new(Window::Command);
        assert_eq!(
            bank.read(0x10, 4),
            Err(SimulationError::Unmapped {
                window: "command",
                offset: 0x10
            })
        );
        let mut bank = bank;
        assert!(bank.write(0x2c, 4, 1).is_err());
    }

    #[test]
    fn test_byte_access_inside_register() {
        let mut bank = RegisterBank::new(Window::Channels);
        bank.write(scc::GSMR_L + 3, 1, 0x0c).unwrap();
        bank.write(scc::GSMR_L, 1, 0x80).unwrap();
        assert_eq!(bank.read(scc::GSMR_L, 4).unwrap(), 0x8000_000c);
        assert_eq!(bank.read(scc::GSMR_L + 2, 2).unwrap(), 0x000c);
    }

    #[test]
    fn test_clear_on_write_policy() {
        let mut bank = RegisterBank::new(Window::Interrupt);
        bank.set(intc::SIPNR_L, 0x0080_0001);
        let out = bank.write(intc::SIPNR_L, 4, 0x0080_0000).unwrap();
        assert_eq!(out.old, 0x0080_0001);
        assert_eq!(out.new, 0x0000_0001);
        assert_eq!(out.side_effect, Some(SideEffect::InterruptRefresh));

        // Zero is a no-op
        bank.write(intc::SIPNR_L, 4, 0).unwrap();
        assert_eq!(bank.get(intc::SIPNR_L), 1);
    }

    #[test]
    fn test_effective_width_truncation() {
        let mut bank = RegisterBank::new(Window::Command);
        bank.write(cp::RTSR, 4, 0x1234_5678).unwrap();
        assert_eq!(bank.read(cp::RTSR, 4).unwrap(), 0x5678);
    }

    #[test]
    fn test_read_only_policy() {
        let mut bank = RegisterBank::with_specs(
            Window::General,
            vec![RegisterSpec::new("CEAR", 0x0, 4).read_only().reset(7)],
        );
        let out = bank.write(0x0, 4, 0xffff_ffff).unwrap();
        assert_eq!(out.new, 7);
        assert_eq!(bank.read(0x0, 4).unwrap(), 7);
    }

    #[test]
    fn test_errata_register_only_on_first_channel() {
        let bank = RegisterBank::new(Window::Channels);
        assert!(bank.read(scc::offset(0, scc::RESV), 2).is_ok());
        assert!(bank.read(scc::offset(1, scc::RESV), 2).is_err());
    }

    #[test]
    fn test_reset_restores_table_values() {
        let mut bank = RegisterBank::new(Window::Interrupt);
        bank.write(intc::SCPRR_L, 4, 0).unwrap();
        bank.write(intc::SIMR_L, 4, 0xffff_ffff).unwrap();
        bank.reset();
        assert_eq!(bank.get(intc::SCPRR_L), intc::SCPRR_RESET);
        assert_eq!(bank.get(intc::SIMR_L), 0);
        assert_eq!(
            bank.named_values().get("SCPRR_L").copied(),
            Some(intc::SCPRR_RESET)
        );
    }
}
