// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Folds SCC event/mask pairs into the SIU pending/mask registers and
//! drives the single CPM interrupt output.

use super::descriptor::SccEvents;
use super::registers::{intc, scc, RegisterBank};
use crate::interrupt::InterruptSink;

/// One row of the interrupt source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqSource {
    pub channel: usize,
    /// Bit in SIPNR_L / SIMR_L.
    pub pending_bit: u32,
    /// Value latched into SIVEC when the source fires.
    pub vector: u32,
    /// Channel events that contribute.
    pub events: SccEvents,
}

/// Sources wired in this model. SCC1 interrupt code is 0x28.
pub const SCC_SOURCES: [IrqSource; 1] = [IrqSource {
    channel: 0,
    pending_bit: 0x0080_0000,
    vector: 0x28 << 26,
    events: SccEvents::TX.union(SccEvents::RX),
}];

#[derive(Debug)]
pub struct InterruptAggregator {
    sources: Vec<IrqSource>,
    sink: Box<dyn InterruptSink>,
    asserted: bool,
}

impl InterruptAggregator {
    pub fn new(sink: Box<dyn InterruptSink>) -> Self {
        Self::with_sources(sink, SCC_SOURCES.to_vec())
    }

    pub fn with_sources(sink: Box<dyn InterruptSink>, sources: Vec<IrqSource>) -> Self {
        Self {
            sources,
            sink,
            asserted: false,
        }
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    fn source(&self, channel: usize) -> Option<IrqSource> {
        self.sources.iter().copied().find(|s| s.channel == channel)
    }

    fn assert(&mut self) {
        if !self.asserted {
            tracing::debug!("CPM IRQ raise");
        }
        self.asserted = true;
        self.sink.assert_line();
    }

    fn deassert(&mut self) {
        if self.asserted {
            tracing::debug!("CPM IRQ lower");
        }
        self.asserted = false;
        self.sink.deassert_line();
    }

    /// Channel `channel` latched new events.
    pub fn raise(&mut self, intc_regs: &mut RegisterBank, channels: &RegisterBank, channel: usize) {
        let Some(src) = self.source(channel) else {
            tracing::trace!("SCC{} has no interrupt source", channel + 1);
            return;
        };

        let events = channels.get(scc::offset(channel, scc::SCCE));
        let mask = channels.get(scc::offset(channel, scc::SCCM));
        let effective = SccEvents::from_bits_truncate((events & mask) as u16) & src.events;
        if effective.is_empty() {
            tracing::debug!(
                "SCC{} events {:#x} masked by SCCM {:#x}",
                channel + 1,
                events,
                mask
            );
            return;
        }

        let pending = intc_regs.get(intc::SIPNR_L) | src.pending_bit;
        intc_regs.set(intc::SIPNR_L, pending);

        if pending & intc_regs.get(intc::SIMR_L) & src.pending_bit != 0 {
            intc_regs.set(intc::SIVEC, src.vector);
            self.assert();
        } else {
            tracing::debug!("SCC{} pending but masked in SIMR_L", channel + 1);
        }
    }

    /// Software wrote `cleared` (in register position) to the channel's
    /// SCCE, which held `old_events` before the write.
    pub fn lower_on_clear(
        &mut self,
        intc_regs: &mut RegisterBank,
        channel: usize,
        cleared: u32,
        old_events: u32,
    ) {
        let Some(src) = self.source(channel) else {
            return;
        };
        if cleared & src.events.bits() as u32 == 0 {
            return;
        }

        let pending = intc_regs.get(intc::SIPNR_L) & !src.pending_bit;
        intc_regs.set(intc::SIPNR_L, pending);
        if old_events != 0 {
            self.refresh(intc_regs);
        }
    }

    /// Re-derives the line from SIPNR_L and SIMR_L.
    pub fn refresh(&mut self, intc_regs: &mut RegisterBank) {
        let active = intc_regs.get(intc::SIPNR_L) & intc_regs.get(intc::SIMR_L);
        let first = self
            .sources
            .iter()
            .find(|s| active & s.pending_bit != 0)
            .copied();

        match first {
            Some(src) if !self.asserted => {
                intc_regs.set(intc::SIVEC, src.vector);
                self.assert();
            }
            None if self.asserted => self.deassert(),
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        self.deassert();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::cpm::registers::Window;
    use crate::signals::InterruptLine;

    struct Fixture {
        line: InterruptLine,
        agg: InterruptAggregator,
        intc: RegisterBank,
        chans: RegisterBank,
    }

    fn fixture() -> Fixture {
        let line = InterruptLine::new();
        Fixture {
            agg: InterruptAggregator::new(Box::new(line.clone())),
            line,
            intc: RegisterBank::new(Window::Interrupt),
            chans: RegisterBank::new(Window::Channels),
        }
    }

    #[test]
    fn test_raise_needs_both_masks() {
        let mut f = fixture();
        f.chans.set(scc::SCCE, SccEvents::TX.bits() as u32);

        // SCCM clear: nothing latched
        f.agg.raise(&mut f.intc, &f.chans, 0);
        assert_eq!(f.intc.get(intc::SIPNR_L), 0);

        // SCCM set, SIMR clear: pending only
        f.chans.set(scc::SCCM, 0x3);
        f.agg.raise(&mut f.intc, &f.chans, 0);
        assert_eq!(f.intc.get(intc::SIPNR_L), 0x0080_0000);
        assert!(!f.line.is_asserted());

        f.intc.set(intc::SIMR_L, 0x0080_0000);
        f.agg.raise(&mut f.intc, &f.chans, 0);
        assert!(f.line.is_asserted());
        assert_eq!(f.intc.get(intc::SIVEC), 0xa000_0000);
    }

    #[test]
    fn test_lower_on_clear() {
        let mut f = fixture();
        f.chans.set(scc::SCCE, 0x2);
        f.chans.set(scc::SCCM, 0x3);
        f.intc.set(intc::SIMR_L, 0x0080_0000);
        f.agg.raise(&mut f.intc, &f.chans, 0);
        assert!(f.agg.is_asserted());

        // Unrelated bit does nothing
        f.agg.lower_on_clear(&mut f.intc, 0, 0x0100, 0x2);
        assert!(f.line.is_asserted());

        f.agg.lower_on_clear(&mut f.intc, 0, 0x0002, 0x2);
        assert_eq!(f.intc.get(intc::SIPNR_L), 0);
        assert!(!f.line.is_asserted());
    }

    #[test]
    fn test_refresh_after_late_unmask() {
        let mut f = fixture();
        f.chans.set(scc::SCCE, 0x1);
        f.chans.set(scc::SCCM, 0x1);
        f.agg.raise(&mut f.intc, &f.chans, 0);
        assert!(!f.line.is_asserted());

        f.intc.set(intc::SIMR_L, 0x0080_0000);
        f.agg.refresh(&mut f.intc);
        assert!(f.line.is_asserted());

        f.intc.set(intc::SIMR_L, 0);
        f.agg.refresh(&mut f.intc);
        assert!(!f.line.is_asserted());
    }

    #[test]
    fn test_extra_source_by_table() {
        let line = InterruptLine::new();
        let scc2 = IrqSource {
            channel: 1,
            pending_bit: 0x0040_0000,
            vector: 0x29 << 26,
            events: SccEvents::RX,
        };
        let mut agg = InterruptAggregator::with_sources(
            Box::new(line.clone()),
            vec![SCC_SOURCES[0], scc2],
        );
        let mut intc_regs = RegisterBank::new(Window::Interrupt);
        let mut chans = RegisterBank::new(Window::Channels);
        chans.set(scc::offset(1, scc::SCCE), 0x1);
        chans.set(scc::offset(1, scc::SCCM), 0x1);
        intc_regs.set(intc::SIMR_L, 0x00c0_0000);

        agg.raise(&mut intc_regs, &chans, 1);
        assert!(line.is_asserted());
        assert_eq!(intc_regs.get(intc::SIVEC), 0xa400_0000);
    }
}
