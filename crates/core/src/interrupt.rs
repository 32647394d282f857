// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt::Debug;

/// Output side of a peripheral's interrupt request.
///
/// The line is level-triggered: it stays asserted until the peripheral
/// explicitly lowers it. Implementations route it to whatever interrupt
/// controller the host machine models (an OpenPIC input on the MPC85xx).
pub trait InterruptSink: Debug + Send {
    fn assert_line(&mut self);
    fn deassert_line(&mut self);
}

/// Sink for a peripheral whose interrupt output is not wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unwired;

impl InterruptSink for Unwired {
    fn assert_line(&mut self) {
        tracing::trace!("IRQ assert on unwired line");
    }

    fn deassert_line(&mut self) {}
}
