// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::InterruptSink;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

#[derive(Debug, Default)]
struct LineState {
    level: AtomicBool,
    rising_edges: AtomicU32,
}

/// Level-triggered interrupt line shared between a peripheral and its host.
///
/// Clones observe the same line, so the host keeps one handle while the
/// peripheral drives another.
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    state: Arc<LineState>,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> DigitalLevel {
        self.state.level.load(Ordering::SeqCst).into()
    }

    pub fn is_asserted(&self) -> bool {
        self.state.level.load(Ordering::SeqCst)
    }

    /// Number of low-to-high transitions seen so far.
    pub fn rising_edges(&self) -> u32 {
        self.state.rising_edges.load(Ordering::SeqCst)
    }
}

impl InterruptSink for InterruptLine {
    fn assert_line(&mut self) {
        if !self.state.level.swap(true, Ordering::SeqCst) {
            self.state.rising_edges.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn deassert_line(&mut self) {
        self.state.level.store(false, Ordering::SeqCst);
    }
}
