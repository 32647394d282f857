// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::DigitalLevel;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize, Debug, Clone)]
pub struct CpmSnapshot {
    pub name: String,
    /// Register values by window, then by register name.
    pub registers: BTreeMap<String, BTreeMap<String, u32>>,
    pub channels: Vec<ChannelSnapshot>,
    pub fifo_len: usize,
    pub fifo_overruns: u64,
    pub irq: DigitalLevel,
    pub poll_armed: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct ChannelSnapshot {
    pub channel: usize,
    pub rx_current: Option<u16>,
    pub rx_count: u16,
}
