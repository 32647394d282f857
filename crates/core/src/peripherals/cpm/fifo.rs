// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Bounded receive FIFO between the serial backend and the SCC1 ring.

use crate::{SimResult, SimulationError};
use std::collections::VecDeque;

pub const DEFAULT_RX_FIFO_CAPACITY: usize = 32;

/// Bounded byte queue between the serial backend and the receive ring.
#[derive(Debug, Clone)]
pub struct ReceiveFifo {
    bytes: VecDeque<u8>,
    capacity: usize,
    overruns: u64,
}

impl Default for ReceiveFifo {
    fn default() -> Self {
        Self::new(DEFAULT_RX_FIFO_CAPACITY)
    }
}

impl ReceiveFifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
            overruns: 0,
        }
    }

    /// Queues a byte. A full queue drops it and counts an overrun.
    pub fn push(&mut self, byte: u8) -> SimResult<()> {
        if self.is_full() {
            self.overruns += 1;
            return Err(SimulationError::FifoOverrun);
        }
        self.bytes.push_back(byte);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes dropped since creation.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}
