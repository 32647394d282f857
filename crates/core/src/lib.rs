// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Behavioural model of the MPC8560 Communications Processor Module.

pub mod bitfield;
pub mod bus;
pub mod interrupt;
pub mod memory;
pub mod peripherals;
pub mod serial;
pub mod signals;
pub mod snapshot;
pub mod timer;

pub use bus::{CpmAddressMap, Region};
pub use interrupt::{InterruptSink, Unwired};
pub use memory::{DualPortRam, LinearMemory, NoMemory, SharedMemory, SystemMemory};
pub use peripherals::cpm::registers::Window;
pub use peripherals::cpm::Cpm;
pub use serial::{CaptureBackend, LineEvent, LineParams, SerialBackend};
pub use signals::{DigitalLevel, InterruptLine};
pub use timer::{SharedClock, TimerHandle, TimerService, VirtualClock};

/// Malformed CPCR command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown sub-block code {0:#04x}")]
    UnknownSubBlock(u8),
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    #[error("page {page} out of range for sub-block {sbc:#04x}")]
    InvalidPage { page: u8, sbc: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("unmapped {window} register offset {offset:#x}")]
    Unmapped { window: &'static str, offset: u64 },
    #[error("bad {size}-byte access to {register} at {offset:#x} (width {width})")]
    BadAccess {
        register: &'static str,
        offset: u64,
        size: u8,
        width: u8,
    },
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("command decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("receive FIFO overrun")]
    FifoOverrun,
}

pub type SimResult<T> = Result<T, SimulationError>;

/// A memory-mapped block a host bus can mount.
///
/// Offsets are relative to the block's base, accesses are big-endian and
/// `size` is 1, 2 or 4 bytes.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64, size: u8) -> SimResult<u32>;
    fn write(&mut self, offset: u64, size: u8, value: u32) -> SimResult<()>;
    fn reset(&mut self) {}
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
