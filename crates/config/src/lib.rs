// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod scenario;

pub use scenario::{
    load_scenario, FifoLenAssertion, IrqAssertion, LineEventKind, LoadStep, MemoryAssertion,
    MemoryExpectation, PokeStep, ReadStep, RegisterWindow, RxStep, Scenario, ScenarioAssertion,
    ScenarioInputs, Step, TxContainsAssertion, TxEqualsAssertion, WriteStep,
};

/// CCSRBAR of the MPC8560 after the boot loader relocates it.
pub const DEFAULT_CCSR_BASE: u64 = 0xE100_0000;

/// Largest DPRAM bank the CPM decodes.
pub const MAX_DPRAM_BANK: u64 = 0x4000;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_ccsr_base() -> u64 {
    DEFAULT_CCSR_BASE
}

fn default_dpram_size() -> String {
    "0x4000".to_string()
}

fn default_rx_fifo_capacity() -> usize {
    32
}

fn default_poll_interval_ns() -> u64 {
    10_000_000
}

fn default_rx_retry_ns() -> u64 {
    20_000_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryRange {
    pub base: u64,
    pub size: String, // e.g. "64KB"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    #[serde(alias = "n")]
    None,
    #[serde(alias = "e")]
    Even,
    #[serde(alias = "o")]
    Odd,
}

fn default_baud() -> u32 {
    // 115200 nominal, the BRG divider lands on 114583
    114_583
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            parity: Parity::None,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
        }
    }
}

/// Describes one CPM instance inside a simulated machine.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CpmDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_ccsr_base")]
    pub ccsr_base: u64,
    /// Size of each of the two DPRAM banks.
    #[serde(default = "default_dpram_size")]
    pub dpram_size: String,
    /// External memory reachable through buffer descriptor pointers.
    #[serde(default)]
    pub system_ram: Option<MemoryRange>,
    #[serde(default = "default_rx_fifo_capacity")]
    pub rx_fifo_capacity: usize,
    #[serde(default = "default_poll_interval_ns")]
    pub poll_interval_ns: u64,
    #[serde(default = "default_rx_retry_ns")]
    pub rx_retry_ns: u64,
    /// Queue a NUL byte when the backend reports a break condition.
    #[serde(default)]
    pub break_as_nul: bool,
    #[serde(default)]
    pub serial: SerialConfig,
}

impl Default for CpmDescriptor {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "mpc8560-cpm".to_string(),
            ccsr_base: default_ccsr_base(),
            dpram_size: default_dpram_size(),
            system_ram: None,
            rx_fifo_capacity: default_rx_fifo_capacity(),
            poll_interval_ns: default_poll_interval_ns(),
            rx_retry_ns: default_rx_retry_ns(),
            break_as_nul: false,
            serial: SerialConfig::default(),
        }
    }
}

impl CpmDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open CPM descriptor at {:?}", path.as_ref()))?;
        let desc: Self =
            serde_yaml::from_reader(f).context("Failed to parse CPM Descriptor YAML")?;
        desc.validate()?;
        tracing::debug!("Loaded CPM descriptor '{}' from {:?}", desc.name, path.as_ref());
        Ok(desc)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let desc: Self =
            serde_yaml::from_str(content).context("Failed to parse CPM Descriptor YAML")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn dpram_bytes(&self) -> Result<usize> {
        let size = parse_size(&self.dpram_size)
            .with_context(|| format!("Invalid dpram_size '{}'", self.dpram_size))?;
        Ok(size as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        let dpram = parse_size(&self.dpram_size)
            .with_context(|| format!("Invalid dpram_size '{}'", self.dpram_size))?;
        if dpram == 0 || dpram > MAX_DPRAM_BANK || dpram % 8 != 0 {
            anyhow::bail!(
                "dpram_size must be a non-zero multiple of 8 no larger than {:#x}, got {:#x}",
                MAX_DPRAM_BANK,
                dpram
            );
        }

        if let Some(ram) = &self.system_ram {
            let size = parse_size(&ram.size)
                .with_context(|| format!("Invalid system_ram size '{}'", ram.size))?;
            if size == 0 {
                anyhow::bail!("system_ram size must be greater than zero");
            }
        }

        if self.rx_fifo_capacity == 0 {
            anyhow::bail!("rx_fifo_capacity must be greater than zero");
        }
        if self.poll_interval_ns == 0 || self.rx_retry_ns == 0 {
            anyhow::bail!("poll_interval_ns and rx_retry_ns must be greater than zero");
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            anyhow::bail!(
                "serial.data_bits must be between 5 and 8, got {}",
                self.serial.data_bits
            );
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            anyhow::bail!(
                "serial.stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            );
        }
        Ok(())
    }
}

/// Parses a byte count: plain decimal, `0x` hex, or a human size such as "16KiB".
pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let trimmed = size_str.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hex size '{}': {}", size_str, e));
    }
    if let Ok(v) = trimmed.parse::<u64>() {
        return Ok(v);
    }
    let s: Size = trimmed
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
