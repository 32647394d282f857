// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Scenario scripts: an ordered list of bus-level stimuli for a CPM
//! instance followed by assertions on what it produced.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterWindow {
    General,
    Interrupt,
    Command,
    Channels,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ScenarioInputs {
    /// CPM descriptor path, relative to the scenario file.
    #[serde(default)]
    pub descriptor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WriteStep {
    pub window: RegisterWindow,
    pub offset: u64,
    pub size: u8,
    pub value: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReadStep {
    pub window: RegisterWindow,
    pub offset: u64,
    pub size: u8,
    #[serde(default)]
    pub expect: Option<u32>,
}

/// Big-endian store of `size` bytes at a physical address.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PokeStep {
    pub addr: u64,
    pub size: u8,
    pub value: u32,
}

/// Raw bytes copied to a physical address.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoadStep {
    pub addr: u64,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RxStep {
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEventKind {
    Break,
    Opened,
    Closed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Write(WriteStep),
    Read(ReadStep),
    Poke(PokeStep),
    Load(LoadStep),
    Rx(RxStep),
    LineEvent(LineEventKind),
    AdvanceNs(u64),
    Reset,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TxContainsAssertion {
    pub tx_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TxEqualsAssertion {
    pub tx_equals: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct IrqAssertion {
    pub irq_asserted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryExpectation {
    pub addr: u64,
    pub size: u8,
    pub equals: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryAssertion {
    pub memory: MemoryExpectation,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FifoLenAssertion {
    pub fifo_len: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScenarioAssertion {
    TxContains(TxContainsAssertion),
    TxEquals(TxEqualsAssertion),
    Irq(IrqAssertion),
    Memory(MemoryAssertion),
    FifoLen(FifoLenAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: ScenarioInputs,
    /// Each step is a single-key map, e.g. `- write: { .. }`, or a bare
    /// name for steps without arguments.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

fn check_size(size: u8, what: &str) -> Result<()> {
    if !matches!(size, 1 | 2 | 4) {
        anyhow::bail!("{} size must be 1, 2 or 4, got {}", what, size);
    }
    Ok(())
}

impl Scenario {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let scenario: Self =
            serde_yaml::from_str(content).context("Failed to parse Scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.steps.is_empty() {
            anyhow::bail!("Scenario must contain at least one step");
        }

        for (idx, step) in self.steps.iter().enumerate() {
            match step {
                Step::Write(w) => check_size(w.size, "write")
                    .with_context(|| format!("step {}", idx))?,
                Step::Read(r) => check_size(r.size, "read")
                    .with_context(|| format!("step {}", idx))?,
                Step::Poke(p) => check_size(p.size, "poke")
                    .with_context(|| format!("step {}", idx))?,
                Step::AdvanceNs(0) => {
                    anyhow::bail!("step {}: advance_ns must be greater than zero", idx)
                }
                _ => {}
            }
        }

        for assertion in &self.assertions {
            if let ScenarioAssertion::Memory(m) = assertion {
                check_size(m.memory.size, "memory assertion")?;
            }
        }

        Ok(())
    }
}

pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario> {
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read scenario at {:?}", path.as_ref()))?;
    let scenario = Scenario::from_yaml(&contents)?;
    tracing::debug!(
        "Loaded scenario {:?}: {} steps, {} assertions",
        path.as_ref(),
        scenario.steps.len(),
        scenario.assertions.len()
    );
    Ok(scenario)
}
