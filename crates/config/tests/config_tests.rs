// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use labwired_cpm_config::{load_scenario, CpmDescriptor, Parity, ScenarioAssertion, Step};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(stem: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("labwired_cpm_{}_{}.yaml", stem, nanos))
}

#[test]
fn test_full_descriptor_parses() {
    let yaml = r#"
schema_version: "1.0"
name: "cpm-board-a"
ccsr_base: 0xF0000000
dpram_size: "0x2000"
system_ram:
  base: 0x0
  size: "0x100000"
rx_fifo_capacity: 64
poll_interval_ns: 5000000
rx_retry_ns: 40000000
break_as_nul: true
serial:
  baud: 9600
  parity: even
  data_bits: 7
  stop_bits: 2
"#;
    let desc = CpmDescriptor::from_yaml(yaml).unwrap();
    assert_eq!(desc.name, "cpm-board-a");
    assert_eq!(desc.ccsr_base, 0xF000_0000);
    assert_eq!(desc.dpram_bytes().unwrap(), 0x2000);
    assert_eq!(desc.rx_fifo_capacity, 64);
    assert!(desc.break_as_nul);
    assert_eq!(desc.serial.parity, Parity::Even);
    assert_eq!(desc.serial.data_bits, 7);
    assert_eq!(desc.serial.stop_bits, 2);
    let ram = desc.system_ram.unwrap();
    assert_eq!(labwired_cpm_config::parse_size(&ram.size).unwrap(), 0x10_0000);
}

#[test]
fn test_descriptor_from_file_reports_path() {
    let missing = temp_path("missing");
    let err = CpmDescriptor::from_file(&missing).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to open CPM descriptor"));
}

#[test]
fn test_zero_fifo_rejected() {
    let yaml = "name: cpm0\nrx_fifo_capacity: 0\n";
    let err = CpmDescriptor::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("rx_fifo_capacity"));
}

#[test]
fn test_scenario_round_trip_through_file() {
    let path = temp_path("scenario");
    std::fs::write(
        &path,
        r#"
schema_version: "1.0"
steps:
  - write: { window: command, offset: 0x0, size: 4, value: 0x80010000 }
  - advance_ns: 20000000
assertions:
  - tx_equals: ""
"#,
    )
    .unwrap();

    let scenario = load_scenario(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(scenario.steps.len(), 2);
    assert!(matches!(scenario.steps[1], Step::AdvanceNs(20_000_000)));
    assert!(matches!(
        scenario.assertions[0],
        ScenarioAssertion::TxEquals(_)
    ));
}

#[test]
fn test_scenario_unknown_step_rejected() {
    let path = temp_path("bad_step");
    std::fs::write(
        &path,
        r#"
schema_version: "1.0"
steps:
  - explode: { now: true }
"#,
    )
    .unwrap();

    let result = load_scenario(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}
