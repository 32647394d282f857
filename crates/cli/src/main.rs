// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use labwired_cpm::{
    CaptureBackend, Cpm, InterruptLine, NoMemory, Peripheral, SharedClock, SharedMemory,
    SystemMemory, TimerService, Window,
};
use labwired_cpm_config::{
    load_scenario, parse_size, CpmDescriptor, Scenario, ScenarioAssertion, Step,
};

mod junit;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "LabWired CPM Simulator", long_about = None)]
struct Cli {
    /// Enable debug-level tracing of register, command and ring activity
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deterministic, CI-friendly runner driven by a scenario script (YAML).
    Test(TestArgs),

    /// Print the power-on state of a CPM instance as JSON.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the scenario script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// CPM descriptor (takes precedence over the script's inputs)
    #[arg(short = 'd', long)]
    descriptor: Option<PathBuf>,

    /// Echo transmitted bytes to stdout
    #[arg(long)]
    echo_tx: bool,

    /// Directory to write artifacts (result.json, snapshot.json, tx.log, junit.xml)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional path to write a JUnit XML report for CI systems
    #[arg(long)]
    junit: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// CPM descriptor (defaults to the built-in MPC8560 layout)
    #[arg(short = 'd', long)]
    descriptor: Option<PathBuf>,
}

#[derive(Debug, Serialize, Clone)]
pub struct AssertionResult {
    pub assertion: ScenarioAssertion,
    pub passed: bool,
}

/// A `read` step with an `expect` value.
#[derive(Debug, Serialize, Clone)]
pub struct ReadCheck {
    pub step: usize,
    pub window: Window,
    pub offset: u64,
    pub expected: u32,
    pub observed: u32,
}

#[derive(Debug, Serialize, Clone)]
pub struct TestConfig {
    pub script: PathBuf,
    pub descriptor: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct TestResult {
    pub result_schema_version: String,
    pub status: String,
    pub steps_executed: usize,
    pub virtual_time_ns: u64,
    pub tx_bytes: usize,
    pub irq_asserted: bool,
    pub fifo_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// "config" or "runtime" when `status` is "error".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub read_checks: Vec<ReadCheck>,
    pub assertions: Vec<AssertionResult>,
    pub scenario_hash: String,
    pub config: TestConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Test(args) => run_test(args),
        Commands::Snapshot(args) => run_snapshot(args),
    }
}

fn resolve_relative(script_path: &Path, p: &str) -> PathBuf {
    let candidate = PathBuf::from(p);
    if candidate.is_absolute() {
        return candidate;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}

fn load_descriptor(path: Option<&PathBuf>) -> anyhow::Result<CpmDescriptor> {
    match path {
        Some(p) => CpmDescriptor::from_file(p),
        None => Ok(CpmDescriptor::default()),
    }
}

/// Everything a scenario can poke at.
struct Session {
    cpm: Cpm,
    clock: SharedClock,
    line: InterruptLine,
    tx: Arc<Mutex<Vec<u8>>>,
}

impl Session {
    fn new(desc: &CpmDescriptor, echo_tx: bool) -> anyhow::Result<Self> {
        let system: Box<dyn SystemMemory> = match &desc.system_ram {
            Some(range) => {
                let size = parse_size(&range.size)? as usize;
                Box::new(SharedMemory::new(size, range.base))
            }
            None => Box::new(NoMemory),
        };
        let clock = SharedClock::new();
        let line = InterruptLine::new();
        let mut cpm = Cpm::from_config(
            desc,
            system,
            Box::new(line.clone()),
            Box::new(clock.clone()),
        )?;

        let tx = Arc::new(Mutex::new(Vec::new()));
        cpm.attach_serial(Box::new(CaptureBackend::new(tx.clone(), echo_tx)));

        Ok(Self {
            cpm,
            clock,
            line,
            tx,
        })
    }

    fn tx_bytes(&self) -> Vec<u8> {
        self.tx.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn advance(&mut self, ns: u64) {
        let cpm = &mut self.cpm;
        self.clock.run_for(ns, |handle| {
            cpm.on_timer(handle);
        });
    }

    fn step(&mut self, idx: usize, step: &Step) -> anyhow::Result<Option<ReadCheck>> {
        match step {
            Step::Write(w) => {
                self.cpm
                    .try_write(w.window.into(), w.offset, w.size, w.value)?;
            }
            Step::Read(r) => {
                let window: Window = r.window.into();
                let observed = self.cpm.try_read(window, r.offset, r.size)?;
                if let Some(expected) = r.expect {
                    return Ok(Some(ReadCheck {
                        step: idx,
                        window,
                        offset: r.offset,
                        expected,
                        observed,
                    }));
                }
            }
            Step::Poke(p) => self.cpm.write_phys(p.addr, p.size, p.value)?,
            Step::Load(l) => self.cpm.load_phys(l.addr, l.data.as_bytes())?,
            Step::Rx(rx) => {
                let kept = self.cpm.receive(rx.data.as_bytes());
                if kept < rx.data.len() {
                    info!("rx: {} of {} bytes accepted", kept, rx.data.len());
                }
            }
            Step::LineEvent(kind) => self.cpm.line_event((*kind).into()),
            Step::AdvanceNs(ns) => self.advance(*ns),
            Step::Reset => self.cpm.reset(),
        }
        Ok(None)
    }

    fn check(&self, assertion: &ScenarioAssertion) -> bool {
        let tx = self.tx_bytes();
        match assertion {
            ScenarioAssertion::TxContains(a) => {
                String::from_utf8_lossy(&tx).contains(a.tx_contains.as_str())
            }
            ScenarioAssertion::TxEquals(a) => tx == a.tx_equals.as_bytes(),
            ScenarioAssertion::Irq(a) => self.line.is_asserted() == a.irq_asserted,
            ScenarioAssertion::Memory(a) => {
                let m = &a.memory;
                match self.cpm.read_phys(m.addr, m.size) {
                    Ok(v) => v == m.equals,
                    Err(e) => {
                        error!("memory assertion at {:#x}: {}", m.addr, e);
                        false
                    }
                }
            }
            ScenarioAssertion::FifoLen(a) => self.cpm.fifo_len() == a.fifo_len,
        }
    }
}

fn scenario_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        }
        Err(_) => String::new(),
    }
}

fn run_test(args: TestArgs) -> ExitCode {
    let config = TestConfig {
        script: args.script.clone(),
        descriptor: args.descriptor.clone(),
    };

    let scenario: Scenario = match load_scenario(&args.script) {
        Ok(s) => s,
        Err(e) => return config_error(&args, config, format!("{:#}", e)),
    };

    let descriptor_path = args.descriptor.clone().or_else(|| {
        scenario
            .inputs
            .descriptor
            .as_deref()
            .map(|p| resolve_relative(&args.script, p))
    });
    let config = TestConfig {
        descriptor: descriptor_path.clone(),
        ..config
    };

    let desc = match load_descriptor(descriptor_path.as_ref()) {
        Ok(d) => d,
        Err(e) => return config_error(&args, config, format!("{:#}", e)),
    };
    let mut session = match Session::new(&desc, args.echo_tx) {
        Ok(s) => s,
        Err(e) => return config_error(&args, config, format!("{:#}", e)),
    };
    info!("Running scenario {:?} on '{}'", args.script, desc.name);

    let mut read_checks = Vec::new();
    let mut steps_executed = 0;
    let mut runtime_error = None;
    for (idx, step) in scenario.steps.iter().enumerate() {
        match session.step(idx, step) {
            Ok(check) => read_checks.extend(check),
            Err(e) => {
                let msg = format!("step {}: {:#}", idx, e);
                error!("{}", msg);
                runtime_error = Some(msg);
                break;
            }
        }
        steps_executed += 1;
    }

    let mut all_passed = true;
    for check in &read_checks {
        if check.observed != check.expected {
            all_passed = false;
            error!(
                "Read check failed at step {}: {} {:#x} = {:#x}, expected {:#x}",
                check.step,
                check.window.name(),
                check.offset,
                check.observed,
                check.expected
            );
        }
    }

    let mut assertions = Vec::new();
    for assertion in &scenario.assertions {
        let passed = session.check(assertion);
        if !passed {
            all_passed = false;
            error!("Assertion failed: {:?}", assertion);
        }
        assertions.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    let status = if runtime_error.is_some() {
        "error"
    } else if !all_passed {
        "fail"
    } else {
        "pass"
    };

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        steps_executed,
        virtual_time_ns: session.clock.now_ns(),
        tx_bytes: session.tx_bytes().len(),
        irq_asserted: session.line.is_asserted(),
        fifo_len: session.cpm.fifo_len(),
        error_kind: runtime_error.as_ref().map(|_| "runtime".to_string()),
        message: runtime_error,
        read_checks,
        assertions,
        scenario_hash: scenario_hash(&args.script),
        config,
    };
    write_outputs(&args, &result, Some(&session));

    match status {
        "fail" => ExitCode::from(EXIT_ASSERT_FAIL),
        "error" => ExitCode::from(EXIT_RUNTIME_ERROR),
        _ => ExitCode::from(EXIT_PASS),
    }
}

fn config_error(args: &TestArgs, config: TestConfig, msg: String) -> ExitCode {
    error!("{}", msg);
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        steps_executed: 0,
        virtual_time_ns: 0,
        tx_bytes: 0,
        irq_asserted: false,
        fifo_len: 0,
        message: Some(msg),
        error_kind: Some("config".to_string()),
        read_checks: Vec::new(),
        assertions: Vec::new(),
        scenario_hash: scenario_hash(&args.script),
        config,
    };
    write_outputs(args, &result, None);
    ExitCode::from(EXIT_CONFIG_ERROR)
}

fn write_outputs(args: &TestArgs, result: &TestResult, session: Option<&Session>) {
    match serde_json::to_string(result) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize result: {}", e),
    }

    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
        } else {
            let result_path = output_dir.join("result.json");
            match std::fs::File::create(&result_path) {
                Ok(f) => {
                    if let Err(e) = serde_json::to_writer_pretty(f, result) {
                        error!("Failed to write result.json: {}", e);
                    }
                }
                Err(e) => error!("Failed to create result.json: {}", e),
            }

            if let Some(session) = session {
                let snapshot_path = output_dir.join("snapshot.json");
                match std::fs::File::create(&snapshot_path) {
                    Ok(f) => {
                        if let Err(e) = serde_json::to_writer_pretty(f, &session.cpm.snapshot()) {
                            error!("Failed to write snapshot.json: {}", e);
                        }
                    }
                    Err(e) => error!("Failed to create snapshot.json: {}", e),
                }

                let tx_path = output_dir.join("tx.log");
                if let Err(e) = std::fs::write(&tx_path, session.tx_bytes()) {
                    error!("Failed to write tx.log: {}", e);
                }
            }

            if let Err(e) = junit::write_junit_xml(&output_dir.join("junit.xml"), result) {
                error!("Failed to write junit.xml: {}", e);
            }
        }
    }

    if let Some(junit_path) = &args.junit {
        if let Some(parent) = junit_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = junit::write_junit_xml(junit_path, result) {
            error!("Failed to write JUnit report {:?}: {}", junit_path, e);
        }
    }
}

fn run_snapshot(args: SnapshotArgs) -> ExitCode {
    let desc = match load_descriptor(args.descriptor.as_ref()) {
        Ok(d) => d,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let session = match Session::new(&desc, false) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match serde_json::to_string_pretty(&session.cpm.snapshot()) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("Failed to serialize snapshot: {}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}
