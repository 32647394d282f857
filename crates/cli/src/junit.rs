// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::Path;

use labwired_cpm_config::ScenarioAssertion;

use crate::{TestResult, RESULT_SCHEMA_VERSION};

fn details(result: &TestResult) -> String {
    let mut details = String::new();
    details.push_str(&format!(
        "result_schema_version={}\n",
        RESULT_SCHEMA_VERSION
    ));
    if let Some(msg) = &result.message {
        details.push_str(&format!("message={}\n", msg));
    }
    details.push_str(&format!("steps_executed={}\n", result.steps_executed));
    details.push_str(&format!("virtual_time_ns={}\n", result.virtual_time_ns));
    details.push_str(&format!("tx_bytes={}\n", result.tx_bytes));
    details.push_str(&format!("irq_asserted={}\n", result.irq_asserted));
    details.push_str(&format!("fifo_len={}\n", result.fifo_len));
    details.push_str(&format!("scenario_hash={}\n", result.scenario_hash));
    details.push_str(&format!("script={}\n", result.config.script.display()));
    if let Some(desc) = &result.config.descriptor {
        details.push_str(&format!("descriptor={}\n", desc.display()));
    }
    if !result.assertions.is_empty() {
        details.push_str("assertions:\n");
        for a in &result.assertions {
            details.push_str(&format!("  - {:?}: {}\n", a.assertion, a.passed));
        }
    }
    details
}

pub fn write_junit_xml(path: &Path, result: &TestResult) -> std::io::Result<()> {
    let details = details(result);

    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // "run" carries runtime/config errors and failed read checks
    tests += 1;
    testcases.push_str("  <testcase classname=\"labwired-cpm\" name=\"run\" time=\"0.000000\">\n");
    if result.status == "error" {
        errors += 1;
        let err_type = match result.error_kind.as_deref() {
            Some("config") => "config error",
            _ => "runtime error",
        };
        testcases.push_str(&format!(
            "    <error message=\"{}\">{}</error>\n",
            xml_escape(err_type),
            xml_escape(&details)
        ));
    } else if result
        .read_checks
        .iter()
        .any(|c| c.observed != c.expected)
    {
        failures += 1;
        testcases.push_str(&format!(
            "    <failure message=\"{}\">{}</failure>\n",
            xml_escape("read check failed"),
            xml_escape(&details)
        ));
    }
    testcases.push_str("  </testcase>\n");

    for (idx, a) in result.assertions.iter().enumerate() {
        tests += 1;
        let name = format!(
            "assertion {}: {}",
            idx + 1,
            assertion_short_name(&a.assertion)
        );
        testcases.push_str(&format!(
            "  <testcase classname=\"labwired-cpm\" name=\"{}\" time=\"0.000000\">\n",
            xml_escape(&name)
        ));
        if !a.passed {
            failures += 1;
            testcases.push_str(&format!(
                "    <failure message=\"assertion failed\">{}</failure>\n",
                xml_escape(&format!("{}\n\n{}", name, details))
            ));
        }
        testcases.push_str("  </testcase>\n");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="labwired-cpm" tests="{}" failures="{}" errors="{}" time="0.000000">"#,
        tests, failures, errors
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(RESULT_SCHEMA_VERSION)
    ));
    xml.push_str(&format!(
        "    <property name=\"virtual_time_ns\" value=\"{}\"/>\n",
        result.virtual_time_ns
    ));
    xml.push_str(&format!(
        "    <property name=\"scenario_hash\" value=\"{}\"/>\n",
        xml_escape(&result.scenario_hash)
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}

fn assertion_short_name(assertion: &ScenarioAssertion) -> String {
    const MAX_LEN: usize = 120;
    let s = match assertion {
        ScenarioAssertion::TxContains(a) => format!("tx_contains: {}", a.tx_contains),
        ScenarioAssertion::TxEquals(a) => format!("tx_equals: {}", a.tx_equals),
        ScenarioAssertion::Irq(a) => format!("irq_asserted: {}", a.irq_asserted),
        ScenarioAssertion::Memory(a) => format!(
            "memory: {:#x}/{} == {:#x}",
            a.memory.addr, a.memory.size, a.memory.equals
        ),
        ScenarioAssertion::FifoLen(a) => format!("fifo_len: {}", a.fifo_len),
    };

    if s.len() <= MAX_LEN {
        return s;
    }

    let mut truncated = s.chars().take(MAX_LEN - 1).collect::<String>();
    truncated.push('…');
    truncated
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
