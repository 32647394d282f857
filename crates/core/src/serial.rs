// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use labwired_cpm_config::{Parity, SerialConfig};
use std::fmt::Debug;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Framing requested from the byte-stream backend at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LineParams {
    pub baud: u32,
    pub parity: char,
    pub data_bits: u8,
    pub stop_bits: u8,
}

impl From<&SerialConfig> for LineParams {
    fn from(cfg: &SerialConfig) -> Self {
        Self {
            baud: cfg.baud,
            parity: match cfg.parity {
                Parity::None => 'N',
                Parity::Even => 'E',
                Parity::Odd => 'O',
            },
            data_bits: cfg.data_bits,
            stop_bits: cfg.stop_bits,
        }
    }
}

impl Default for LineParams {
    fn default() -> Self {
        (&SerialConfig::default()).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Break,
    Opened,
    Closed,
}

impl From<labwired_cpm_config::LineEventKind> for LineEvent {
    fn from(kind: labwired_cpm_config::LineEventKind) -> Self {
        use labwired_cpm_config::LineEventKind;
        match kind {
            LineEventKind::Break => LineEvent::Break,
            LineEventKind::Opened => LineEvent::Opened,
            LineEventKind::Closed => LineEvent::Closed,
        }
    }
}

/// Outbound half of the byte stream a serial channel is attached to.
pub trait SerialBackend: Debug + Send {
    fn send_byte(&mut self, byte: u8);
    fn set_line_params(&mut self, _params: &LineParams) {}
}

/// Backend that records transmitted bytes and optionally echoes them.
#[derive(Debug, Clone)]
pub struct CaptureBackend {
    sink: Arc<Mutex<Vec<u8>>>,
    echo_stdout: bool,
    params: Option<LineParams>,
}

impl CaptureBackend {
    pub fn new(sink: Arc<Mutex<Vec<u8>>>, echo_stdout: bool) -> Self {
        Self {
            sink,
            echo_stdout,
            params: None,
        }
    }

    pub fn line_params(&self) -> Option<LineParams> {
        self.params
    }
}

impl SerialBackend for CaptureBackend {
    fn send_byte(&mut self, byte: u8) {
        if let Ok(mut guard) = self.sink.lock() {
            guard.push(byte);
        }

        if self.echo_stdout {
            #[allow(unused_must_use)]
            {
                print!("{}", byte as char);
                io::stdout().flush();
            }
        }
    }

    fn set_line_params(&mut self, params: &LineParams) {
        tracing::debug!(
            "serial line {} {}{}{}",
            params.baud,
            params.data_bits,
            params.parity,
            params.stop_bits
        );
        self.params = Some(*params);
    }
}
