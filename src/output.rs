//! Output layer for schemapull.
//!
//! Two streams, kept strictly apart:
//! - informational (stdout): load notices, datasource summary, progress,
//!   warnings, the printed schema and JSON envelopes
//! - diagnostic (stderr): `--verbose` traces and human-mode error reports
//!
//! Both streams can be redirected into buffers so tests can assert on exactly
//! what each one received.

use serde::Serialize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Destination of one output stream.
#[derive(Debug, Clone)]
pub enum Sink {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl Sink {
    fn write(&self, text: &str) {
        match self {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            Sink::Stderr => {
                let _ = io::stderr().write_all(text.as_bytes());
            }
            Sink::Buffer(buf) => {
                if let Ok(mut buf) = buf.lock() {
                    buf.extend_from_slice(text.as_bytes());
                }
            }
        }
    }

    fn line(&self, text: &str) {
        self.write(&format!("{}\n", text));
    }
}

/// Output helper that centralizes all CLI output
#[derive(Debug, Clone)]
pub struct Output {
    pub mode: OutputMode,
    pub quiet: bool,
    pub verbose: bool,
    out: Sink,
    diag: Sink,
}

impl Output {
    pub fn new(json: bool, quiet: bool, verbose: bool) -> Self {
        Self {
            mode: if json {
                OutputMode::Json
            } else {
                OutputMode::Human
            },
            quiet,
            verbose,
            out: Sink::Stdout,
            diag: Sink::Stderr,
        }
    }

    /// Same flags, both streams captured in memory.
    #[cfg(test)]
    pub fn captured(json: bool, quiet: bool, verbose: bool) -> (Self, Captured) {
        let captured = Captured::default();
        let mut output = Self::new(json, quiet, verbose);
        output.out = Sink::Buffer(captured.out.clone());
        output.diag = Sink::Buffer(captured.diag.clone());
        (output, captured)
    }

    /// Copy that drops info, warnings and traces but still writes data.
    pub fn silenced(&self) -> Self {
        Self {
            quiet: true,
            ..self.clone()
        }
    }

    /// Write the command's answer verbatim (no newline added).
    pub fn data(&self, text: &str) {
        self.out.write(text);
    }

    /// Write JSON data to the informational stream.
    pub fn json<T: Serialize>(&self, data: &T) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string_pretty(data)?;
        self.out.line(&json);
        Ok(())
    }

    /// Informational message. Suppressed in JSON mode and with --quiet.
    pub fn info(&self, message: &str) {
        if self.mode == OutputMode::Json || self.quiet {
            return;
        }
        self.out.line(message);
    }

    /// Warning on the informational stream. Suppressed in JSON mode and with --quiet.
    pub fn warn(&self, message: &str) {
        if self.mode == OutputMode::Json || self.quiet {
            return;
        }
        self.out.line(message);
    }

    /// Trace on the diagnostic stream. Only shown with --verbose in human mode.
    pub fn verbose(&self, message: &str) {
        if self.mode == OutputMode::Json || self.quiet || !self.verbose {
            return;
        }
        self.diag.line(message);
    }

    /// Human-mode error report on the diagnostic stream.
    pub fn error(&self, message: &str) {
        self.diag.line(message);
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }
}

/// In-memory copies of both streams.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct Captured {
    out: Arc<Mutex<Vec<u8>>>,
    diag: Arc<Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl Captured {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.out.lock().unwrap()).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.diag.lock().unwrap()).into_owned()
    }
}

// =============================================================================
// JSON Response Types
// =============================================================================

/// JSON error envelope (written to stdout with non-zero exit).
#[derive(Debug, Serialize)]
pub struct JsonError {
    pub ok: bool,
    pub schema_id: &'static str,
    pub schema_version: &'static str,
    pub tool_version: &'static str,
    pub generated_at: String,
    pub errors: Vec<JsonErrorInfo>,
    /// Always null for error responses
    pub data: Option<()>,
}

#[derive(Debug, Serialize)]
pub struct JsonErrorInfo {
    /// Stable error code, null for configuration errors without one
    pub code: Option<&'static str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

impl JsonError {
    pub const SCHEMA_ID: &'static str = "schemapull.error";

    pub fn new(err: &crate::error_codes::PullError) -> Self {
        Self {
            ok: false,
            schema_id: Self::SCHEMA_ID,
            schema_version: SCHEMA_VERSION,
            tool_version: TOOL_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            errors: vec![JsonErrorInfo {
                code: err.code.map(|c| c.as_str()),
                message: err.message.clone(),
                description: err.code.map(|c| c.description()),
            }],
            data: None,
        }
    }

    pub fn print(&self, output: &Output) {
        // Serializing plain strings and options cannot fail.
        let _ = output.json(self);
    }
}

/// JSON success envelope.
#[derive(Debug, Serialize)]
pub struct JsonSuccess<T: Serialize> {
    pub ok: bool,
    pub schema_id: &'static str,
    pub schema_version: &'static str,
    pub tool_version: &'static str,
    pub generated_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub data: T,
}

impl<T: Serialize> JsonSuccess<T> {
    pub fn new(schema_id: &'static str, data: T, warnings: Vec<String>) -> Self {
        Self {
            ok: true,
            schema_id,
            schema_version: SCHEMA_VERSION,
            tool_version: TOOL_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            warnings,
            data,
        }
    }
}
