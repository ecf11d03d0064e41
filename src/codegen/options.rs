use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lf" | "unix" => Some(LineEnding::Lf),
            "crlf" | "windows" => Some(LineEnding::Crlf),
            _ => None,
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEnding::Lf => write!(f, "lf"),
            LineEnding::Crlf => write!(f, "crlf"),
        }
    }
}

/// Knobs for a generation run. Every field has a default, so a JSON options
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub line_ending: LineEnding,
    /// I/O timeout for connections that do not set their own.
    pub default_timeout_ms: u64,
    /// Extended I/O timeout used while a file transfer is in flight.
    pub transfer_timeout_ms: u64,
    /// Time-based wait after a binary read, in place of an acknowledgment read.
    pub settle_seconds: f64,
    pub poll_interval_s: f64,
    pub poll_timeout_s: f64,
    /// Emit the generated-by comment block at the top of the script.
    pub header_comment: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::Lf,
            default_timeout_ms: 5000,
            transfer_timeout_ms: 60_000,
            settle_seconds: 0.5,
            poll_interval_s: 1.0,
            poll_timeout_s: 600.0,
            header_comment: true,
        }
    }
}

impl GenerationOptions {
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        let options: Self = serde_json::from_str(json).map_err(|e| {
            CompileError::MalformedDocument(format!("invalid generation options: {}", e))
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects timing values the generated script cannot honour. Runs again
    /// before every generation, so options built with `with_*` are covered too.
    pub fn validate(&self) -> Result<(), CompileError> {
        let positive = [
            ("poll_interval_s", self.poll_interval_s),
            ("poll_timeout_s", self.poll_timeout_s),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid_option(name, value, "must be a positive number"));
            }
        }
        if !(self.settle_seconds.is_finite() && self.settle_seconds >= 0.0) {
            return Err(invalid_option(
                "settle_seconds",
                self.settle_seconds,
                "cannot be negative",
            ));
        }
        Ok(())
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_transfer_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.transfer_timeout_ms = timeout_ms;
        self
    }

    pub fn with_settle_seconds(mut self, seconds: f64) -> Self {
        self.settle_seconds = seconds;
        self
    }

    pub fn with_poll_interval_s(mut self, seconds: f64) -> Self {
        self.poll_interval_s = seconds;
        self
    }

    pub fn with_poll_timeout_s(mut self, seconds: f64) -> Self {
        self.poll_timeout_s = seconds;
        self
    }

    pub fn with_header_comment(mut self, enabled: bool) -> Self {
        self.header_comment = enabled;
        self
    }
}

fn invalid_option(name: &str, value: f64, problem: &str) -> CompileError {
    CompileError::MalformedDocument(format!(
        "invalid generation options: {} {} (got {})",
        name, problem, value
    ))
}
