//! Per-backend emission templates.
//!
//! Every adapter speaks the same small interface. Templates return the lines
//! to emit (relative indentation included) or `None` when the backend has no
//! way to express an operation, which the generator reports as a defect.

use crate::device::DeviceFamily;
use serde::{Deserialize, Serialize};
use std::fmt;

mod pyvisa;
mod socket;
mod tekhsi;
mod tm_devices;

pub use pyvisa::PyVisaBackend;
pub use socket::SocketBackend;
pub use tekhsi::TekHsiBackend;
pub use tm_devices::TmDevicesBackend;

/// The available calling conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Free-form `write`/`query` through a VISA resource manager.
    PyVisa,
    /// Free-form `write`/`query` over a raw TCP socket; completion is polled.
    Socket,
    /// Structured method-per-command driver objects.
    TmDevices,
    /// High-speed waveform streaming client.
    TekHsi,
}

impl BackendKind {
    pub const ALL: &'static [BackendKind] = &[
        BackendKind::PyVisa,
        BackendKind::Socket,
        BackendKind::TmDevices,
        BackendKind::TekHsi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::PyVisa => "pyvisa",
            BackendKind::Socket => "socket",
            BackendKind::TmDevices => "tm_devices",
            BackendKind::TekHsi => "tekhsi",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pyvisa" | "visa" | "generic" => Some(BackendKind::PyVisa),
            "socket" | "raw_socket" | "tcp" => Some(BackendKind::Socket),
            "tm_devices" | "tmdevices" | "structured" => Some(BackendKind::TmDevices),
            "tekhsi" | "tek_hsi" | "hsi" => Some(BackendKind::TekHsi),
            _ => None,
        }
    }

    /// The adapter implementing this backend.
    pub fn adapter(&self) -> &'static dyn BackendAdapter {
        match self {
            BackendKind::PyVisa => &PyVisaBackend,
            BackendKind::Socket => &SocketBackend,
            BackendKind::TmDevices => &TmDevicesBackend,
            BackendKind::TekHsi => &TekHsiBackend,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal syntax of the target language as seen by the argument serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralRules {
    pub quote: char,
    pub true_literal: &'static str,
    pub false_literal: &'static str,
    pub null_literal: &'static str,
    /// Prefix that turns a string literal into an interpolated one.
    pub interpolation_prefix: &'static str,
}

pub const PYTHON_LITERALS: LiteralRules = LiteralRules {
    quote: '"',
    true_literal: "True",
    false_literal: "False",
    null_literal: "None",
    interpolation_prefix: "f",
};

/// Everything a connect template needs.
#[derive(Debug, Clone)]
pub struct ConnectSpec<'a> {
    pub handle: &'a str,
    pub role: &'a str,
    /// Host as typed.
    pub host: &'a str,
    /// Host as a string literal (interpolated if it has placeholders).
    pub host_literal: &'a str,
    pub port: Option<u16>,
    pub family: DeviceFamily,
    pub timeout_ms: u64,
}

/// A SCPI command prepared for emission.
#[derive(Debug, Clone)]
pub struct CommandCall<'a> {
    /// The command as typed, e.g. `CH1:SCAle {1+i*0.5}`.
    pub raw: &'a str,
    /// The whole command as a string literal (interpolated if it has placeholders).
    pub literal: &'a str,
    /// Header without arguments.
    pub header: &'a str,
    /// Serialized argument literals, in order.
    pub arguments: &'a [String],
}

/// The emission interface every backend implements.
pub trait BackendAdapter: Sync {
    fn kind(&self) -> BackendKind;

    fn literal_rules(&self) -> LiteralRules {
        PYTHON_LITERALS
    }

    /// Import lines this backend needs.
    fn imports(&self) -> Vec<String>;

    /// Module-level helper definitions emitted once after the imports.
    fn helpers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Statements run once before any connection is made.
    fn session_setup(&self) -> Vec<String> {
        Vec::new()
    }

    /// Statements run once after every handle has been released.
    fn session_teardown(&self) -> Vec<String> {
        Vec::new()
    }

    fn connect(&self, spec: &ConnectSpec<'_>) -> Option<Vec<String>>;

    fn write(&self, handle: &str, command: &CommandCall<'_>) -> Option<Vec<String>>;

    /// Sends a query, binding the stripped response to `binding` if given.
    fn query(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        binding: Option<&str>,
    ) -> Option<Vec<String>>;

    /// A text status query inside a polling loop.
    fn status_query(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        binding: &str,
    ) -> Option<Vec<String>> {
        self.query(handle, command, Some(binding))
    }

    fn disconnect(&self, handle: &str) -> Option<Vec<String>>;

    /// Guaranteed-release cleanup for the `finally` block. Must tolerate a
    /// handle that was never opened (bound to the null literal).
    fn release(&self, handle: &str) -> Vec<String> {
        vec![
            format!("if {} is not None:", handle),
            format!("    {}.close()", handle),
        ]
    }

    /// Blocks until the instrument reports that pending operations are complete.
    fn await_completion(
        &self,
        handle: &str,
        timeout_s: f64,
        interval_s: f64,
    ) -> Option<Vec<String>>;

    /// Assignable expression holding the handle's I/O timeout in milliseconds.
    fn timeout_attribute(&self, handle: &str) -> Option<String>;

    /// Sends `command` and reads the raw binary reply into `into`.
    fn read_binary(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        into: &str,
    ) -> Option<Vec<String>>;
}

/// A string literal `prefix + host + suffix`, concatenating at runtime when the
/// host is not plain text.
pub(crate) fn address_literal(spec: &ConnectSpec<'_>, prefix: &str, suffix: &str) -> String {
    let plain = !spec
        .host
        .contains(|c: char| matches!(c, '{' | '}' | '"' | '\\' | '\''));
    if plain {
        format!("\"{}{}{}\"", prefix, spec.host.trim(), suffix)
    } else {
        format!("\"{}\" + str({}) + \"{}\"", prefix, spec.host_literal, suffix)
    }
}

pub(crate) fn seconds(value: f64) -> String {
    crate::step::format_float(value)
}
