//! Instrument families and the static command-prefix table used to infer which
//! kind of device a SCPI header is meant for.

use crate::reference::header::{HeaderPattern, split_command};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub mod tracker;

pub use tracker::{Connection, ContextIssue, ContextResolution, DeviceContextTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Scope,
    PowerSupply,
    Smu,
    SignalGenerator,
    Multimeter,
}

impl DeviceFamily {
    pub const ALL: &'static [DeviceFamily] = &[
        DeviceFamily::Scope,
        DeviceFamily::PowerSupply,
        DeviceFamily::Smu,
        DeviceFamily::SignalGenerator,
        DeviceFamily::Multimeter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::Scope => "scope",
            DeviceFamily::PowerSupply => "power_supply",
            DeviceFamily::Smu => "smu",
            DeviceFamily::SignalGenerator => "signal_generator",
            DeviceFamily::Multimeter => "multimeter",
        }
    }

    /// Resolves a family name or a role tag such as `scope2` or `power-supply`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        let stem = normalized.trim_end_matches(|c: char| c.is_ascii_digit() || c == '_');
        match stem {
            "scope" | "oscilloscope" | "osc" | "mso" | "dpo" => Some(DeviceFamily::Scope),
            "power_supply" | "powersupply" | "psu" | "supply" | "pws" => {
                Some(DeviceFamily::PowerSupply)
            }
            "smu" | "source_measure_unit" | "sourcemeter" => Some(DeviceFamily::Smu),
            "signal_generator" | "sig_gen" | "generator" | "function_generator" | "afg"
            | "awg" => Some(DeviceFamily::SignalGenerator),
            "multimeter" | "dmm" | "meter" => Some(DeviceFamily::Multimeter),
            _ => None,
        }
    }

    /// Maps a model family from the reference database (`MSO5`, `AFG31K`,
    /// `SMU2450`, ...) to a device family.
    pub fn from_model_family(model: &str) -> Option<Self> {
        let upper = model.trim().to_ascii_uppercase();
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| upper.starts_with(p));
        if starts(&["MSO", "DPO", "MDO", "TBS", "TDS", "LPD"]) {
            Some(DeviceFamily::Scope)
        } else if starts(&["AFG", "AWG"]) {
            Some(DeviceFamily::SignalGenerator)
        } else if starts(&["SMU", "24", "26"]) {
            Some(DeviceFamily::Smu)
        } else if starts(&["PWS", "PSU", "22", "23"]) {
            Some(DeviceFamily::PowerSupply)
        } else if starts(&["DMM", "DAQ6510"]) {
            Some(DeviceFamily::Multimeter)
        } else {
            Self::from_name(model)
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root mnemonics that only one family answers to. Roots shared across
/// families (`OUTPut`, `SOURce`, IEEE common commands) are not listed.
const PREFIXES: &[(&str, DeviceFamily)] = &[
    ("CH<x>", DeviceFamily::Scope),
    ("MEASUrement", DeviceFamily::Scope),
    ("ACQuire", DeviceFamily::Scope),
    ("HORizontal", DeviceFamily::Scope),
    ("TRIGger", DeviceFamily::Scope),
    ("DATa", DeviceFamily::Scope),
    ("CURVe", DeviceFamily::Scope),
    ("WFMOutpre", DeviceFamily::Scope),
    ("DISplay", DeviceFamily::Scope),
    ("SAVe", DeviceFamily::Scope),
    ("EXPort", DeviceFamily::Scope),
    ("FILESystem", DeviceFamily::Scope),
    ("MATH<x>", DeviceFamily::Scope),
    ("REF<x>", DeviceFamily::Scope),
    ("BUS", DeviceFamily::Scope),
    ("SEARCH", DeviceFamily::Scope),
    ("CURSor", DeviceFamily::Scope),
    ("SELect", DeviceFamily::Scope),
    ("AUTOSet", DeviceFamily::Scope),
    ("TEKEXP", DeviceFamily::Scope),
    ("SENSe", DeviceFamily::Smu),
    ("APPLy", DeviceFamily::PowerSupply),
    ("INSTrument", DeviceFamily::PowerSupply),
    ("FUNCtion", DeviceFamily::SignalGenerator),
    ("BURSt", DeviceFamily::SignalGenerator),
];

fn prefix_table() -> &'static [(HeaderPattern, DeviceFamily)] {
    static TABLE: OnceLock<Vec<(HeaderPattern, DeviceFamily)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PREFIXES
            .iter()
            .map(|(root, family)| (HeaderPattern::parse(root), *family))
            .collect()
    })
}

/// Infers the target family of a command from its root mnemonic.
pub fn infer_family(command: &str) -> Option<DeviceFamily> {
    let (header, _) = split_command(command);
    if header.is_empty() || header.starts_with('*') || header.contains('{') {
        return None;
    }
    prefix_table()
        .iter()
        .find(|(pattern, _)| pattern.matches_root(header))
        .map(|(_, family)| *family)
}
