use crate::device::DeviceFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Coarse argument type used for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentType {
    Numeric,
    Enumeration,
    /// An indexed mnemonic such as `CH<x>` or `REF<x>`.
    Mnemonic,
    QuotedString,
}

impl ArgumentType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "numeric" | "number" | "nr1" | "nr2" | "nr3" | "nrf" => Some(ArgumentType::Numeric),
            "enumeration" | "enum" | "boolean" => Some(ArgumentType::Enumeration),
            "mnemonic" | "mnemonic_range" => Some(ArgumentType::Mnemonic),
            "quoted_string" | "string" | "qstring" => Some(ArgumentType::QuotedString),
            _ => None,
        }
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentType::Numeric => "numeric",
            ArgumentType::Enumeration => "enumeration",
            ArgumentType::Mnemonic => "mnemonic",
            ArgumentType::QuotedString => "quoted string",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    pub kind: ArgumentType,
    pub required: bool,
    /// Accepted mnemonics for enumerations, in reference spelling.
    pub valid_values: Vec<String>,
}

/// Whether a header may be sent as a command, a query, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Set,
    Query,
    Both,
}

impl CommandType {
    pub fn allows_set(&self) -> bool {
        !matches!(self, CommandType::Query)
    }

    pub fn allows_query(&self) -> bool {
        !matches!(self, CommandType::Set)
    }
}

/// One entry of the command reference database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    /// Header in reference spelling, e.g. `CH<x>:SCAle`.
    pub header: String,
    pub arguments: Vec<ArgumentSpec>,
    /// Families the command applies to. Empty means unrestricted.
    pub families: BTreeSet<DeviceFamily>,
    pub command_type: CommandType,
}

impl CommandDefinition {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            arguments: Vec::new(),
            families: BTreeSet::new(),
            command_type: CommandType::Both,
        }
    }

    pub fn with_argument(mut self, name: &str, kind: ArgumentType, valid_values: &[&str]) -> Self {
        self.arguments.push(ArgumentSpec {
            name: name.to_string(),
            kind,
            required: true,
            valid_values: valid_values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn with_family(mut self, family: DeviceFamily) -> Self {
        self.families.insert(family);
        self
    }

    pub fn with_command_type(mut self, command_type: CommandType) -> Self {
        self.command_type = command_type;
        self
    }

    pub fn applies_to(&self, family: DeviceFamily) -> bool {
        self.families.is_empty() || self.families.contains(&family)
    }

    pub fn required_arguments(&self) -> usize {
        self.arguments.iter().filter(|a| a.required).count()
    }
}
