//! The command reference index: read-only lookup from SCPI header to argument
//! specs and applicable device families.

use crate::device::DeviceFamily;
use crate::error::ReferenceError;
use ahash::AHashMap;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub mod definition;
pub mod header;

pub use definition::{ArgumentSpec, ArgumentType, CommandDefinition, CommandType};
use header::{HeaderPattern, normalize_header};

const SNAPSHOT_VERSION: u32 = 2;

// --- JSON Deserialization Structs (manual-extraction format) ---

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDatabase {
    Document {
        #[serde(default)]
        manual: Option<RawManual>,
        commands: Vec<RawCommand>,
    },
    List(Vec<RawCommand>),
}

#[derive(Deserialize)]
struct RawManual {
    #[serde(default)]
    families: Vec<String>,
}

#[derive(Deserialize)]
struct RawCommand {
    header: String,
    #[serde(default)]
    arguments: Option<Vec<RawArgument>>,
    #[serde(default)]
    instruments: Option<RawInstruments>,
    #[serde(default, alias = "commandType")]
    command_type: Option<String>,
}

#[derive(Deserialize)]
struct RawInstruments {
    #[serde(default)]
    families: Vec<String>,
}

#[derive(Deserialize)]
struct RawArgument {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default, alias = "validValues")]
    valid_values: Option<serde_json::Value>,
}

fn default_required() -> bool {
    true
}

impl RawArgument {
    fn into_spec(self, header: &str, position: usize) -> Result<ArgumentSpec, ReferenceError> {
        let kind = ArgumentType::from_name(&self.kind).ok_or_else(|| {
            ReferenceError::Parse(format!(
                "command '{}' has an argument of unknown type '{}'",
                header, self.kind
            ))
        })?;

        // `validValues` is either a plain list or an object with a `values` list.
        // Numeric ranges in the object form are instrument-defined and not checked.
        let values = match self.valid_values {
            Some(serde_json::Value::Array(items)) => items,
            Some(serde_json::Value::Object(object)) => object
                .get("values")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let valid_values = values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        Ok(ArgumentSpec {
            name: self.name.unwrap_or_else(|| format!("arg{}", position)),
            kind,
            required: self.required,
            valid_values,
        })
    }
}

fn families_of(models: &[String]) -> BTreeSet<DeviceFamily> {
    models
        .iter()
        .filter_map(|m| DeviceFamily::from_model_family(m))
        .collect()
}

fn command_type_of(raw: Option<&str>) -> CommandType {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("set") => CommandType::Set,
        Some("query") => CommandType::Query,
        _ => CommandType::Both,
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    commands: Vec<CommandDefinition>,
}

/// Header → definition lookup. Exact canonical keys are tried first, then
/// abbreviation-aware matching against every reference header.
#[derive(Debug, Clone, Default)]
pub struct CommandIndex {
    definitions: Vec<CommandDefinition>,
    patterns: Vec<HeaderPattern>,
    by_key: AHashMap<String, usize>,
}

impl CommandIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = CommandDefinition>) -> Self {
        let mut index = Self::new();
        for definition in definitions {
            index.insert(definition);
        }
        index
    }

    /// Adds a definition. A later definition for the same canonical header
    /// replaces the earlier one.
    pub fn insert(&mut self, definition: CommandDefinition) {
        let key = normalize_header(&definition.header);
        let pattern = HeaderPattern::parse(&definition.header);
        match self.by_key.get(&key) {
            Some(&at) => {
                self.definitions[at] = definition;
                self.patterns[at] = pattern;
            }
            None => {
                self.by_key.insert(key, self.definitions.len());
                self.definitions.push(definition);
                self.patterns.push(pattern);
            }
        }
    }

    pub fn lookup(&self, header: &str) -> Option<&CommandDefinition> {
        if let Some(&at) = self.by_key.get(&normalize_header(header)) {
            return Some(&self.definitions[at]);
        }
        self.patterns
            .iter()
            .position(|p| p.matches(header))
            .map(|at| &self.definitions[at])
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.definitions.iter()
    }

    /// Parses the JSON command database produced by the manual-extraction tooling.
    pub fn from_json(json: &str) -> Result<Self, ReferenceError> {
        let raw: RawDatabase =
            serde_json::from_str(json).map_err(|e| ReferenceError::Parse(e.to_string()))?;
        let (default_families, commands) = match raw {
            RawDatabase::Document { manual, commands } => (
                manual.map(|m| families_of(&m.families)).unwrap_or_default(),
                commands,
            ),
            RawDatabase::List(commands) => (BTreeSet::new(), commands),
        };

        let mut index = Self::new();
        for command in commands {
            let arguments = command
                .arguments
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(position, arg)| arg.into_spec(&command.header, position))
                .collect::<Result<Vec<_>, _>>()?;
            let families = match &command.instruments {
                Some(instruments) if !instruments.families.is_empty() => {
                    families_of(&instruments.families)
                }
                _ => default_families.clone(),
            };
            index.insert(CommandDefinition {
                header: command.header.trim().to_string(),
                arguments,
                families,
                command_type: command_type_of(command.command_type.as_deref()),
            });
        }
        tracing::info!(commands = index.len(), "command reference loaded");
        Ok(index)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Serializes the index into a compact binary snapshot.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReferenceError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            commands: self.definitions.clone(),
        };
        encode_to_vec(&snapshot, standard())
            .map_err(|e| ReferenceError::Snapshot(format!("Serialization failed: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReferenceError> {
        let (snapshot, _): (Snapshot, usize) = decode_from_slice(bytes, standard())
            .map_err(|e| ReferenceError::Snapshot(format!("Deserialization failed: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ReferenceError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Self::from_definitions(snapshot.commands))
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), ReferenceError> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()?).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let index = Self::from_bytes(&bytes)?;
        tracing::info!(commands = index.len(), path = %path.display(), "command snapshot loaded");
        Ok(index)
    }

    /// Loads either format, choosing by extension (`.json` is text, anything
    /// else a snapshot).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_file(path)
        } else {
            Self::load_snapshot(path)
        }
    }
}
