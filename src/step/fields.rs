//! Per-kind parameter schema.
//!
//! Graph node fields and Step form `params` use the same keys, so a single table
//! drives validation, defaulting and serialization for both representations.

use super::kind::Kind;

/// How a parameter value is encoded when it is written as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Integer,
    Bool,
    /// Comma-separated in graph fields, an array in the Step form.
    List,
}

/// Whether a field must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Graph translation substitutes the default; the Step form rejects its absence.
    Required(&'static str),
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub ty: FieldType,
    pub presence: Presence,
    /// Variable references hold an id in graph fields and a display name in steps.
    pub variable: bool,
}

const fn required(key: &'static str, ty: FieldType, default: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        ty,
        presence: Presence::Required(default),
        variable: false,
    }
}

const fn optional(key: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        key,
        ty,
        presence: Presence::Optional,
        variable: false,
    }
}

const fn variable(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        ty: FieldType::Text,
        presence: Presence::Required(""),
        variable: true,
    }
}

const fn optional_variable(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        ty: FieldType::Text,
        presence: Presence::Optional,
        variable: true,
    }
}

pub mod keys {
    pub const ROLE: &str = "role";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const BACKEND: &str = "backend";
    pub const FAMILY: &str = "family";
    pub const TIMEOUT_MS: &str = "timeout_ms";
    pub const COMMAND: &str = "command";
    pub const CONTEXT: &str = "context";
    pub const AWAIT_COMPLETION: &str = "await_completion";
    pub const RESULT: &str = "result";
    pub const VARIABLE: &str = "variable";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const STEP: &str = "step";
    pub const STOP: &str = "stop";
    pub const POINTS: &str = "points";
    pub const CONDITION: &str = "condition";
    pub const MAX_ITERATIONS: &str = "max_iterations";
    pub const VALUE: &str = "value";
    pub const SECONDS: &str = "seconds";
    pub const CODE: &str = "code";
    pub const QUERY: &str = "query";
    pub const SUCCESS_STATES: &str = "success_states";
    pub const RECOVERABLE_STATES: &str = "recoverable_states";
    pub const RECOVERY_COMMAND: &str = "recovery_command";
    pub const FAILURE_STATES: &str = "failure_states";
    pub const INTERVAL_S: &str = "interval_s";
    pub const TIMEOUT_S: &str = "timeout_s";
    pub const REMOTE_PATH: &str = "remote_path";
    pub const LOCAL_PATH: &str = "local_path";
    pub const SAVE_COMMAND: &str = "save_command";
    pub const CLEANUP: &str = "cleanup";
}

use FieldType::*;
use keys::*;

const CONNECT: &[FieldSpec] = &[
    required(ROLE, Text, "scope"),
    required(HOST, Text, "127.0.0.1"),
    optional(PORT, Integer),
    optional(BACKEND, Text),
    optional(FAMILY, Text),
    optional(TIMEOUT_MS, Integer),
];
const DISCONNECT: &[FieldSpec] = &[required(ROLE, Text, "scope")];
const WRITE: &[FieldSpec] = &[
    required(COMMAND, Text, ""),
    optional(CONTEXT, Text),
    optional(AWAIT_COMPLETION, Bool),
];
const QUERY_FIELDS: &[FieldSpec] = &[
    required(COMMAND, Text, ""),
    optional(CONTEXT, Text),
    optional_variable(RESULT),
];
const FOR_LOOP: &[FieldSpec] = &[
    variable(VARIABLE),
    required(START, Number, "0"),
    required(END, Number, "0"),
    required(STEP, Number, "1"),
];
const WHILE_LOOP: &[FieldSpec] = &[
    required(CONDITION, Text, "False"),
    optional(MAX_ITERATIONS, Integer),
];
const CONDITIONAL: &[FieldSpec] = &[required(CONDITION, Text, "False")];
const SET_VARIABLE: &[FieldSpec] = &[variable(VARIABLE), required(VALUE, Text, "")];
const GET_VARIABLE: &[FieldSpec] = &[variable(VARIABLE)];
const WAIT: &[FieldSpec] = &[required(SECONDS, Number, "1")];
const CUSTOM_CODE: &[FieldSpec] = &[required(CODE, Text, "")];
const SWEEP: &[FieldSpec] = &[
    variable(VARIABLE),
    required(START, Number, "0"),
    required(STOP, Number, "0"),
    required(POINTS, Integer, "1"),
];
const POLL: &[FieldSpec] = &[
    optional(CONTEXT, Text),
    required(QUERY, Text, "*OPC?"),
    required(SUCCESS_STATES, List, "1"),
    optional(RECOVERABLE_STATES, List),
    optional(RECOVERY_COMMAND, Text),
    optional(FAILURE_STATES, List),
    optional(INTERVAL_S, Number),
    optional(TIMEOUT_S, Number),
];
const FILE_TRANSFER: &[FieldSpec] = &[
    optional(CONTEXT, Text),
    required(REMOTE_PATH, Text, ""),
    required(LOCAL_PATH, Text, "transfer.bin"),
    optional(SAVE_COMMAND, Text),
    optional(TIMEOUT_MS, Integer),
    optional(CLEANUP, Bool),
];

impl Kind {
    /// The parameter schema of this kind.
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Kind::Connect => CONNECT,
            Kind::Disconnect => DISCONNECT,
            Kind::Write => WRITE,
            Kind::Query => QUERY_FIELDS,
            Kind::ForLoop => FOR_LOOP,
            Kind::WhileLoop => WHILE_LOOP,
            Kind::Conditional => CONDITIONAL,
            Kind::SetVariable => SET_VARIABLE,
            Kind::GetVariable => GET_VARIABLE,
            Kind::Wait => WAIT,
            Kind::CustomCode => CUSTOM_CODE,
            Kind::Sweep => SWEEP,
            Kind::Poll => POLL,
            Kind::FileTransfer => FILE_TRANSFER,
        }
    }

    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.key == key)
    }

    /// Keys of the fields that hold variable references.
    pub fn variable_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields().iter().filter(|f| f.variable)
    }
}
