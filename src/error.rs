use thiserror::Error;

/// Structural errors. Any of these aborts compilation without producing output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Element '{element_id}' has an unknown kind: '{kind}'")]
    UnknownKind { element_id: String, kind: String },

    #[error("Element '{element_id}' is missing required field '{field}'")]
    MissingField { element_id: String, field: String },

    #[error("Element '{element_id}' has an invalid value for field '{field}': {message}")]
    InvalidField {
        element_id: String,
        field: String,
        message: String,
    },

    #[error("Element '{element_id}' references variable '{variable_id}', which is not declared")]
    UnresolvedVariable {
        element_id: String,
        variable_id: String,
    },

    #[error("Variable declaration conflict: {0}")]
    VariableConflict(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Defects inside the generator itself, as opposed to problems with the user's program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Backend '{backend}' has no '{operation}' template (needed by step '{step_id}')")]
    MissingTemplate {
        backend: String,
        operation: String,
        step_id: String,
    },
}

/// Errors raised while loading or persisting the command reference database.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Could not access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse command reference JSON: {0}")]
    Parse(String),

    #[error("Command reference snapshot error: {0}")]
    Snapshot(String),
}
