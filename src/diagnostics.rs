use serde::Serialize;
use std::fmt;

/// How serious a reported issue is. Neither level blocks generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A semantic issue reported alongside the generated script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Id of the step (or graph node) the issue originates from.
    pub step_id: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(step_id: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            step_id: step_id.to_string(),
            message: message.into(),
        }
    }

    pub fn error(step_id: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            step_id: step_id.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.step_id, self.message)
    }
}

/// Collects diagnostics during a single pass. Each warning is mirrored to `tracing`.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            step = %diagnostic.step_id,
            severity = %diagnostic.severity,
            "{}",
            diagnostic.message
        );
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
