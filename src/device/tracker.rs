use super::{DeviceFamily, infer_family};
use crate::backend::BackendKind;
use std::fmt;

/// A live device connection introduced by a connect step.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub role: String,
    /// Identifier of the handle in the generated script.
    pub handle: String,
    pub backend: BackendKind,
    pub family: DeviceFamily,
}

/// A problem found while resolving the target of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextIssue {
    /// The step names a role with no active connection.
    InactiveRole { role: String },
    /// Nothing is connected at this point of the program.
    NoConnection,
    /// The command prefix suggests a different family than the resolved target.
    FamilyMismatch {
        role: String,
        family: DeviceFamily,
        inferred: DeviceFamily,
    },
}

impl ContextIssue {
    /// Whether the issue means the step cannot reach a device.
    pub fn is_error(&self) -> bool {
        !matches!(self, ContextIssue::FamilyMismatch { .. })
    }
}

impl fmt::Display for ContextIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextIssue::InactiveRole { role } => {
                write!(f, "no active connection for role '{}'", role)
            }
            ContextIssue::NoConnection => f.write_str("no active connection"),
            ContextIssue::FamilyMismatch {
                role,
                family,
                inferred,
            } => write!(
                f,
                "command looks like a {} command but targets '{}' ({})",
                inferred, role, family
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextResolution {
    pub connection: Option<Connection>,
    pub issues: Vec<ContextIssue>,
}

/// Role → connection map maintained during one program-order walk.
///
/// Connections are kept in connect order so "most recent" is the last entry.
#[derive(Debug, Clone, Default)]
pub struct DeviceContextTracker {
    active: Vec<Connection>,
}

impl DeviceContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, returning the one it replaces for the same role.
    pub fn connect(&mut self, connection: Connection) -> Option<Connection> {
        let previous = self.disconnect(&connection.role);
        self.active.push(connection);
        previous
    }

    /// Deactivates a role, returning its connection if it was active.
    pub fn disconnect(&mut self, role: &str) -> Option<Connection> {
        let at = self.active.iter().position(|c| c.role == role)?;
        Some(self.active.remove(at))
    }

    pub fn get(&self, role: &str) -> Option<&Connection> {
        self.active.iter().find(|c| c.role == role)
    }

    pub fn is_active(&self, role: &str) -> bool {
        self.get(role).is_some()
    }

    /// Active connections, oldest first.
    pub fn active(&self) -> &[Connection] {
        &self.active
    }

    /// Resolves the connection a step targets.
    ///
    /// An explicit context wins; otherwise the most recent connection of the
    /// family the command prefix points to, falling back to the most recent
    /// connection overall.
    pub fn resolve(&self, explicit: Option<&str>, command: Option<&str>) -> ContextResolution {
        let inferred = command.and_then(infer_family);
        let mut issues = Vec::new();

        let connection = match explicit {
            Some(role) => {
                let found = self.get(role);
                if found.is_none() {
                    issues.push(ContextIssue::InactiveRole {
                        role: role.to_string(),
                    });
                }
                found
            }
            None => {
                let by_family = inferred
                    .and_then(|family| self.active.iter().rev().find(|c| c.family == family));
                let found = by_family.or_else(|| self.active.last());
                if found.is_none() {
                    issues.push(ContextIssue::NoConnection);
                }
                found
            }
        };

        if let (Some(connection), Some(inferred)) = (connection, inferred) {
            if connection.family != inferred {
                issues.push(ContextIssue::FamilyMismatch {
                    role: connection.role.clone(),
                    family: connection.family,
                    inferred,
                });
            }
        }

        ContextResolution {
            connection: connection.cloned(),
            issues,
        }
    }
}
