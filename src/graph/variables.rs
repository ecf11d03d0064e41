use crate::error::CompileError;
use ahash::AHashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    Numeric,
    String,
    LoopIndex,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Numeric => "numeric",
            VariableType::String => "string",
            VariableType::LoopIndex => "loop-index",
        }
    }

    /// Untyped declarations (an empty `type` attribute) are numeric.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "" | "numeric" | "number" => Some(VariableType::Numeric),
            "string" | "text" => Some(VariableType::String),
            "loop-index" | "loop" | "index" => Some(VariableType::LoopIndex),
            _ => None,
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub ty: VariableType,
}

/// Stable variable id → mutable display name and type. Names are unique
/// within a table; nodes refer to variables by id only.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: AHashMap<String, Variable>,
    order: Vec<String>,
    next_id: usize,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        ty: VariableType,
    ) -> Result<(), CompileError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(CompileError::VariableConflict(
                "variables need a non-empty id and name".to_string(),
            ));
        }
        if self.entries.contains_key(&id) {
            return Err(CompileError::VariableConflict(format!(
                "variable id '{}' is declared twice",
                id
            )));
        }
        if let Some(existing) = self.id_for_name(&name) {
            return Err(CompileError::VariableConflict(format!(
                "variable name '{}' is already used by '{}'",
                name, existing
            )));
        }
        self.order.push(id.clone());
        self.entries.insert(id.clone(), Variable { id, name, ty });
        Ok(())
    }

    /// Returns the id of the variable called `name`, declaring it with a fresh
    /// id if there is none.
    pub fn ensure(&mut self, name: &str, ty: VariableType) -> String {
        if let Some(id) = self.id_for_name(name) {
            return id.to_string();
        }
        let id = loop {
            self.next_id += 1;
            let candidate = format!("var{}", self.next_id);
            if !self.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        self.order.push(id.clone());
        self.entries.insert(
            id.clone(),
            Variable {
                id: id.clone(),
                name: name.to_string(),
                ty,
            },
        );
        id
    }

    pub fn rename(&mut self, id: &str, new_name: &str) -> Result<(), CompileError> {
        if new_name.trim().is_empty() {
            return Err(CompileError::VariableConflict(
                "variable names cannot be empty".to_string(),
            ));
        }
        if let Some(other) = self.id_for_name(new_name).filter(|other| *other != id) {
            return Err(CompileError::VariableConflict(format!(
                "variable name '{}' is already used by '{}'",
                new_name, other
            )));
        }
        let variable = self.entries.get_mut(id).ok_or_else(|| {
            CompileError::VariableConflict(format!("no variable with id '{}'", id))
        })?;
        variable.name = new_name.to_string();
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Variable> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Variable> {
        self.entries.get(id)
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.get(id).map(|v| v.name.as_str())
    }

    pub fn id_for_name(&self, name: &str) -> Option<&str> {
        self.iter().find(|v| v.name == name).map(|v| v.id.as_str())
    }

    /// Variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
