use crate::error::CompileError;
use crate::graph::{Graph, VariableType, graph_to_xml, parse_graph};
use crate::step::{Step, parse_steps, steps_to_json};
use crate::translate::{to_graph, to_steps};
use std::fs;
use std::path::Path;

/// Compiler input in either serialized form.
#[derive(Debug, Clone)]
pub enum Document {
    Graph(Graph),
    Steps(Vec<Step>),
}

impl Document {
    /// Parses either form, telling them apart by shape: XML is a graph, a JSON
    /// list (or `{"steps": [...]}` object) is a step sequence.
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        match text.trim_start().chars().next() {
            Some('<') => Ok(Document::Graph(parse_graph(text)?)),
            Some('[' | '{') => Ok(Document::Steps(parse_steps(text)?)),
            _ => Err(CompileError::MalformedDocument(
                "input is neither a graph (XML) nor a step list (JSON)".to_string(),
            )),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CompileError::MalformedDocument(format!("could not read '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// The canonical step sequence.
    pub fn steps(&self) -> Result<Vec<Step>, CompileError> {
        match self {
            Document::Graph(graph) => to_steps(graph),
            Document::Steps(steps) => Ok(steps.clone()),
        }
    }

    pub fn into_graph(self) -> Result<Graph, CompileError> {
        match self {
            Document::Graph(graph) => Ok(graph),
            Document::Steps(steps) => to_graph(&steps),
        }
    }

    /// Non-loop variables declared by the document itself. Only graphs carry
    /// a declaration block.
    pub fn declared_variables(&self) -> Vec<String> {
        match self {
            Document::Graph(graph) => graph
                .variables()
                .iter()
                .filter(|v| v.ty != VariableType::LoopIndex)
                .map(|v| v.name.clone())
                .collect(),
            Document::Steps(_) => Vec::new(),
        }
    }

    pub fn to_steps_json(&self) -> Result<String, CompileError> {
        Ok(steps_to_json(&self.steps()?))
    }

    pub fn to_graph_xml(&self) -> Result<String, CompileError> {
        match self {
            Document::Graph(graph) => graph_to_xml(graph),
            Document::Steps(steps) => graph_to_xml(&to_graph(steps)?),
        }
    }
}

impl From<Graph> for Document {
    fn from(graph: Graph) -> Self {
        Document::Graph(graph)
    }
}

impl From<Vec<Step>> for Document {
    fn from(steps: Vec<Step>) -> Self {
        Document::Steps(steps)
    }
}
