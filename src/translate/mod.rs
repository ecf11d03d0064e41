//! Graph ⇄ Step translation.
//!
//! `to_steps` is the single point where variable ids become display names.
//! `to_graph` rebuilds a graph with fresh node ids, reusing one variable per
//! distinct name.

use crate::error::CompileError;
use crate::graph::{Graph, NodeKey, VariableType};
use crate::step::{Bodies, Kind, Step, StepKind, extra_fields, keys, slots};

/// Translates every top-level chain of `graph`, in order, into steps. The
/// first step of each chain after the first is marked `detached`.
pub fn to_steps(graph: &Graph) -> Result<Vec<Step>, CompileError> {
    let mut steps = Vec::new();
    for (index, root) in graph.roots().iter().enumerate() {
        let mut chain = translate_chain(graph, Some(*root))?;
        if let Some(first) = chain.first_mut() {
            first.detached = index > 0;
        }
        steps.extend(chain);
    }
    tracing::debug!(steps = steps.len(), "graph translated to steps");
    Ok(steps)
}

fn translate_chain(graph: &Graph, first: Option<NodeKey>) -> Result<Vec<Step>, CompileError> {
    graph
        .chain(first)
        .into_iter()
        .map(|key| translate_node(graph, key))
        .collect()
}

fn translate_node(graph: &Graph, key: NodeKey) -> Result<Step, CompileError> {
    let node = graph
        .node(key)
        .ok_or_else(|| CompileError::MalformedDocument(format!("dangling node link {:?}", key)))?;
    tracing::trace!(node = %node.id, kind = %node.kind, "translating node");

    let mut fields = node.fields.clone();
    for spec in node.kind.variable_fields() {
        let Some(variable_id) = fields.remove(spec.key) else {
            continue;
        };
        if variable_id.trim().is_empty() {
            continue;
        }
        let name = graph.variables().name_of(&variable_id).ok_or_else(|| {
            CompileError::UnresolvedVariable {
                element_id: node.id.clone(),
                variable_id: variable_id.clone(),
            }
        })?;
        fields.insert(spec.key.to_string(), name.to_string());
    }

    let bodies = Bodies {
        body: translate_chain(graph, node.slot(slots::BODY))?,
        else_body: translate_chain(graph, node.slot(slots::ELSE))?,
    };
    let kind = StepKind::from_fields(node.kind, &node.id, &fields, bodies, true)?;
    let extra = extra_fields(node.kind, &fields);
    Ok(Step::new(node.id.clone(), kind).with_extra(extra))
}

/// Builds a graph from `steps`. A new top-level chain starts at every
/// `detached` step.
pub fn to_graph(steps: &[Step]) -> Result<Graph, CompileError> {
    let mut builder = GraphBuilder {
        graph: Graph::new(),
        next_id: 0,
    };
    let mut start = 0;
    for end in 1..=steps.len() {
        if end == steps.len() || steps[end].detached {
            if let Some(first) = builder.build_chain(&steps[start..end])? {
                builder.graph.push_root(first);
            }
            start = end;
        }
    }
    Ok(builder.graph)
}

struct GraphBuilder {
    graph: Graph,
    next_id: usize,
}

/// The type a variable gets when `to_graph` first meets it in `field` of `kind`.
fn variable_type(kind: Kind, field: &str) -> VariableType {
    match (kind, field) {
        (Kind::ForLoop | Kind::Sweep, keys::VARIABLE) => VariableType::LoopIndex,
        (Kind::Query, keys::RESULT) => VariableType::String,
        _ => VariableType::Numeric,
    }
}

impl GraphBuilder {
    fn build_chain(&mut self, steps: &[Step]) -> Result<Option<NodeKey>, CompileError> {
        let mut head = None;
        let mut tail: Option<NodeKey> = None;
        for step in steps {
            let key = self.build_node(step)?;
            match tail {
                Some(prev) => self.graph.insert_after(prev, key)?,
                None => head = Some(key),
            }
            tail = Some(key);
        }
        Ok(head)
    }

    fn build_node(&mut self, step: &Step) -> Result<NodeKey, CompileError> {
        self.next_id += 1;
        let kind = step.kind_tag();
        let key = self.graph.add_node(format!("n{}", self.next_id), kind)?;

        for (field, value) in step.all_fields() {
            let is_variable = kind.field(&field).is_some_and(|spec| spec.variable);
            let value = if is_variable {
                self.graph
                    .variables_mut()
                    .ensure(&value, variable_type(kind, &field))
            } else {
                value
            };
            self.graph.set_field(key, &field, value)?;
        }

        let (body, else_body) = step.kind.bodies();
        for (slot, steps) in kind.slot_names().iter().zip([body, else_body]) {
            if let Some(first) = self.build_chain(steps)? {
                self.graph.attach(key, slot, first)?;
            }
        }
        Ok(key)
    }
}
