//! The Graph form: a Blockly-style XML workspace.
//!
//! ```xml
//! <xml>
//!   <variables><variable id="v1" type="loop-index">i</variable></variables>
//!   <block type="for_loop" id="n1" x="20" y="20">
//!     <field name="variable" id="v1">i</field>
//!     <field name="end">4</field>
//!     <statement name="DO"><block type="wait" id="n2">...</block></statement>
//!     <next><block type="disconnect" id="n3">...</block></next>
//!   </block>
//! </xml>
//! ```

use super::{Graph, Layout, NodeKey, VariableType};
use crate::error::CompileError;
use crate::step::{Kind, slots};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::fmt;

const NAMESPACE: &str = "https://developers.google.com/blockly/xml";

/// Parses a Graph form document. Attribute order and the position of the
/// `<variables>` block are irrelevant.
pub fn parse_graph(xml: &str) -> Result<Graph, CompileError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| CompileError::MalformedDocument(format!("XML parse error: {}", e)))?;

    let root = doc.root_element();
    if !matches!(root.tag_name().name(), "xml" | "workspace" | "procedure") {
        return Err(CompileError::MalformedDocument(format!(
            "expected root element 'xml', 'workspace' or 'procedure', found '{}'",
            root.tag_name().name()
        )));
    }

    let mut parser = GraphParser {
        graph: Graph::new(),
        anonymous: 0,
    };

    for variables in root
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("variables"))
    {
        parser.parse_variables(variables)?;
    }
    for block in root
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("block"))
    {
        let first = parser.parse_chain(block)?;
        parser.graph.push_root(first);
    }

    Ok(parser.graph)
}

struct GraphParser {
    graph: Graph,
    anonymous: usize,
}

impl GraphParser {
    fn parse_variables(&mut self, node: roxmltree::Node) -> Result<(), CompileError> {
        for variable in node
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("variable"))
        {
            let id = variable.attribute("id").ok_or_else(|| {
                CompileError::MalformedDocument("variable declaration without an id".to_string())
            })?;
            let type_name = variable.attribute("type").unwrap_or_default();
            let ty = VariableType::from_name(type_name).ok_or_else(|| {
                CompileError::MalformedDocument(format!(
                    "variable '{}' has unknown type '{}'",
                    id, type_name
                ))
            })?;
            let name = variable.text().unwrap_or_default().trim();
            self.graph.variables_mut().declare(id, name, ty)?;
        }
        Ok(())
    }

    /// Parses a block and its `<next>` successors, returning the chain head.
    fn parse_chain(&mut self, first: roxmltree::Node) -> Result<NodeKey, CompileError> {
        let head = self.parse_block(first)?;
        let mut tail = head;
        let mut cursor = next_block(first);
        while let Some(block) = cursor {
            let key = self.parse_block(block)?;
            self.graph.insert_after(tail, key)?;
            tail = key;
            cursor = next_block(block);
        }
        Ok(head)
    }

    fn parse_block(&mut self, block: roxmltree::Node) -> Result<NodeKey, CompileError> {
        let id = match block.attribute("id") {
            Some(id) => id.to_string(),
            None => {
                self.anonymous += 1;
                format!("node-{}", self.anonymous)
            }
        };
        let tag = block
            .attribute("type")
            .or_else(|| block.attribute("kind"))
            .ok_or_else(|| CompileError::MissingField {
                element_id: id.clone(),
                field: "type".to_string(),
            })?;
        let kind = Kind::from_tag(tag).ok_or_else(|| CompileError::UnknownKind {
            element_id: id.clone(),
            kind: tag.to_string(),
        })?;

        let key = self.graph.add_node(id.clone(), kind)?;

        let x = block.attribute("x").and_then(|v| v.parse::<f64>().ok());
        let y = block.attribute("y").and_then(|v| v.parse::<f64>().ok());
        let collapsed = block.attribute("collapsed") == Some("true");
        if x.is_some() || y.is_some() || collapsed {
            self.graph.set_layout(
                key,
                Layout {
                    x: x.unwrap_or_default(),
                    y: y.unwrap_or_default(),
                    collapsed,
                },
            )?;
        }

        for child in block.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "field" => {
                    let name = child
                        .attribute("name")
                        .ok_or_else(|| {
                            CompileError::MalformedDocument(format!(
                                "block '{}' has a field without a name",
                                id
                            ))
                        })?
                        .to_ascii_lowercase();
                    let is_variable = kind.field(&name).is_some_and(|spec| spec.variable);
                    let value = if is_variable {
                        let variable_id = child
                            .attribute("id")
                            .or_else(|| child.text())
                            .unwrap_or_default()
                            .trim();
                        if self.graph.variables().get(variable_id).is_none() {
                            return Err(CompileError::UnresolvedVariable {
                                element_id: id.clone(),
                                variable_id: variable_id.to_string(),
                            });
                        }
                        variable_id.to_string()
                    } else {
                        child.text().unwrap_or_default().to_string()
                    };
                    self.graph.set_field(key, &name, value)?;
                }
                "statement" => {
                    let slot = slot_name(child.attribute("name").unwrap_or(slots::BODY));
                    if let Some(first) = child
                        .children()
                        .find(|n| n.is_element() && n.has_tag_name("block"))
                    {
                        let head = self.parse_chain(first)?;
                        self.graph.attach(key, &slot, head)?;
                    }
                }
                _ => {}
            }
        }

        Ok(key)
    }
}

/// Statement names are case-insensitive; `DO0` is the first (only) body.
fn slot_name(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    if upper == "DO0" {
        slots::BODY.to_string()
    } else {
        upper
    }
}

fn next_block<'a, 'input>(block: roxmltree::Node<'a, 'input>) -> Option<roxmltree::Node<'a, 'input>> {
    block
        .children()
        .find(|n| n.is_element() && n.has_tag_name("next"))
        .and_then(|next| {
            next.children()
                .find(|n| n.is_element() && n.has_tag_name("block"))
        })
}

fn xml_error(e: impl fmt::Display) -> CompileError {
    CompileError::MalformedDocument(format!("XML write error: {}", e))
}

/// Serializes a graph into the Graph form.
pub fn graph_to_xml(graph: &Graph) -> Result<String, CompileError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Start(
            BytesStart::new("xml").with_attributes([("xmlns", NAMESPACE)]),
        ))
        .map_err(xml_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("variables")))
        .map_err(xml_error)?;
    for variable in graph.variables().iter() {
        writer
            .write_event(Event::Start(BytesStart::new("variable").with_attributes([
                ("id", variable.id.as_str()),
                ("type", variable.ty.as_str()),
            ])))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Text(BytesText::new(&variable.name)))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("variable")))
            .map_err(xml_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("variables")))
        .map_err(xml_error)?;

    for root in graph.roots() {
        write_chain(&mut writer, graph, *root)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("xml")))
        .map_err(xml_error)?;

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

/// Writes a chain as nested `<block>…<next><block>…` elements, closing every
/// opened element once the chain ends.
fn write_chain(
    writer: &mut Writer<Vec<u8>>,
    graph: &Graph,
    first: NodeKey,
) -> Result<(), CompileError> {
    let chain: Vec<_> = graph
        .chain(Some(first))
        .into_iter()
        .filter_map(|key| graph.node(key))
        .collect();
    for (position, node) in chain.iter().enumerate() {
        if position > 0 {
            writer
                .write_event(Event::Start(BytesStart::new("next")))
                .map_err(xml_error)?;
        }

        let mut start = BytesStart::new("block")
            .with_attributes([("type", node.kind.as_str()), ("id", node.id.as_str())]);
        if let Some(layout) = node.layout {
            start.push_attribute(("x", layout.x.to_string().as_str()));
            start.push_attribute(("y", layout.y.to_string().as_str()));
            if layout.collapsed {
                start.push_attribute(("collapsed", "true"));
            }
        }
        writer.write_event(Event::Start(start)).map_err(xml_error)?;

        for (name, value) in &node.fields {
            let mut field = BytesStart::new("field").with_attributes([("name", name.as_str())]);
            let is_variable = node.kind.field(name).is_some_and(|spec| spec.variable);
            let text = match graph.variables().get(value) {
                Some(variable) if is_variable => {
                    field.push_attribute(("id", variable.id.as_str()));
                    variable.name.as_str()
                }
                _ => value.as_str(),
            };
            writer.write_event(Event::Start(field)).map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new("field")))
                .map_err(xml_error)?;
        }

        for slot in &node.slots {
            let Some(child) = slot.first else {
                continue;
            };
            writer
                .write_event(Event::Start(
                    BytesStart::new("statement").with_attributes([("name", slot.name.as_str())]),
                ))
                .map_err(xml_error)?;
            write_chain(writer, graph, child)?;
            writer
                .write_event(Event::End(BytesEnd::new("statement")))
                .map_err(xml_error)?;
        }
    }

    for position in (0..chain.len()).rev() {
        writer
            .write_event(Event::End(BytesEnd::new("block")))
            .map_err(xml_error)?;
        if position > 0 {
            writer
                .write_event(Event::End(BytesEnd::new("next")))
                .map_err(xml_error)?;
        }
    }
    Ok(())
}
