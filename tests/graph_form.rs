//! Tests for the Graph form and the node graph model.
mod common;
use common::*;
use stepforge::graph::{Layout, graph_to_xml, parse_graph};
use stepforge::prelude::*;

fn sweep_graph() -> Graph {
    parse_graph(SCALE_SWEEP_GRAPH).expect("fixture graph should parse")
}

#[test]
fn test_parse_graph_structure() {
    let graph = sweep_graph();
    assert_eq!(graph.len(), 5);
    assert_eq!(graph.roots().len(), 1);
    assert_eq!(graph.variables().len(), 2);

    let top = graph.chain(graph.roots().first().copied());
    let ids: Vec<_> = top
        .iter()
        .filter_map(|key| graph.node(*key))
        .map(|node| node.id.as_str())
        .collect();
    assert_eq!(ids, vec!["c1", "f1", "d1"]);

    let for_loop = graph.key_of("f1").and_then(|k| graph.node(k)).expect("f1");
    assert_eq!(for_loop.fields.get("variable").map(String::as_str), Some("v_i"));
    let body = graph.chain(for_loop.slot("DO"));
    assert_eq!(body.len(), 2);
}

#[test]
fn test_variable_fields_hold_ids() {
    let graph = sweep_graph();
    let query = graph.key_of("q1").and_then(|k| graph.node(k)).expect("q1");
    assert_eq!(query.fields.get("result").map(String::as_str), Some("v_amp"));
    assert_eq!(graph.variables().name_of("v_amp"), Some("amplitude"));
    assert_eq!(
        graph.variables().get("v_i").map(|v| v.ty),
        Some(VariableType::LoopIndex)
    );
}

#[test]
fn test_undeclared_variable_is_rejected() {
    let xml = r#"<xml>
        <variables><variable id="a">count</variable></variables>
        <block type="set_variable" id="s1">
            <field name="variable" id="missing">count</field>
            <field name="value">1</field>
        </block>
    </xml>"#;
    let err = parse_graph(xml).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnresolvedVariable {
            element_id: "s1".to_string(),
            variable_id: "missing".to_string(),
        }
    );
}

#[test]
fn test_duplicate_ids_and_names_are_rejected() {
    let duplicate_node = r#"<xml>
        <block type="wait" id="n1"><field name="seconds">1</field>
          <next><block type="wait" id="n1"><field name="seconds">2</field></block></next>
        </block>
    </xml>"#;
    assert!(parse_graph(duplicate_node).is_err());

    let duplicate_name = r#"<xml><variables>
        <variable id="a">x</variable>
        <variable id="b">x</variable>
    </variables></xml>"#;
    assert!(matches!(
        parse_graph(duplicate_name),
        Err(CompileError::VariableConflict(_))
    ));
}

#[test]
fn test_unknown_block_type_and_bad_root() {
    let err = parse_graph(r#"<xml><block type="teleport" id="t"/></xml>"#).unwrap_err();
    assert!(matches!(err, CompileError::UnknownKind { ref kind, .. } if kind == "teleport"));

    assert!(matches!(
        parse_graph("<html/>"),
        Err(CompileError::MalformedDocument(_))
    ));
    assert!(matches!(
        parse_graph("<xml><block"),
        Err(CompileError::MalformedDocument(_))
    ));
}

#[test]
fn test_rename_does_not_touch_nodes() {
    let mut graph = sweep_graph();
    let before = graph.key_of("q1").and_then(|k| graph.node(k)).cloned();

    graph
        .variables_mut()
        .rename("v_amp", "peak")
        .expect("rename should succeed");

    let after = graph.key_of("q1").and_then(|k| graph.node(k)).cloned();
    assert_eq!(before, after);
    assert_eq!(graph.variables().name_of("v_amp"), Some("peak"));

    assert!(matches!(
        graph.variables_mut().rename("v_amp", "i"),
        Err(CompileError::VariableConflict(_))
    ));
}

#[test]
fn test_remove_splices_chain_and_drops_subtree() {
    let mut graph = sweep_graph();
    let for_loop = graph.key_of("f1").expect("f1");

    let mut removed = graph.remove(for_loop).expect("remove");
    removed.sort();
    assert_eq!(removed, vec!["f1", "q1", "w1"]);

    let top: Vec<_> = graph
        .chain(graph.roots().first().copied())
        .into_iter()
        .filter_map(|k| graph.node(k))
        .map(|n| n.id.clone())
        .collect();
    assert_eq!(top, vec!["c1", "d1"]);
    assert!(graph.key_of("w1").is_none());
}

#[test]
fn test_build_graph_by_hand() {
    let mut graph = Graph::new();
    let connect = graph.add_node("a", Kind::Connect).expect("add");
    graph.set_field(connect, "role", "scope").expect("field");
    graph.set_field(connect, "host", "10.0.0.5").expect("field");
    let wait = graph.add_node("b", Kind::Wait).expect("add");
    graph.set_field(wait, "seconds", "1").expect("field");
    graph.insert_after(connect, wait).expect("link");
    graph.push_root(connect);

    assert!(graph.add_node("a", Kind::Wait).is_err());
    assert_eq!(graph.chain(Some(connect)), vec![connect, wait]);

    let steps = Document::from(graph).steps().expect("translate");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].kind_tag(), Kind::Wait);
}

#[test]
fn test_leaf_nodes_have_no_statement_slots() {
    let mut graph = Graph::new();
    let wait = graph.add_node("w", Kind::Wait).expect("add");
    let other = graph.add_node("x", Kind::Wait).expect("add");
    assert!(graph.attach(wait, "DO", other).is_err());
}

#[test]
fn test_xml_output_parses_back_to_same_shape() {
    let mut graph = sweep_graph();
    let connect = graph.key_of("c1").expect("c1");
    graph
        .set_layout(
            connect,
            Layout {
                x: 300.0,
                y: 12.5,
                collapsed: true,
            },
        )
        .expect("layout");

    let xml = graph_to_xml(&graph).expect("serialize");
    assert!(xml.contains("<variable id=\"v_i\" type=\"loop-index\">i</variable>"));
    assert!(xml.contains("collapsed=\"true\""));

    let reparsed = parse_graph(&xml).expect("re-parse");
    assert_eq!(reparsed.shape(), graph.shape());
    assert_eq!(reparsed.variables().len(), graph.variables().len());
}

#[test]
fn test_layout_is_not_part_of_shape() {
    let plain = sweep_graph();
    let mut moved = sweep_graph();
    let key = moved.key_of("d1").expect("d1");
    moved.set_layout(key, Layout::default()).expect("layout");
    assert_eq!(plain.shape(), moved.shape());
}

#[test]
fn test_procedure_and_workspace_roots_are_accepted() {
    for root in ["procedure", "workspace"] {
        let xml = format!(
            r#"<{0}><block type="wait" id="w"><field name="seconds">1</field></block></{0}>"#,
            root
        );
        let graph = parse_graph(&xml).unwrap_or_else(|e| panic!("<{}> root: {}", root, e));
        assert_eq!(graph.len(), 1);
    }
}
