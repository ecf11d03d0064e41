//! Tests for argument serialization and identifier scoping.
use stepforge::backend::PYTHON_LITERALS;
use stepforge::codegen::{Scope, expression, quote, sanitize, serialize, serialize_with, string_literal};

fn ser(raw: &str) -> Option<String> {
    serialize(raw, &PYTHON_LITERALS)
}

#[test]
fn test_serialize_classification_table() {
    assert_eq!(ser("1.0").as_deref(), Some("1.0"));
    assert_eq!(ser("True").as_deref(), Some("True"));
    assert_eq!(ser("SAMPLE").as_deref(), Some("\"SAMPLE\""));
    assert_eq!(ser("TekExpress PCI").as_deref(), Some("\"TekExpress PCI\""));
    assert_eq!(ser(r"C:\data\f.txt").as_deref(), Some(r#""C:\\data\\f.txt""#));
    assert_eq!(ser("\"ON\"").as_deref(), Some("\"ON\""));
    assert_eq!(ser(""), None);
    assert_eq!(ser("   "), None);
}

#[test]
fn test_serialize_numbers_and_keywords() {
    assert_eq!(ser("-3").as_deref(), Some("-3"));
    assert_eq!(ser("2e-6").as_deref(), Some("2e-6"));
    assert_eq!(ser("007").as_deref(), Some("\"007\""));
    assert_eq!(ser("false").as_deref(), Some("False"));
    assert_eq!(ser("null").as_deref(), Some("None"));
    assert_eq!(ser("[1, 2]").as_deref(), Some("[1, 2]"));
    assert_eq!(ser("'single'").as_deref(), Some("'single'"));
}

#[test]
fn test_serialize_placeholders() {
    assert_eq!(ser("{1+i*0.5}").as_deref(), Some("1+i*0.5"));
    assert_eq!(ser("CH{n}").as_deref(), Some("f\"CH{n}\""));
    assert_eq!(ser("{}").as_deref(), Some("\"{}\""));
    assert_eq!(ser("a {unclosed").as_deref(), Some("\"a {unclosed\""));
}

#[test]
fn test_interpolation_falls_back_to_concatenation() {
    let literal = ser(r#"MEAS {d["key"]}"#).expect("some literal");
    assert_eq!(literal, r#""MEAS " + str(d["key"])"#);
}

#[test]
fn test_serialize_with_rewrites_placeholders() {
    let rewrite = |e: &str| e.replace("level", "level_1");
    assert_eq!(
        serialize_with("{level}", &PYTHON_LITERALS, &rewrite).as_deref(),
        Some("level_1")
    );
    assert_eq!(
        string_literal("SOURce:VOLTage {level}", &PYTHON_LITERALS, &rewrite),
        "f\"SOURce:VOLTage {level_1}\""
    );
}

#[test]
fn test_string_literal_never_passes_numbers_through() {
    let plain = |e: &str| e.to_string();
    assert_eq!(string_literal("42", &PYTHON_LITERALS, &plain), "\"42\"");
    assert_eq!(
        string_literal("SAVE:IMAGe \"C:/a.png\"", &PYTHON_LITERALS, &plain),
        r#""SAVE:IMAGe \"C:/a.png\"""#
    );
}

#[test]
fn test_quote_escapes_control_characters() {
    assert_eq!(quote("a\tb\nc", &PYTHON_LITERALS), r#""a\tb\nc""#);
}

#[test]
fn test_expression_parenthesises_placeholders() {
    let plain = |e: &str| e.to_string();
    assert_eq!(expression("{a + b} > 3", &plain), "(a + b) > 3");
}

#[test]
fn test_sanitize_identifiers() {
    assert_eq!(sanitize("peak voltage"), "peak_voltage");
    assert_eq!(sanitize("2nd"), "_2nd");
    assert_eq!(sanitize("class"), "class_");
    assert_eq!(sanitize("time"), "time_");
    assert_eq!(sanitize(""), "_");
}

#[test]
fn test_scope_loop_shadowing() {
    let mut scope = Scope::new();
    let outer = scope.push_loop("i");
    let inner = scope.push_loop("i");
    assert_eq!(outer, "i");
    assert_eq!(inner, "i_1");
    assert_eq!(scope.lookup("i"), Some("i_1"));
    assert_eq!(scope.rewrite("i + 1"), "i_1 + 1");

    scope.pop_loop();
    assert_eq!(scope.lookup("i"), Some("i"));
    scope.pop_loop();
    assert_eq!(scope.lookup("i"), Some("i"));
}

#[test]
fn test_scope_distinct_names_get_distinct_identifiers() {
    let mut scope = Scope::new();
    let a = scope.declare("peak voltage");
    let b = scope.declare("peak_voltage");
    assert_eq!(a, "peak_voltage");
    assert_eq!(b, "peak_voltage_1");
    assert_eq!(scope.declare("peak voltage"), a);
}

#[test]
fn test_rewrite_skips_strings_and_attributes() {
    let mut scope = Scope::new();
    scope.declare("x y");
    scope.declare("value");
    assert_eq!(scope.rewrite("value"), "value");
    assert_eq!(scope.rewrite("obj.value + 'value'"), "obj.value + 'value'");

    let mut renamed = Scope::new();
    renamed.fresh("count");
    let ident = renamed.declare("count");
    assert_eq!(ident, "count_1");
    assert_eq!(renamed.rewrite("count * 2 + obj.count"), "count_1 * 2 + obj.count");
    assert_eq!(renamed.rewrite("print(\"count\")"), "print(\"count\")");
}
