//! Common test utilities: procedure fixtures and small generation helpers.
use stepforge::codegen::Generator;
use stepforge::prelude::*;
use stepforge::reference::{ArgumentType, CommandDefinition, CommandType};
use stepforge::device::DeviceFamily;

/// Connect, sweep the channel 1 scale over five points, disconnect.
#[allow(dead_code)]
pub const SCALE_SWEEP_STEPS: &str = r#"[
    {"id": "c1", "kind": "connect", "params": {"role": "scope", "host": "192.168.1.10"}},
    {"id": "f1", "kind": "for_loop",
     "params": {"variable": "i", "start": 0, "end": 4, "step": 1},
     "body": [
        {"id": "w1", "kind": "write", "params": {"context": "scope", "command": "CH1:SCAle {1+i*0.5}"}},
        {"id": "s1", "kind": "wait", "params": {"seconds": 0.5}}
     ]},
    {"id": "d1", "kind": "disconnect", "params": {"role": "scope"}}
]"#;

/// The same procedure as a graph, with a `loop-index` variable and a
/// measurement bound to a string variable.
#[allow(dead_code)]
pub const SCALE_SWEEP_GRAPH: &str = r#"<xml xmlns="https://developers.google.com/blockly/xml">
  <variables>
    <variable id="v_i" type="loop-index">i</variable>
    <variable id="v_amp" type="string">amplitude</variable>
  </variables>
  <block type="connect" id="c1" x="20" y="40">
    <field name="role">scope</field>
    <field name="host">192.168.1.10</field>
    <next>
      <block type="for_loop" id="f1">
        <field name="variable" id="v_i">i</field>
        <field name="start">0</field>
        <field name="end">4</field>
        <field name="step">1</field>
        <statement name="DO">
          <block type="write" id="w1">
            <field name="context">(scope)</field>
            <field name="command">CH1:SCAle {1+i*0.5}</field>
            <next>
              <block type="query" id="q1">
                <field name="command">MEASUrement:MEAS1:VALue?</field>
                <field name="result" id="v_amp">amplitude</field>
              </block>
            </next>
          </block>
        </statement>
        <next>
          <block type="disconnect" id="d1">
            <field name="role">scope</field>
          </block>
        </next>
      </block>
    </next>
  </block>
</xml>"#;

/// A command database in the manual-extraction JSON format.
#[allow(dead_code)]
pub const REFERENCE_JSON: &str = r#"{
    "manual": {"families": ["MSO5", "MSO6"]},
    "commands": [
        {
            "header": "CH<x>:SCAle",
            "arguments": [{"name": "scale", "type": "numeric"}]
        },
        {
            "header": "ACQuire:STATE",
            "arguments": [{"name": "state", "type": "enumeration", "validValues": ["RUN", "STOP", "ON", "OFF"]}]
        },
        {
            "header": "DATa:SOUrce",
            "arguments": [{"name": "source", "type": "mnemonic", "validValues": ["CH<x>", "MATH<x>", "REF<x>"]}]
        },
        {
            "header": "SAVe:IMAGe",
            "arguments": [{"name": "path", "type": "quoted_string"}],
            "commandType": "set"
        },
        {
            "header": "MEASUrement:MEAS<x>:VALue",
            "commandType": "query"
        },
        {
            "header": "SOURce:VOLTage[:LEVel]",
            "arguments": [{"name": "level", "type": "numeric"}],
            "instruments": {"families": ["SMU2450"]}
        }
    ]
}"#;

/// Parses a Step form fixture, failing the test on error.
#[allow(dead_code)]
pub fn steps(json: &str) -> Vec<Step> {
    Document::parse(json)
        .and_then(|d| d.steps())
        .expect("fixture should parse")
}

/// Generates with default options for `backend`.
#[allow(dead_code)]
pub fn generate(json: &str, backend: BackendKind) -> GeneratedScript {
    let options = GenerationOptions::default();
    Generator::new(backend, &options)
        .generate(&steps(json))
        .expect("generation should succeed")
}

/// Generates and returns only the script text.
#[allow(dead_code)]
pub fn source(json: &str, backend: BackendKind) -> String {
    generate(json, backend).source
}

/// Byte offset of `needle` in `haystack`, failing the test if it is absent.
#[allow(dead_code)]
pub fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("expected to find {:?} in:\n{}", needle, haystack))
}

/// A small in-memory reference index built without JSON.
#[allow(dead_code)]
pub fn sample_index() -> CommandIndex {
    CommandIndex::from_definitions([
        CommandDefinition::new("CH<x>:SCAle")
            .with_argument("scale", ArgumentType::Numeric, &[])
            .with_family(DeviceFamily::Scope),
        CommandDefinition::new("ACQuire:STATE")
            .with_argument("state", ArgumentType::Enumeration, &["RUN", "STOP"])
            .with_family(DeviceFamily::Scope),
        CommandDefinition::new("*IDN").with_command_type(CommandType::Query),
        CommandDefinition::new("SOURce:VOLTage[:LEVel]")
            .with_argument("level", ArgumentType::Numeric, &[])
            .with_family(DeviceFamily::Smu),
    ])
}
