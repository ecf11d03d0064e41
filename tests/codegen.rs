//! Tests for Python generation across backends.
mod common;
use common::*;
use stepforge::codegen::Generator;
use stepforge::prelude::*;
use stepforge::step::{ForLoopParams, Number, PollParams};

#[test]
fn test_script_frame_for_pyvisa() {
    let script = generate(SCALE_SWEEP_STEPS, BackendKind::PyVisa);
    let src = &script.source;
    assert!(script.diagnostics.is_empty(), "{:?}", script.diagnostics);

    let expected_order = [
        "# Backend: pyvisa",
        "import time\nimport pyvisa\n",
        "rm = pyvisa.ResourceManager()\nscope = None\n",
        "try:\n    scope = rm.open_resource(\"TCPIP::192.168.1.10::INSTR\")\n    scope.timeout = 5000\n",
        "    for i in range(0, 5):\n        scope.write(f\"CH1:SCAle {1+i*0.5}\")\n        time.sleep(0.5)\n",
        "    scope.close()\n    scope = None\n",
        "except Exception as exc:\n    print(f\"Procedure failed: {exc}\")\n    raise\n",
        "finally:\n    if scope is not None:\n        scope.close()\n    rm.close()\n",
    ];
    let mut last = 0;
    for fragment in expected_order {
        let at = position(src, fragment);
        assert!(at >= last, "{:?} is out of order in:\n{}", fragment, src);
        last = at;
    }
    assert!(src.ends_with("rm.close()\n"));
}

#[test]
fn test_header_comment_and_line_endings_are_configurable() {
    let options = GenerationOptions::default()
        .with_header_comment(false)
        .with_line_ending(LineEnding::Crlf);
    let script = Generator::new(BackendKind::PyVisa, &options)
        .generate(&steps(SCALE_SWEEP_STEPS))
        .expect("generate");
    assert!(script.source.starts_with("import time\r\n"));
    assert!(!script.source.replace("\r\n", "").contains('\n'));
}

#[test]
fn test_for_loop_ranges() {
    let src = source(
        r#"[
            {"kind": "for_loop", "params": {"variable": "a", "start": 10, "end": 0, "step": -2}},
            {"kind": "for_loop", "params": {"variable": "b", "start": 0, "end": 1, "step": 0.25}},
            {"kind": "sweep", "params": {"variable": "c", "start": 1, "stop": 2, "points": 5}}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains("for a in range(10, -1, -2):\n        pass"));
    assert!(src.contains("for b in [round(0 + _n * 0.25, 12) for _n in range(5)]:"));
    assert!(src.contains("for c in [round(1 + _k * 0.25, 12) for _k in range(5)]:"));
}

#[test]
fn test_nested_loops_with_same_name_get_fresh_identifier() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "for_loop", "params": {"variable": "i", "start": 1, "end": 2, "step": 1}, "body": [
                {"kind": "for_loop", "params": {"variable": "i", "start": 1, "end": 4, "step": 1}, "body": [
                    {"kind": "write", "params": {"command": "CH{i}:SCAle 1"}}
                ]},
                {"kind": "write", "params": {"command": "CH{i}:POSition 0"}}
            ]}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains("    for i in range(1, 3):\n"));
    assert!(src.contains("        for i_1 in range(1, 5):\n"));
    assert!(src.contains("            scope.write(f\"CH{i_1}:SCAle 1\")\n"));
    assert!(src.contains("        scope.write(f\"CH{i}:POSition 0\")\n"));
}

#[test]
fn test_variables_are_initialised_and_bound() {
    let script = generate(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "query", "params": {"command": "*IDN?", "result": "idn"}},
            {"kind": "set_variable", "params": {"variable": "count", "value": "0"}},
            {"kind": "set_variable", "params": {"variable": "label", "value": "run {count}"}},
            {"kind": "set_variable", "params": {"variable": "empty", "value": ""}},
            {"kind": "get_variable", "params": {"variable": "idn"}}
        ]"#,
        BackendKind::PyVisa,
    );
    let src = &script.source;
    let init = position(src, "idn = None\ncount = None\nlabel = None\nempty = None\n");
    assert!(init < position(src, "try:"));
    assert!(src.contains("    idn = scope.query(\"*IDN?\").strip()\n"));
    assert!(src.contains("    count = 0\n"));
    assert!(src.contains("    label = f\"run {count}\"\n"));
    assert!(src.contains("    empty = None\n"));
    assert!(src.contains("    print(idn)\n"));
}

#[test]
fn test_role_name_wins_plain_identifier() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "set_variable", "params": {"variable": "scope", "value": "1"}}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains("scope = None\nscope_1 = None\n"));
    assert!(src.contains("    scope_1 = 1\n"));
}

#[test]
fn test_while_and_conditional() {
    let src = source(
        r#"[
            {"kind": "set_variable", "params": {"variable": "n", "value": "0"}},
            {"kind": "while_loop", "params": {"condition": "n < 3", "max_iterations": 10}, "body": [
                {"kind": "set_variable", "params": {"variable": "n", "value": "{n + 1}"}}
            ]},
            {"kind": "while_loop", "params": {"condition": "n > 0"}},
            {"kind": "conditional", "params": {"condition": "n == 3"},
             "else_body": [{"kind": "wait", "params": {"seconds": 1}}]},
            {"kind": "conditional", "params": {"condition": ""}}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains(
        "    _guard = 0\n    while (n < 3) and _guard < 10:\n        _guard += 1\n        n = n + 1\n"
    ));
    assert!(src.contains("    while n > 0:\n        pass\n"));
    assert!(src.contains("    if n == 3:\n        pass\n    else:\n        time.sleep(1)\n"));
    assert!(src.contains("    if False:\n        pass\n"));
}

#[test]
fn test_custom_code_is_reindented() {
    let src = source(
        r#"[
            {"kind": "for_loop", "params": {"variable": "k", "start": 0, "end": 1, "step": 1}, "body": [
                {"kind": "custom_code", "params": {"code": "  if k:\n      print(k)\n"}}
            ]}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains("        if k:\n            print(k)\n"));
}

#[test]
fn test_missing_connection_emits_raise_and_diagnostic() {
    let script = generate(
        r#"[{"id": "w9", "kind": "write", "params": {"command": "*RST"}}]"#,
        BackendKind::PyVisa,
    );
    assert!(script.source.contains(
        "    raise RuntimeError(\"step 'w9' has no active device connection\")\n"
    ));
    assert_eq!(script.diagnostics.len(), 1);
    assert_eq!(script.diagnostics[0].severity, Severity::Error);
    assert_eq!(script.diagnostics[0].step_id, "w9");
}

#[test]
fn test_inactive_role_and_family_mismatch_diagnostics() {
    let script = generate(
        r#"[
            {"kind": "connect", "params": {"role": "smu", "host": "h"}},
            {"id": "w1", "kind": "write", "params": {"command": "CH1:SCAle 1.0"}},
            {"id": "w2", "kind": "write", "params": {"context": "scope", "command": "*RST"}},
            {"id": "d1", "kind": "disconnect", "params": {"role": "scope"}}
        ]"#,
        BackendKind::PyVisa,
    );
    let summary: Vec<_> = script
        .diagnostics
        .iter()
        .map(|d| (d.step_id.as_str(), d.severity))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("w1", Severity::Warning),
            ("w2", Severity::Error),
            ("d1", Severity::Error),
        ]
    );
    assert!(script.source.contains("    smu.write(\"CH1:SCAle 1.0\")\n"));
}

#[test]
fn test_reconnect_releases_previous_handle() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "a"}},
            {"kind": "connect", "params": {"role": "scope", "host": "b"}}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains(
        "    scope.timeout = 5000\n    if scope is not None:\n        scope.close()\n    scope = rm.open_resource(\"TCPIP::b::INSTR\")\n"
    ));
}

#[test]
fn test_poll_emits_bounded_state_machine() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "poll", "params": {
                "query": "*OPC?", "success_states": ["1"],
                "recoverable_states": ["busy"], "recovery_command": "ACQuire:STATE RUN",
                "failure_states": ["ERROR"], "interval_s": 1, "timeout_s": 10
            }}
        ]"#,
        BackendKind::PyVisa,
    );
    let expected = [
        "    _deadline = time.monotonic() + 10",
        "    for _attempt in range(11):",
        "        _status = scope.query(\"*OPC?\").strip()",
        "        _status = str(_status).strip().upper()",
        "        if _status in (\"1\",):",
        "            break",
        "        if _status in (\"ERROR\",):",
        "            raise RuntimeError(f\"scope reported {_status}\")",
        "        if _status in (\"BUSY\",):",
        "            scope.write(\"ACQuire:STATE RUN\")",
        "        if time.monotonic() > _deadline:",
        "            raise TimeoutError(\"*OPC? did not report 1 within 10 s\")",
        "        time.sleep(1)",
        "    else:",
        "        raise TimeoutError(\"*OPC? did not report 1 within 10 s\")",
    ]
    .join("\n");
    assert!(src.contains(&expected), "poll block not found in:\n{}", src);
}

#[test]
fn test_poll_uses_option_defaults() {
    let options = GenerationOptions::default()
        .with_poll_interval_s(2.0)
        .with_poll_timeout_s(30.0);
    let script = Generator::new(BackendKind::PyVisa, &options)
        .generate(&steps(
            r#"[
                {"kind": "connect", "params": {"role": "scope", "host": "h"}},
                {"kind": "poll", "params": {"query": "*OPC?", "success_states": "1"}}
            ]"#,
        ))
        .expect("generate");
    assert!(script.source.contains("_deadline = time.monotonic() + 30\n"));
    assert!(script.source.contains("for _attempt in range(16):\n"));
    assert!(script.source.contains("time.sleep(2)\n"));
}

#[test]
fn test_file_transfer_restores_timeout_and_settles() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "file_transfer", "params": {
                "remote_path": "C:/Temp/shot.png", "local_path": "shot.png",
                "save_command": "SAVE:IMAGe \"C:/Temp/shot.png\"", "cleanup": true
            }}
        ]"#,
        BackendKind::PyVisa,
    );
    // The save is awaited under the transfer timeout before the read starts.
    let save = position(&src, "    scope.write(\"SAVE:IMAGe \\\"C:/Temp/shot.png\\\"\")\n");
    let opc = position(&src, "    scope.timeout = 60000\n    try:\n        scope.query(\"*OPC?\")\n");
    assert!(save < opc);

    let transfer = &src[opc + 1..];
    let extend = position(transfer, "    _previous_timeout = scope.timeout\n    scope.timeout = 60000\n    try:\n");
    let read = position(
        transfer,
        "        scope.write(\"FILESystem:READFile \\\"C:/Temp/shot.png\\\"\")\n        _data = scope.read_raw()\n",
    );
    let restore = position(transfer, "    finally:\n        scope.timeout = _previous_timeout\n    with open(");
    let write = position(transfer, "    with open(\"shot.png\", \"wb\") as _file:\n        _file.write(_data)\n");
    let settle = position(transfer, "    time.sleep(0.5)\n");
    let delete = position(transfer, "    scope.write(\"FILESystem:DELEte \\\"C:/Temp/shot.png\\\"\")\n");
    assert!(extend < read && read < restore);
    assert!(restore < write && write < settle && settle < delete);

    let after_read = &transfer[read..settle];
    assert!(!after_read.contains(".query("));
}

#[test]
fn test_socket_backend_emits_helper_class() {
    let src = source(SCALE_SWEEP_STEPS, BackendKind::Socket);
    assert!(src.contains("import socket\n"));
    assert!(src.contains("class ScpiSocket:\n"));
    assert!(src.contains("    scope = ScpiSocket(\"192.168.1.10\", 4000, timeout_ms=5000)\n"));
    assert!(src.contains("        scope.write(f\"CH1:SCAle {1+i*0.5}\")\n"));
}

#[test]
fn test_tm_devices_uses_structured_calls() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "10.0.0.1"}},
            {"kind": "write", "params": {"command": "CH1:SCAle 0.5"}},
            {"kind": "write", "params": {"command": "*RST"}}
        ]"#,
        BackendKind::TmDevices,
    );
    assert!(src.contains("from tm_devices import DeviceManager\n"));
    assert!(src.contains("device_manager = DeviceManager(verbose=False)\n"));
    assert!(src.contains("    scope = device_manager.add_scope(\"10.0.0.1\", alias=\"scope\")\n"));
    assert!(src.contains("    scope.commands.ch[1].scale.write(0.5)\n"));
    assert!(src.contains("    scope.write(\"*RST\")\n"));
    assert!(src.contains("device_manager.close()\n"));
}

#[test]
fn test_tekhsi_write_is_a_generation_error() {
    let options = GenerationOptions::default();
    let err = Generator::new(BackendKind::TekHsi, &options)
        .generate(&steps(
            r#"[
                {"kind": "connect", "params": {"role": "scope", "host": "h"}},
                {"id": "w1", "kind": "write", "params": {"command": "CH1:SCAle 1"}}
            ]"#,
        ))
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Generation(GenerationError::MissingTemplate {
            backend: "tekhsi".to_string(),
            operation: "write".to_string(),
            step_id: "w1".to_string(),
        })
    );
}

#[test]
fn test_tekhsi_query_fetches_waveform() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "query", "params": {"command": "CURVe? CH1", "result": "wave"}}
        ]"#,
        BackendKind::TekHsi,
    );
    assert!(src.contains("from tekhsi import TekHSIConnect\n"));
    assert!(src.contains("    scope = TekHSIConnect(\"h:5000\")\n"));
    assert!(src.contains("    with scope.access_data():\n        wave = scope.get_data(\"ch1\")\n"));
}

#[test]
fn test_hybrid_script_imports_every_backend() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "a", "backend": "tm_devices"}},
            {"kind": "connect", "params": {"role": "psu", "host": "b"}},
            {"kind": "write", "params": {"context": "psu", "command": "OUTPut ON"}},
            {"kind": "write", "params": {"context": "scope", "command": "CH1:SCAle 1"}}
        ]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains("import pyvisa\n"));
    assert!(src.contains("from tm_devices import DeviceManager\n"));
    assert!(src.contains("    psu.write(\"OUTPut ON\")\n"));
    assert!(src.contains("    scope.commands.ch[1].scale.write(1)\n"));
    assert_eq!(src.matches("import time").count(), 1);
}

#[test]
fn test_failed_generation_produces_no_partial_output() {
    let steps = steps(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "file_transfer", "params": {"remote_path": "a.png", "local_path": "a.png"}}
        ]"#,
    );
    let result = Compiler::builder(steps)
        .backend(BackendKind::TekHsi)
        .build()
        .compile();
    assert!(matches!(
        result,
        Err(CompileError::Generation(GenerationError::MissingTemplate { ref operation, .. }))
            if operation == "file_transfer"
    ));
}

#[test]
fn test_poll_recovers_on_wait_and_error_until_complete() {
    let src = source(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "poll", "params": {
                "query": "TEKEXP:STATE?", "success_states": ["COMPLETE"],
                "recoverable_states": ["WAIT", "ERROR"], "recovery_command": "TEKEXP:STATE RUN",
                "interval_s": 2, "timeout_s": 120
            }}
        ]"#,
        BackendKind::PyVisa,
    );
    let expected = [
        "    _deadline = time.monotonic() + 120",
        "    for _attempt in range(61):",
        "        _status = scope.query(\"TEKEXP:STATE?\").strip()",
        "        _status = str(_status).strip().upper()",
        "        if _status in (\"COMPLETE\",):",
        "            break",
        "        if _status in (\"WAIT\", \"ERROR\"):",
        "            scope.write(\"TEKEXP:STATE RUN\")",
        "        if time.monotonic() > _deadline:",
        "            raise TimeoutError(\"TEKEXP:STATE? did not report COMPLETE within 120 s\")",
        "        time.sleep(2)",
        "    else:",
        "        raise TimeoutError(\"TEKEXP:STATE? did not report COMPLETE within 120 s\")",
    ]
    .join("\n");
    assert!(src.contains(&expected), "poll block not found in:\n{}", src);
    assert!(!src.contains("RuntimeError"));
}

#[test]
fn test_oversized_fractional_loop_is_rejected() {
    let result = Document::parse(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"id": "f", "kind": "for_loop",
             "params": {"variable": "v", "start": 0.5, "end": 1e300, "step": 0.5}}
        ]"#,
    );
    assert!(matches!(
        result,
        Err(CompileError::InvalidField { ref element_id, ref field, .. })
            if element_id == "f" && field == "end"
    ));

    // Steps built in code skip the parser; the generator checks again.
    let number = |text: &str| Number::parse(text).expect("number");
    let built = vec![Step::new(
        "huge",
        StepKind::ForLoop {
            params: ForLoopParams {
                variable: "v".to_string(),
                start: number("0.5"),
                end: number("1e300"),
                step: number("0.5"),
            },
            body: Vec::new(),
        },
    )];
    let result = Compiler::builder(built).build().compile();
    assert!(matches!(
        result,
        Err(CompileError::InvalidField { ref element_id, .. }) if element_id == "huge"
    ));
}

#[test]
fn test_large_integral_loop_stays_a_range() {
    let src = source(
        r#"[{"kind": "for_loop", "params": {"variable": "n", "start": 0, "end": 1e12, "step": 1}}]"#,
        BackendKind::PyVisa,
    );
    assert!(src.contains("for n in range(0, 1000000000001):"));
}

#[test]
fn test_oversized_poll_is_rejected() {
    let result = Document::parse(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"id": "p", "kind": "poll", "params": {
                "query": "*OPC?", "success_states": ["1"],
                "interval_s": 1e-300, "timeout_s": 1e300
            }}
        ]"#,
    );
    assert!(matches!(
        result,
        Err(CompileError::InvalidField { ref element_id, ref field, .. })
            if element_id == "p" && field == "interval_s"
    ));

    // Only the interval is on the step; the timeout comes from the options.
    let tiny_interval = steps(
        r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"id": "p", "kind": "poll", "params": {
                "query": "*OPC?", "success_states": ["1"], "interval_s": 1e-300
            }}
        ]"#,
    );
    let result = Compiler::builder(tiny_interval).build().compile();
    assert!(matches!(
        result,
        Err(CompileError::InvalidField { ref element_id, .. }) if element_id == "p"
    ));
}

#[test]
fn test_non_positive_poll_interval_option_is_rejected() {
    assert!(matches!(
        GenerationOptions::from_json(r#"{"poll_interval_s": 0.0}"#),
        Err(CompileError::MalformedDocument(_))
    ));
    assert!(matches!(
        GenerationOptions::from_json(r#"{"poll_timeout_s": -5}"#),
        Err(CompileError::MalformedDocument(_))
    ));

    let options = GenerationOptions::default().with_poll_interval_s(0.0);
    let poll = Step::new(
        "p",
        StepKind::Poll(PollParams {
            context: None,
            query: "*OPC?".to_string(),
            success_states: vec!["1".to_string()],
            recoverable_states: Vec::new(),
            recovery_command: None,
            failure_states: Vec::new(),
            interval_s: None,
            timeout_s: None,
        }),
    );
    let result = Generator::new(BackendKind::PyVisa, &options).generate(&[poll]);
    assert!(matches!(result, Err(CompileError::MalformedDocument(_))));
}

#[test]
fn test_extra_fields_do_not_change_generated_code() {
    let plain = source(
        r#"[{"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "write", "params": {"command": "*RST"}}]"#,
        BackendKind::PyVisa,
    );
    let annotated = source(
        r#"[{"kind": "connect", "params": {"role": "scope", "host": "h"}},
            {"kind": "write", "params": {"command": "*RST", "comment": "reset first"}, "detached": true}]"#,
        BackendKind::PyVisa,
    );
    assert_eq!(plain, annotated);
}
