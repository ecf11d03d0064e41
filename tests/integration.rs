//! Integration tests for Stepforge
//!
//! End-to-end tests that take a document from its serialized form to a script.
//!
mod common;
use common::*;
use stepforge::prelude::*;
use std::fs;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_scale_sweep_end_to_end() {
        let document = Document::parse(SCALE_SWEEP_STEPS).expect("Failed to parse procedure");
        let script = Compiler::builder(document)
            .backend(BackendKind::PyVisa)
            .build()
            .compile()
            .expect("Failed to compile procedure");

        assert!(script.diagnostics.is_empty());
        assert!(script.source.contains("scope.write(f\"CH1:SCAle {1+i*0.5}\")"));
        assert!(script.source.contains("for i in range(0, 5):"));

        let finally = position(&script.source, "finally:");
        let release = position(&script.source, "    if scope is not None:\n        scope.close()");
        assert!(finally < release);

        println!("{}", script.source);
    }

    #[test]
    fn test_graph_document_end_to_end() {
        let document = Document::parse(SCALE_SWEEP_GRAPH).expect("Failed to parse graph");
        assert!(matches!(document, Document::Graph(_)));
        assert_eq!(document.declared_variables(), vec!["amplitude".to_string()]);

        let reference = CommandIndex::from_json(REFERENCE_JSON).expect("Failed to load reference");
        let script = Compiler::builder(document)
            .backend(BackendKind::TmDevices)
            .with_reference(reference)
            .build()
            .compile()
            .expect("Failed to compile graph");

        assert!(script.diagnostics.is_empty(), "{:?}", script.diagnostics);
        assert!(script.source.contains("amplitude = None"));
        assert!(
            script
                .source
                .contains("amplitude = scope.commands.measurement.meas[1].value.query()")
        );
    }

    #[test]
    fn test_same_procedure_for_every_backend_without_writes() {
        let procedure = r#"[
            {"kind": "connect", "params": {"role": "scope", "host": "192.168.1.10"}},
            {"kind": "query", "params": {"command": "CURVe? CH1", "result": "wave"}},
            {"kind": "disconnect", "params": {"role": "scope"}}
        ]"#;
        for backend in BackendKind::ALL {
            let script = Compiler::builder(Document::parse(procedure).expect("parse"))
                .backend(*backend)
                .build()
                .compile()
                .unwrap_or_else(|e| panic!("{} failed: {}", backend, e));
            assert!(script.source.contains("wave = None"), "{}", backend);
            assert!(script.source.contains("finally:"), "{}", backend);
        }
    }

    #[test]
    fn test_document_conversions() {
        let from_steps = Document::parse(SCALE_SWEEP_STEPS).expect("parse");
        let xml = from_steps.to_graph_xml().expect("to xml");
        let from_graph = Document::parse(&xml).expect("re-parse xml");

        let json = from_graph.to_steps_json().expect("to json");
        let again = Document::parse(&json).expect("re-parse json");

        let original = from_steps.into_graph().expect("graph");
        let round_tripped = again.into_graph().expect("graph");
        assert_eq!(original.shape(), round_tripped.shape());
    }

    #[test]
    fn test_unrecognized_document_is_rejected() {
        assert!(matches!(
            Document::parse("connect scope"),
            Err(CompileError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_documents_and_references_from_files() {
        let dir = std::env::temp_dir().join(format!("stepforge-it-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("Failed to create temp dir");

        let procedure_path = dir.join("procedure.json");
        fs::write(&procedure_path, SCALE_SWEEP_STEPS).expect("write procedure");
        let reference_path = dir.join("commands.json");
        fs::write(&reference_path, REFERENCE_JSON).expect("write reference");
        let snapshot_path = dir.join("commands.bin");

        let document = Document::from_file(&procedure_path).expect("Failed to load procedure");
        let reference = CommandIndex::load(&reference_path).expect("Failed to load reference");
        reference
            .save_snapshot(&snapshot_path)
            .expect("Failed to save snapshot");
        let snapshot = CommandIndex::load(&snapshot_path).expect("Failed to load snapshot");
        assert_eq!(snapshot.len(), reference.len());

        let script = Compiler::builder(document)
            .with_reference(snapshot)
            .build()
            .compile()
            .expect("compile");
        assert!(script.diagnostics.is_empty(), "{:?}", script.diagnostics);

        assert!(matches!(
            Document::from_file(dir.join("missing.json")),
            Err(CompileError::MalformedDocument(_))
        ));
        assert!(matches!(
            CommandIndex::load(dir.join("missing.bin")),
            Err(ReferenceError::Io { .. })
        ));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_generation_options_from_json() {
        let options = GenerationOptions::from_json(
            r#"{"line_ending": "crlf", "default_timeout_ms": 20000}"#,
        )
        .expect("valid options");
        assert_eq!(options.line_ending, LineEnding::Crlf);
        assert_eq!(options.default_timeout_ms, 20000);
        assert_eq!(options.transfer_timeout_ms, 60000);

        let script = Compiler::builder(Document::parse(SCALE_SWEEP_STEPS).expect("parse"))
            .with_options(options)
            .build()
            .compile()
            .expect("compile");
        assert!(script.source.contains("scope.timeout = 20000\r\n"));

        assert!(matches!(
            GenerationOptions::from_json(r#"{"line_ending": "cr"}"#),
            Err(CompileError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let compile = || {
            Compiler::builder(Document::parse(SCALE_SWEEP_GRAPH).expect("parse"))
                .backend(BackendKind::Socket)
                .build()
                .compile()
                .expect("compile")
        };
        assert_eq!(compile(), compile());
    }
}
