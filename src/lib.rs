//! # Stepforge - Instrument Procedure Compiler
//!
//! **Stepforge** compiles instrument-automation procedures, authored as an
//! editable node graph or as a plain list of steps, into runnable Python
//! scripts that drive lab equipment over SCPI.
//!
//! ## Core Workflow
//!
//! 1.  **Load a Document**: either the Graph form (Blockly-style XML with a
//!     variable declaration block) or the Step form (a JSON list of
//!     `{ "kind", "params", "body" }` objects). [`compiler::Document::parse`]
//!     tells them apart by shape.
//! 2.  **Translate**: graphs are translated into the canonical step sequence.
//!     This is the one place where variable ids become display names.
//! 3.  **Generate**: the generator walks the steps once, tracking which device
//!     connection each step targets, serializing arguments into literals and
//!     rendering every device operation through the selected backend's
//!     templates.
//! 4.  **Validate** (optional): commands are cross-checked against a command
//!     reference index. Findings come back as diagnostics next to the script.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepforge::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let steps = r#"[
//!         {"kind": "connect", "params": {"role": "scope", "host": "192.168.1.10"}},
//!         {"kind": "for_loop", "params": {"variable": "i", "start": 0, "end": 4, "step": 1},
//!          "body": [
//!             {"kind": "write", "params": {"context": "scope", "command": "CH1:SCAle {1+i*0.5}"}},
//!             {"kind": "wait", "params": {"seconds": 0.5}}
//!          ]},
//!         {"kind": "disconnect", "params": {"role": "scope"}}
//!     ]"#;
//!
//!     let document = Document::parse(steps)?;
//!     let script = Compiler::builder(document)
//!         .backend(BackendKind::PyVisa)
//!         .build()
//!         .compile()?;
//!
//!     for diagnostic in &script.diagnostics {
//!         eprintln!("{}", diagnostic);
//!     }
//!     println!("{}", script.source);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod codegen;
pub mod compiler;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod prelude;
pub mod reference;
pub mod step;
pub mod translate;
pub mod validate;
