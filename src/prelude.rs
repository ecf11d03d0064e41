//! Prelude module for convenient imports
//!
//! Re-exports the types most programs need to load a document, compile it and
//! inspect the result.
//!
//! # Example
//!
//! ```rust,no_run
//! use stepforge::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let document = Document::from_file("path/to/procedure.xml")?;
//! let reference = CommandIndex::load("path/to/commands.json")?;
//!
//! let script = Compiler::builder(document)
//!     .backend(BackendKind::TmDevices)
//!     .with_reference(reference)
//!     .build()
//!     .compile()?;
//!
//! std::fs::write("procedure.py", &script.source)?;
//! # Ok(())
//! # }
//! ```

// Compilation
pub use crate::compiler::{Compiler, Document, GeneratedScript};
pub use crate::codegen::{GenerationOptions, LineEnding};
pub use crate::backend::BackendKind;

// Program representations
pub use crate::graph::{Graph, VariableType};
pub use crate::step::{Kind, Step, StepKind};

// Reference data and findings
pub use crate::diagnostics::{Diagnostic, Severity};
pub use crate::reference::CommandIndex;

// Error types
pub use crate::error::{CompileError, GenerationError, ReferenceError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
