//! Public entry point: document in, script and diagnostics out.

use crate::backend::BackendKind;
use crate::codegen::{GenerationOptions, Generator};
use crate::error::CompileError;
use crate::reference::CommandIndex;
use crate::validate::Validator;
use std::sync::Arc;

mod document;

pub use crate::codegen::GeneratedScript;
pub use document::Document;

/// A configured compilation of one document.
///
/// Compiling is a pure function of the document, the backend selection, the
/// options and the (read-only, shareable) command reference.
pub struct Compiler {
    document: Document,
    backend: BackendKind,
    options: GenerationOptions,
    reference: Option<Arc<CommandIndex>>,
}

pub struct CompilerBuilder {
    document: Document,
    backend: BackendKind,
    options: GenerationOptions,
    reference: Option<Arc<CommandIndex>>,
}

impl CompilerBuilder {
    pub fn new(document: impl Into<Document>) -> Self {
        Self {
            document: document.into(),
            backend: BackendKind::PyVisa,
            options: GenerationOptions::default(),
            reference: None,
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables command validation against `index`.
    pub fn with_reference(mut self, index: impl Into<Arc<CommandIndex>>) -> Self {
        self.reference = Some(index.into());
        self
    }

    pub fn build(self) -> Compiler {
        Compiler {
            document: self.document,
            backend: self.backend,
            options: self.options,
            reference: self.reference,
        }
    }
}

impl Compiler {
    pub fn builder(document: impl Into<Document>) -> CompilerBuilder {
        CompilerBuilder::new(document)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Translates, generates and validates. Structural and generation errors
    /// abort with no output; semantic issues come back as diagnostics.
    pub fn compile(&self) -> Result<GeneratedScript, CompileError> {
        let steps = self.document.steps()?;
        tracing::debug!(steps = steps.len(), "document translated");

        let mut script = Generator::new(self.backend, &self.options)
            .with_declared(self.document.declared_variables())
            .generate(&steps)?;

        if let Some(index) = &self.reference {
            let findings = Validator::new(index).validate(&steps);
            tracing::debug!(findings = findings.len(), "commands validated");
            script.diagnostics.extend(findings);
        }
        Ok(script)
    }
}
