//! Cross-checks the commands of a step sequence against the command reference.
//!
//! Read-only: the validator never changes steps and never blocks generation.
//! Context problems (inactive roles) are the generator's to report; this pass
//! only needs the resolved family of each target.

use crate::backend::BackendKind;
use crate::codegen::serializer::has_placeholders;
use crate::device::{Connection, DeviceContextTracker, DeviceFamily};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::reference::header::{HeaderPattern, is_query, split_arguments, split_command};
use crate::reference::{ArgumentSpec, ArgumentType, CommandDefinition, CommandIndex};
use crate::step::{Step, StepKind, clean_context, walk_steps};
use itertools::Itertools;

/// SCPI numeric keywords accepted wherever a number is.
const NUMERIC_KEYWORDS: &[&str] = &["MINimum", "MAXimum", "DEFault", "INFinity", "NINFinity"];

fn accepts_mnemonic(reference: &str, token: &str) -> bool {
    reference.eq_ignore_ascii_case(token) || HeaderPattern::parse(reference).matches(token)
}

fn is_quoted(token: &str) -> bool {
    token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"'))
            || (token.starts_with('\'') && token.ends_with('\'')))
}

/// Why `token` does not fit `spec`, if it does not.
fn argument_mismatch(spec: &ArgumentSpec, token: &str) -> Option<String> {
    match spec.kind {
        ArgumentType::Numeric => {
            let numeric = token.parse::<f64>().is_ok()
                || NUMERIC_KEYWORDS.iter().any(|k| accepts_mnemonic(k, token));
            (!numeric).then(|| format!("'{}' should be numeric, got '{}'", spec.name, token))
        }
        ArgumentType::QuotedString => (!is_quoted(token))
            .then(|| format!("'{}' should be a quoted string, got '{}'", spec.name, token)),
        ArgumentType::Enumeration | ArgumentType::Mnemonic => {
            if is_quoted(token) {
                return Some(format!(
                    "'{}' takes a {}, not a quoted string",
                    spec.name, spec.kind
                ));
            }
            let listed = spec.valid_values.is_empty()
                || spec.valid_values.iter().any(|v| accepts_mnemonic(v, token));
            (!listed).then(|| {
                format!(
                    "'{}' is not a valid value for '{}' (expected one of {})",
                    token,
                    spec.name,
                    spec.valid_values.iter().join(", ")
                )
            })
        }
    }
}

pub struct Validator<'a> {
    index: &'a CommandIndex,
}

impl<'a> Validator<'a> {
    pub fn new(index: &'a CommandIndex) -> Self {
        Self { index }
    }

    pub fn validate(&self, steps: &[Step]) -> Vec<Diagnostic> {
        let mut sink = DiagnosticSink::new();
        let mut tracker = DeviceContextTracker::new();

        walk_steps(steps, &mut |step| match &step.kind {
            StepKind::Connect(p) => {
                let role = clean_context(&p.role);
                tracker.connect(Connection {
                    role: role.to_string(),
                    handle: role.to_string(),
                    backend: p.backend.unwrap_or(BackendKind::PyVisa),
                    family: p
                        .family
                        .or_else(|| DeviceFamily::from_name(role))
                        .unwrap_or(DeviceFamily::Scope),
                });
            }
            StepKind::Disconnect(p) => {
                tracker.disconnect(clean_context(&p.role));
            }
            StepKind::Write(p) => {
                let family = self.family(&tracker, step, &p.command);
                self.check(&mut sink, step, &p.command, false, family);
            }
            StepKind::Query(p) => {
                let family = self.family(&tracker, step, &p.command);
                self.check(&mut sink, step, &p.command, true, family);
            }
            StepKind::Poll(p) => {
                let family = self.family(&tracker, step, &p.query);
                self.check(&mut sink, step, &p.query, true, family);
                if let Some(recovery) = &p.recovery_command {
                    self.check(&mut sink, step, recovery, false, family);
                }
            }
            StepKind::FileTransfer(p) => {
                if let Some(save) = &p.save_command {
                    let family = self.family(&tracker, step, save);
                    self.check(&mut sink, step, save, false, family);
                }
            }
            _ => {}
        });

        sink.into_vec()
    }

    fn family(
        &self,
        tracker: &DeviceContextTracker,
        step: &Step,
        command: &str,
    ) -> Option<DeviceFamily> {
        tracker
            .resolve(step.context(), Some(command))
            .connection
            .map(|c| c.family)
    }

    fn check(
        &self,
        sink: &mut DiagnosticSink,
        step: &Step,
        command: &str,
        expects_response: bool,
        family: Option<DeviceFamily>,
    ) {
        let (header, arguments) = split_command(command);
        if header.is_empty() || has_placeholders(header) {
            return;
        }
        let Some(definition) = self.index.lookup(header) else {
            sink.push(Diagnostic::warning(
                &step.id,
                format!("unknown command header '{}'", header),
            ));
            return;
        };

        let query = is_query(header);
        if query && !definition.command_type.allows_query() {
            sink.push(Diagnostic::warning(
                &step.id,
                format!("'{}' has no query form", definition.header),
            ));
        }
        if !query && !definition.command_type.allows_set() {
            sink.push(Diagnostic::warning(
                &step.id,
                format!("'{}' is query-only", definition.header),
            ));
        }
        if query && !expects_response {
            sink.push(Diagnostic::warning(
                &step.id,
                format!("'{}' is a query sent by a write; its response is never read", header),
            ));
        }

        if let Some(family) = family {
            if !definition.applies_to(family) {
                sink.push(Diagnostic::error(
                    &step.id,
                    format!(
                        "'{}' does not apply to {} devices (supported: {})",
                        definition.header,
                        family,
                        definition.families.iter().join(", ")
                    ),
                ));
            }
        }

        if !query {
            self.check_arguments(sink, step, definition, &split_arguments(arguments));
        }
    }

    fn check_arguments(
        &self,
        sink: &mut DiagnosticSink,
        step: &Step,
        definition: &CommandDefinition,
        arguments: &[String],
    ) {
        let required = definition.required_arguments();
        let allowed = definition.arguments.len();
        if arguments.len() < required || arguments.len() > allowed {
            let expected = if required == allowed {
                required.to_string()
            } else {
                format!("{} to {}", required, allowed)
            };
            sink.push(Diagnostic::error(
                &step.id,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    definition.header,
                    expected,
                    arguments.len()
                ),
            ));
            return;
        }

        for (spec, token) in definition.arguments.iter().zip(arguments) {
            if has_placeholders(token) {
                continue;
            }
            if let Some(message) = argument_mismatch(spec, token) {
                sink.push(Diagnostic::error(&step.id, message));
            }
        }
    }
}
