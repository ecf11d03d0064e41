//! Step sequence → Python script.
//!
//! One forward pass in program order. The [`Emitter`] carries the explicit
//! generation context (script writer, variable scopes, device tracker and
//! diagnostics) down through nested bodies; nothing is process-wide.
//!
//! Every script has the same frame:
//!
//! ```text
//! <imports, helpers, session setup>
//! scope = None            # one per connected role
//! result = None           # one per non-loop variable
//! try:
//!     <steps>
//! except Exception as exc:
//!     print(...)
//!     raise
//! finally:
//!     <release every handle>
//!     <session teardown>
//! ```

use crate::backend::{BackendAdapter, BackendKind, CommandCall, ConnectSpec, LiteralRules, PYTHON_LITERALS};
use crate::device::{Connection, ContextIssue, DeviceContextTracker, DeviceFamily};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{CompileError, GenerationError};
use crate::reference::header::{split_arguments, split_command};
use crate::step::{
    ConditionalParams, ConnectParams, CustomCodeParams, FileTransferParams, ForLoopParams,
    MAX_LOOP_EXPANSION, MAX_POLL_ATTEMPTS, PollParams, QueryParams, Step, StepKind, SweepParams,
    WhileLoopParams, WriteParams, clean_context, format_float, keys, poll_attempts, walk_steps,
};
use ahash::AHashMap;
use itertools::Itertools;
use std::collections::BTreeSet;

pub mod options;
pub mod scope;
pub mod serializer;
pub mod writer;

pub use options::{GenerationOptions, LineEnding};
pub use scope::{Scope, sanitize};
pub use serializer::{expression, quote, serialize, serialize_with, string_literal};
pub use writer::ScriptWriter;

/// Target source plus the semantic issues found while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedScript {
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Generates a script for one backend selection.
pub struct Generator<'a> {
    backend: BackendKind,
    options: &'a GenerationOptions,
    declared: Vec<String>,
}

impl<'a> Generator<'a> {
    pub fn new(backend: BackendKind, options: &'a GenerationOptions) -> Self {
        Self {
            backend,
            options,
            declared: Vec::new(),
        }
    }

    /// Variables to initialise even if no step assigns them (e.g. the
    /// non-loop entries of a graph's variable table).
    pub fn with_declared(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.declared.extend(names);
        self
    }

    /// Runs the pass. Fails without output on the first structural or
    /// generation error.
    pub fn generate(&self, steps: &[Step]) -> Result<GeneratedScript, CompileError> {
        tracing::debug!(backend = %self.backend, steps = steps.len(), "generating script");
        self.options.validate()?;
        let plan = Plan::collect(steps, self.backend, &self.declared);

        let mut emitter = Emitter {
            options: self.options,
            default_backend: self.backend,
            writer: ScriptWriter::new(),
            scope: Scope::new(),
            tracker: DeviceContextTracker::new(),
            sink: DiagnosticSink::new(),
            handles: AHashMap::new(),
        };
        emitter.prologue(&plan);
        emitter.writer.line("try:");
        emitter.block(steps)?;
        emitter.epilogue(&plan);

        let diagnostics = emitter.sink.into_vec();
        tracing::debug!(
            lines = emitter.writer.len(),
            diagnostics = diagnostics.len(),
            "script generated"
        );
        Ok(GeneratedScript {
            source: emitter.writer.finish(self.options.line_ending),
            diagnostics,
        })
    }
}

/// What the script frame needs to know before the walk starts.
struct Plan {
    /// Connected roles in first-connect order, with the backend of that connect.
    roles: Vec<(String, BackendKind)>,
    /// Non-loop variables in first-use order.
    globals: Vec<String>,
    backends: BTreeSet<BackendKind>,
}

impl Plan {
    fn collect(steps: &[Step], default: BackendKind, declared: &[String]) -> Self {
        let mut plan = Plan {
            roles: Vec::new(),
            globals: Vec::new(),
            backends: BTreeSet::new(),
        };
        for name in declared {
            plan.add_global(name);
        }
        walk_steps(steps, &mut |step| match &step.kind {
            StepKind::Connect(p) => {
                let role = clean_context(&p.role);
                let backend = p.backend.unwrap_or(default);
                if !plan.roles.iter().any(|(r, _)| r == role) {
                    plan.roles.push((role.to_string(), backend));
                }
                plan.backends.insert(backend);
            }
            StepKind::SetVariable(p) => plan.add_global(&p.variable),
            StepKind::GetVariable(p) => plan.add_global(&p.variable),
            StepKind::Query(QueryParams {
                result: Some(name), ..
            }) => plan.add_global(name),
            _ => {}
        });
        if plan.backends.is_empty() {
            plan.backends.insert(default);
        }
        plan
    }

    fn add_global(&mut self, name: &str) {
        if !self.globals.iter().any(|g| g == name) {
            self.globals.push(name.to_string());
        }
    }

    fn adapters(&self) -> impl DoubleEndedIterator<Item = &'static dyn BackendAdapter> + '_ {
        self.backends.iter().map(|b| b.adapter())
    }
}

/// A command split and serialized for one adapter's literal rules.
struct Prepared {
    literal: String,
    header: String,
    arguments: Vec<String>,
}

impl Prepared {
    fn call<'a>(&'a self, raw: &'a str) -> CommandCall<'a> {
        CommandCall {
            raw,
            literal: &self.literal,
            header: &self.header,
            arguments: &self.arguments,
        }
    }
}

fn missing(adapter: &dyn BackendAdapter, operation: &str, step: &Step) -> CompileError {
    GenerationError::MissingTemplate {
        backend: adapter.kind().to_string(),
        operation: operation.to_string(),
        step_id: step.id.clone(),
    }
    .into()
}

/// `range(...)` for integral bounds, an explicit list otherwise. The upper
/// bound is inclusive.
fn for_iterable(step: &Step, params: &ForLoopParams) -> Result<String, CompileError> {
    if params.is_integral() {
        let (start, end, stride) = (
            params.start.value() as i64,
            params.end.value() as i64,
            params.step.value() as i64,
        );
        let stop = if stride > 0 { end + 1 } else { end - 1 };
        return Ok(if stride == 1 {
            format!("range({}, {})", start, stop)
        } else {
            format!("range({}, {}, {})", start, stop, stride)
        });
    }
    let count = params
        .expanded_count()
        .ok_or_else(|| CompileError::InvalidField {
            element_id: step.id.clone(),
            field: keys::END.to_string(),
            message: format!("loop spans more than {} iterations", MAX_LOOP_EXPANSION),
        })?;
    Ok(format!(
        "[round({} + _n * {}, 12) for _n in range({})]",
        params.start, params.step, count
    ))
}

fn sweep_iterable(params: &SweepParams) -> String {
    if params.points <= 1 {
        return format!("[{}]", params.start);
    }
    let delta = (params.stop.value() - params.start.value()) / f64::from(params.points - 1);
    format!(
        "[round({} + _k * {}, 12) for _k in range({})]",
        params.start,
        format_float(delta),
        params.points
    )
}

struct Emitter<'a> {
    options: &'a GenerationOptions,
    default_backend: BackendKind,
    writer: ScriptWriter,
    scope: Scope,
    tracker: DeviceContextTracker,
    sink: DiagnosticSink,
    /// Role → handle identifier, stable across reconnects.
    handles: AHashMap<String, String>,
}

impl Emitter<'_> {
    fn prologue(&mut self, plan: &Plan) {
        if self.options.header_comment {
            self.writer
                .line("# Generated by stepforge. Edit the procedure, not this file.");
            self.writer.line(format!(
                "# Backend: {}",
                plan.backends.iter().map(BackendKind::as_str).join(", ")
            ));
            self.writer.blank();
        }

        let imports: Vec<String> = std::iter::once("import time".to_string())
            .chain(plan.adapters().flat_map(|a| a.imports()))
            .unique()
            .collect();
        self.writer.lines(imports);
        self.writer.blank();

        for adapter in plan.adapters() {
            let helpers = adapter.helpers();
            if !helpers.is_empty() {
                self.writer.blank();
                self.writer.lines(helpers);
                self.writer.blank();
            }
        }

        for adapter in plan.adapters() {
            self.writer.lines(adapter.session_setup());
        }
        for (role, _) in &plan.roles {
            let handle = self.scope.fresh(&sanitize(role));
            self.writer.line(format!("{} = None", handle));
            self.handles.insert(role.clone(), handle);
        }
        for name in &plan.globals {
            let ident = self.scope.declare(name);
            self.writer.line(format!("{} = None", ident));
        }
        self.writer.blank();
    }

    fn epilogue(&mut self, plan: &Plan) {
        self.writer.line("except Exception as exc:");
        self.writer.line("    print(f\"Procedure failed: {exc}\")");
        self.writer.line("    raise");
        self.writer.line("finally:");
        self.writer.indent();
        let before = self.writer.len();
        for (role, backend) in &plan.roles {
            if let Some(handle) = self.handles.get(role) {
                self.writer.lines(backend.adapter().release(handle));
            }
        }
        for adapter in plan.adapters().rev() {
            self.writer.lines(adapter.session_teardown());
        }
        if self.writer.len() == before {
            self.writer.line("pass");
        }
        self.writer.dedent();
    }

    /// Emits `steps` one level deeper, with `pass` for an empty body.
    fn block(&mut self, steps: &[Step]) -> Result<(), CompileError> {
        self.writer.indent();
        let before = self.writer.len();
        for step in steps {
            self.step(step)?;
        }
        if self.writer.len() == before {
            self.writer.line("pass");
        }
        self.writer.dedent();
        Ok(())
    }

    fn step(&mut self, step: &Step) -> Result<(), CompileError> {
        tracing::trace!(step = %step.id, kind = %step.kind_tag(), "emitting step");
        match &step.kind {
            StepKind::Connect(p) => self.connect(step, p),
            StepKind::Disconnect(p) => self.disconnect(step, &p.role),
            StepKind::Write(p) => self.write(step, p),
            StepKind::Query(p) => self.query(step, p),
            StepKind::ForLoop { params, body } => {
                let iterable = for_iterable(step, params)?;
                self.loop_over(&params.variable, &iterable, body)
            }
            StepKind::Sweep { params, body } => {
                let iterable = sweep_iterable(params);
                self.loop_over(&params.variable, &iterable, body)
            }
            StepKind::WhileLoop { params, body } => self.while_loop(params, body),
            StepKind::Conditional {
                params,
                then_body,
                else_body,
            } => self.conditional(params, then_body, else_body),
            StepKind::SetVariable(p) => {
                let ident = self.scope.resolve(&p.variable);
                let scope = &self.scope;
                let value = serialize_with(&p.value, &PYTHON_LITERALS, &|e| scope.rewrite(e))
                    .unwrap_or_else(|| PYTHON_LITERALS.null_literal.to_string());
                self.writer.line(format!("{} = {}", ident, value));
                Ok(())
            }
            StepKind::GetVariable(p) => {
                let ident = self.scope.resolve(&p.variable);
                self.writer.line(format!("print({})", ident));
                Ok(())
            }
            StepKind::Wait(p) => {
                self.writer.line(format!("time.sleep({})", p.seconds));
                Ok(())
            }
            StepKind::CustomCode(p) => {
                self.custom_code(p);
                Ok(())
            }
            StepKind::Poll(p) => self.poll(step, p),
            StepKind::FileTransfer(p) => self.file_transfer(step, p),
        }
    }

    fn handle(&mut self, role: &str) -> String {
        if let Some(handle) = self.handles.get(role) {
            return handle.clone();
        }
        let handle = self.scope.fresh(&sanitize(role));
        self.handles.insert(role.to_string(), handle.clone());
        handle
    }

    /// Resolves the connection a step targets, reporting context issues.
    fn target(&mut self, step: &Step, command: Option<&str>) -> Option<Connection> {
        let resolution = self.tracker.resolve(step.context(), command);
        for issue in resolution.issues {
            let diagnostic = if issue.is_error() {
                Diagnostic::error(&step.id, issue.to_string())
            } else {
                Diagnostic::warning(&step.id, issue.to_string())
            };
            self.sink.push(diagnostic);
        }
        if resolution.connection.is_none() {
            let message = format!("step '{}' has no active device connection", step.id);
            self.writer.line(format!(
                "raise RuntimeError({})",
                quote(&message, &PYTHON_LITERALS)
            ));
        }
        resolution.connection
    }

    fn prepare(&self, raw: &str, rules: &LiteralRules) -> Prepared {
        let scope = &self.scope;
        let rewrite = |e: &str| scope.rewrite(e);
        let (header, arguments) = split_command(raw);
        Prepared {
            literal: string_literal(raw, rules, &rewrite),
            header: header.to_string(),
            arguments: split_arguments(arguments)
                .iter()
                .filter_map(|arg| serialize_with(arg, rules, &rewrite))
                .collect(),
        }
    }

    fn connect(&mut self, step: &Step, p: &ConnectParams) -> Result<(), CompileError> {
        let role = clean_context(&p.role).to_string();
        let backend = p.backend.unwrap_or(self.default_backend);
        let adapter = backend.adapter();
        let family = p
            .family
            .or_else(|| DeviceFamily::from_name(&role))
            .unwrap_or(DeviceFamily::Scope);
        let handle = self.handle(&role);

        if let Some(previous) = self.tracker.get(&role) {
            let release = previous.backend.adapter().release(&previous.handle);
            self.writer.lines(release);
        }

        let scope = &self.scope;
        let host_literal = string_literal(&p.host, &adapter.literal_rules(), &|e| scope.rewrite(e));
        let spec = ConnectSpec {
            handle: &handle,
            role: &role,
            host: &p.host,
            host_literal: &host_literal,
            port: p.port,
            family,
            timeout_ms: p.timeout_ms.unwrap_or(self.options.default_timeout_ms),
        };
        let lines = adapter
            .connect(&spec)
            .ok_or_else(|| missing(adapter, "connect", step))?;
        self.writer.lines(lines);

        tracing::debug!(role = %role, backend = %backend, family = %family, "connection opened");
        self.tracker.connect(Connection {
            role,
            handle,
            backend,
            family,
        });
        Ok(())
    }

    fn disconnect(&mut self, step: &Step, role: &str) -> Result<(), CompileError> {
        let role = clean_context(role);
        let Some(connection) = self.tracker.disconnect(role) else {
            let issue = ContextIssue::InactiveRole {
                role: role.to_string(),
            };
            self.sink.push(Diagnostic::error(&step.id, issue.to_string()));
            return Ok(());
        };
        let adapter = connection.backend.adapter();
        let lines = adapter
            .disconnect(&connection.handle)
            .ok_or_else(|| missing(adapter, "disconnect", step))?;
        self.writer.lines(lines);
        self.writer.line(format!("{} = None", connection.handle));
        Ok(())
    }

    fn write(&mut self, step: &Step, p: &WriteParams) -> Result<(), CompileError> {
        let Some(connection) = self.target(step, Some(&p.command)) else {
            return Ok(());
        };
        let adapter = connection.backend.adapter();
        let prepared = self.prepare(&p.command, &adapter.literal_rules());
        let lines = adapter
            .write(&connection.handle, &prepared.call(&p.command))
            .ok_or_else(|| missing(adapter, "write", step))?;
        self.writer.lines(lines);

        if p.await_completion == Some(true) {
            let timeout_s = self.options.default_timeout_ms as f64 / 1000.0;
            let lines = adapter
                .await_completion(&connection.handle, timeout_s, self.options.poll_interval_s)
                .ok_or_else(|| missing(adapter, "await_completion", step))?;
            self.writer.lines(lines);
        }
        Ok(())
    }

    fn query(&mut self, step: &Step, p: &QueryParams) -> Result<(), CompileError> {
        let Some(connection) = self.target(step, Some(&p.command)) else {
            return Ok(());
        };
        let binding = p.result.as_deref().map(|name| self.scope.resolve(name));
        let adapter = connection.backend.adapter();
        let prepared = self.prepare(&p.command, &adapter.literal_rules());
        let lines = adapter
            .query(&connection.handle, &prepared.call(&p.command), binding.as_deref())
            .ok_or_else(|| missing(adapter, "query", step))?;
        self.writer.lines(lines);
        Ok(())
    }

    fn loop_over(&mut self, variable: &str, iterable: &str, body: &[Step]) -> Result<(), CompileError> {
        let ident = self.scope.push_loop(variable);
        self.writer.line(format!("for {} in {}:", ident, iterable));
        let emitted = self.block(body);
        self.scope.pop_loop();
        emitted
    }

    fn condition(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return PYTHON_LITERALS.false_literal.to_string();
        }
        let scope = &self.scope;
        expression(raw, &|e| scope.rewrite(e))
    }

    fn while_loop(&mut self, params: &WhileLoopParams, body: &[Step]) -> Result<(), CompileError> {
        let condition = self.condition(&params.condition);
        let Some(max) = params.max_iterations else {
            self.writer.line(format!("while {}:", condition));
            return self.block(body);
        };

        let guard = self.scope.fresh("_guard");
        self.writer.line(format!("{} = 0", guard));
        self.writer
            .line(format!("while ({}) and {} < {}:", condition, guard, max));
        self.writer.indent();
        self.writer.line(format!("{} += 1", guard));
        for step in body {
            self.step(step)?;
        }
        self.writer.dedent();
        Ok(())
    }

    fn conditional(
        &mut self,
        params: &ConditionalParams,
        then_body: &[Step],
        else_body: &[Step],
    ) -> Result<(), CompileError> {
        let condition = self.condition(&params.condition);
        self.writer.line(format!("if {}:", condition));
        self.block(then_body)?;
        if !else_body.is_empty() {
            self.writer.line("else:");
            self.block(else_body)?;
        }
        Ok(())
    }

    /// Re-indents a snippet to the current level, keeping its inner structure.
    fn custom_code(&mut self, p: &CustomCodeParams) {
        let margin = p
            .code
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
            .min()
            .unwrap_or(0);
        let lines: Vec<String> = p
            .code
            .lines()
            .map(|l| {
                if l.trim().is_empty() {
                    String::new()
                } else {
                    self.scope.rewrite(&l[margin..])
                }
            })
            .collect();
        self.writer.lines(lines);
    }

    /// Bounded status polling: success breaks out, failure raises, recoverable
    /// states run the recovery command, and both a deadline and an attempt
    /// cap end the loop.
    fn poll(&mut self, step: &Step, p: &PollParams) -> Result<(), CompileError> {
        let Some(connection) = self.target(step, Some(&p.query)) else {
            return Ok(());
        };
        let adapter = connection.backend.adapter();
        let rules = adapter.literal_rules();
        let handle = connection.handle.as_str();

        let interval = p
            .interval_s
            .as_ref()
            .map(|n| n.value())
            .unwrap_or(self.options.poll_interval_s);
        let timeout = p
            .timeout_s
            .as_ref()
            .map(|n| n.value())
            .unwrap_or(self.options.poll_timeout_s);
        let attempts =
            poll_attempts(timeout, interval).ok_or_else(|| CompileError::InvalidField {
                element_id: step.id.clone(),
                field: keys::INTERVAL_S.to_string(),
                message: format!("polling would exceed {} attempts", MAX_POLL_ATTEMPTS),
            })?;

        let query = self.prepare(&p.query, &rules);
        let status = adapter
            .status_query(handle, &query.call(&p.query), "_status")
            .ok_or_else(|| missing(adapter, "status_query", step))?;
        let recovery = match &p.recovery_command {
            Some(command) if !p.recoverable_states.is_empty() => {
                let prepared = self.prepare(command, &rules);
                Some(
                    adapter
                        .write(handle, &prepared.call(command))
                        .ok_or_else(|| missing(adapter, "write", step))?,
                )
            }
            _ => None,
        };

        let states = |list: &[String]| {
            format!(
                "({},)",
                list.iter()
                    .map(|s| quote(&s.trim().to_ascii_uppercase(), &rules))
                    .join(", ")
            )
        };
        let timeout_message = quote(
            &format!(
                "{} did not report {} within {} s",
                p.query.trim(),
                p.success_states.iter().join("/"),
                format_float(timeout)
            ),
            &rules,
        );

        let w = &mut self.writer;
        w.line(format!(
            "_deadline = time.monotonic() + {}",
            format_float(timeout)
        ));
        w.line(format!("for _attempt in range({}):", attempts));
        w.indent();
        w.lines(status);
        w.line("_status = str(_status).strip().upper()");
        w.line(format!("if _status in {}:", states(&p.success_states)));
        w.line("    break");
        if !p.failure_states.is_empty() {
            w.line(format!("if _status in {}:", states(&p.failure_states)));
            w.line(format!(
                "    raise RuntimeError(f\"{} reported {{_status}}\")",
                connection.role.replace(['"', '\\', '{', '}'], "")
            ));
        }
        if !p.recoverable_states.is_empty() {
            w.line(format!("if _status in {}:", states(&p.recoverable_states)));
            w.indent();
            match recovery {
                Some(lines) => w.lines(lines),
                None => w.line("pass"),
            }
            w.dedent();
        }
        w.line("if time.monotonic() > _deadline:");
        w.line(format!("    raise TimeoutError({})", timeout_message));
        w.line(format!("time.sleep({})", format_float(interval)));
        w.dedent();
        w.line("else:");
        w.line(format!("    raise TimeoutError({})", timeout_message));
        Ok(())
    }

    /// Binary retrieval under an extended timeout that is restored on every
    /// path. The read is followed by a time-based settle wait, never by a text
    /// read on the same channel.
    fn file_transfer(&mut self, step: &Step, p: &FileTransferParams) -> Result<(), CompileError> {
        let Some(connection) = self.target(step, None) else {
            return Ok(());
        };
        let adapter = connection.backend.adapter();
        let rules = adapter.literal_rules();
        let handle = connection.handle.as_str();
        let transfer_ms = p.timeout_ms.unwrap_or(self.options.transfer_timeout_ms);

        let timeout_attribute = adapter
            .timeout_attribute(handle)
            .ok_or_else(|| missing(adapter, "file_transfer", step))?;

        if let Some(save) = p.save_command.as_deref().filter(|c| !c.trim().is_empty()) {
            let prepared = self.prepare(save, &rules);
            let lines = adapter
                .write(handle, &prepared.call(save))
                .ok_or_else(|| missing(adapter, "write", step))?;
            self.writer.lines(lines);
            let lines = adapter
                .await_completion(handle, transfer_ms as f64 / 1000.0, self.options.poll_interval_s)
                .ok_or_else(|| missing(adapter, "await_completion", step))?;
            self.writer.lines(lines);
        }

        let read_command = format!("FILESystem:READFile \"{}\"", p.remote_path.trim());
        let prepared = self.prepare(&read_command, &rules);
        let read = adapter
            .read_binary(handle, &prepared.call(&read_command), "_data")
            .ok_or_else(|| missing(adapter, "read_binary", step))?;

        let cleanup = if p.cleanup == Some(true) {
            let delete_command = format!("FILESystem:DELEte \"{}\"", p.remote_path.trim());
            let prepared = self.prepare(&delete_command, &rules);
            Some(
                adapter
                    .write(handle, &prepared.call(&delete_command))
                    .ok_or_else(|| missing(adapter, "write", step))?,
            )
        } else {
            None
        };

        let scope = &self.scope;
        let local = string_literal(&p.local_path, &rules, &|e| scope.rewrite(e));

        let w = &mut self.writer;
        w.line(format!("_previous_timeout = {}", timeout_attribute));
        w.line(format!("{} = {}", timeout_attribute, transfer_ms));
        w.line("try:");
        w.indent();
        w.lines(read);
        w.dedent();
        w.line("finally:");
        w.line(format!("    {} = _previous_timeout", timeout_attribute));
        w.line(format!("with open({}, \"wb\") as _file:", local));
        w.line("    _file.write(_data)");
        w.line(format!("time.sleep({})", format_float(self.options.settle_seconds)));
        if let Some(lines) = cleanup {
            w.lines(lines);
        }
        Ok(())
    }
}
