use super::fields::{FieldType, Presence, keys};
use super::kind::Kind;
use crate::backend::BackendKind;
use crate::device::DeviceFamily;
use crate::error::CompileError;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;

/// Field key → raw string value, as stored on graph nodes.
pub type FieldMap = BTreeMap<String, String>;

/// A numeric parameter that remembers the text it was written as, so that
/// re-importing a program reproduces field values exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    value: f64,
    text: String,
}

impl Number {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let value: f64 = text.parse().ok()?;
        value.is_finite().then(|| Self {
            value,
            text: text.to_string(),
        })
    }

    pub fn from_f64(value: f64) -> Self {
        Self {
            value,
            text: format_float(value),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_integral(&self) -> bool {
        self.value.fract() == 0.0 && self.value.abs() < 1e15
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Shortest text for a float that still reads back as the same number.
pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// One canonical unit of the compiled program.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    /// Fields outside the kind's schema. Generation ignores them; both
    /// serialized forms carry them through unchanged.
    pub extra: FieldMap,
    /// Starts a new top-level statement chain in the graph form. Program order
    /// is unaffected, and the flag means nothing inside a body.
    pub detached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Connect(ConnectParams),
    Disconnect(DisconnectParams),
    Write(WriteParams),
    Query(QueryParams),
    ForLoop {
        params: ForLoopParams,
        body: Vec<Step>,
    },
    WhileLoop {
        params: WhileLoopParams,
        body: Vec<Step>,
    },
    Conditional {
        params: ConditionalParams,
        then_body: Vec<Step>,
        else_body: Vec<Step>,
    },
    SetVariable(SetVariableParams),
    GetVariable(GetVariableParams),
    Wait(WaitParams),
    CustomCode(CustomCodeParams),
    Sweep {
        params: SweepParams,
        body: Vec<Step>,
    },
    Poll(PollParams),
    FileTransfer(FileTransferParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub role: String,
    pub host: String,
    pub port: Option<u16>,
    /// Overrides the run's backend for this connection (hybrid scripts).
    pub backend: Option<BackendKind>,
    /// Overrides the family inferred from the role name.
    pub family: Option<DeviceFamily>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectParams {
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteParams {
    pub command: String,
    pub context: Option<String>,
    pub await_completion: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub command: String,
    pub context: Option<String>,
    /// Name of the variable the response is bound to.
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoopParams {
    pub variable: String,
    pub start: Number,
    /// Inclusive upper (or lower, for negative steps) bound.
    pub end: Number,
    pub step: Number,
}

/// Longest iteration list a for-loop with fractional bounds may expand to.
pub const MAX_LOOP_EXPANSION: u64 = 1_000_000;

/// Most status queries a single poll step may issue.
pub const MAX_POLL_ATTEMPTS: u64 = 1_000_000;

impl ForLoopParams {
    /// Whole-number bounds and step, emitted as a lazy `range`.
    pub fn is_integral(&self) -> bool {
        self.start.is_integral() && self.end.is_integral() && self.step.is_integral()
    }

    /// Number of iterations once expanded into an explicit list, or `None`
    /// past [`MAX_LOOP_EXPANSION`].
    pub fn expanded_count(&self) -> Option<u64> {
        let span = (self.end.value() - self.start.value()) / self.step.value();
        if !span.is_finite() {
            return None;
        }
        if span < 0.0 {
            return Some(0);
        }
        let whole = (span + 1e-9).floor();
        if whole >= MAX_LOOP_EXPANSION as f64 {
            return None;
        }
        Some(whole as u64 + 1)
    }
}

/// Attempts a poll gets within `timeout_s` at one query per `interval_s`,
/// plus a final one at the deadline. `None` past [`MAX_POLL_ATTEMPTS`].
pub fn poll_attempts(timeout_s: f64, interval_s: f64) -> Option<u64> {
    let ratio = (timeout_s / interval_s).ceil();
    if !ratio.is_finite() || ratio < 0.0 || ratio >= MAX_POLL_ATTEMPTS as f64 {
        return None;
    }
    Some(ratio as u64 + 1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoopParams {
    pub condition: String,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalParams {
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetVariableParams {
    pub variable: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetVariableParams {
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitParams {
    pub seconds: Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomCodeParams {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepParams {
    pub variable: String,
    pub start: Number,
    pub stop: Number,
    pub points: u32,
}

/// A bounded status-polling state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct PollParams {
    pub context: Option<String>,
    pub query: String,
    pub success_states: Vec<String>,
    pub recoverable_states: Vec<String>,
    pub recovery_command: Option<String>,
    pub failure_states: Vec<String>,
    pub interval_s: Option<Number>,
    pub timeout_s: Option<Number>,
}

/// Binary file retrieval from an instrument's file system.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTransferParams {
    pub context: Option<String>,
    pub remote_path: String,
    pub local_path: String,
    /// Command that produces the file (e.g. `SAVE:IMAGe "..."`), awaited before the read.
    pub save_command: Option<String>,
    pub timeout_ms: Option<u64>,
    pub cleanup: Option<bool>,
}

/// Nested bodies handed to [`StepKind::from_fields`] for container kinds.
#[derive(Debug, Default)]
pub struct Bodies {
    pub body: Vec<Step>,
    pub else_body: Vec<Step>,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            extra: FieldMap::new(),
            detached: false,
        }
    }

    pub fn with_extra(mut self, extra: FieldMap) -> Self {
        self.extra = extra;
        self
    }

    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Schema fields followed by the carried-through extras.
    pub fn all_fields(&self) -> FieldMap {
        let mut fields = self.kind.to_fields();
        for (key, value) in &self.extra {
            fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
        fields
    }

    pub fn kind_tag(&self) -> Kind {
        self.kind.kind_tag()
    }

    /// The raw SCPI command text this step sends, if any.
    pub fn command(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Write(p) => Some(&p.command),
            StepKind::Query(p) => Some(&p.command),
            StepKind::Poll(p) => Some(&p.query),
            _ => None,
        }
    }

    /// The explicitly declared device context, if any.
    pub fn context(&self) -> Option<&str> {
        let context = match &self.kind {
            StepKind::Write(p) => p.context.as_deref(),
            StepKind::Query(p) => p.context.as_deref(),
            StepKind::Poll(p) => p.context.as_deref(),
            StepKind::FileTransfer(p) => p.context.as_deref(),
            _ => None,
        };
        context.map(clean_context).filter(|c| !c.is_empty())
    }

    /// Nested bodies in program order.
    pub fn bodies(&self) -> Vec<&[Step]> {
        match &self.kind {
            StepKind::ForLoop { body, .. }
            | StepKind::WhileLoop { body, .. }
            | StepKind::Sweep { body, .. } => vec![body.as_slice()],
            StepKind::Conditional {
                then_body,
                else_body,
                ..
            } => vec![then_body.as_slice(), else_body.as_slice()],
            _ => vec![],
        }
    }

    /// Display names of every variable this step references directly.
    pub fn variable_refs(&self) -> Vec<&str> {
        match &self.kind {
            StepKind::ForLoop { params, .. } => vec![params.variable.as_str()],
            StepKind::Sweep { params, .. } => vec![params.variable.as_str()],
            StepKind::SetVariable(p) => vec![p.variable.as_str()],
            StepKind::GetVariable(p) => vec![p.variable.as_str()],
            StepKind::Query(p) => p.result.as_deref().into_iter().collect(),
            _ => vec![],
        }
    }
}

/// The entries of `fields` that `kind`'s schema does not name.
pub fn extra_fields(kind: Kind, fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .filter(|(key, _)| kind.field(key).is_none())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Editors wrap contexts in parentheses, e.g. `(scope)`.
pub fn clean_context(raw: &str) -> &str {
    raw.trim().trim_start_matches('(').trim_end_matches(')').trim()
}

/// Depth-first, program-order traversal of a step sequence.
pub fn walk_steps<'a>(steps: &'a [Step], visit: &mut impl FnMut(&'a Step)) {
    for step in steps {
        visit(step);
        for body in step.bodies() {
            walk_steps(body, visit);
        }
    }
}

/// Reads typed parameters out of a field map, applying schema defaults in lenient mode.
struct FieldReader<'a> {
    element_id: &'a str,
    kind: Kind,
    fields: &'a FieldMap,
    lenient: bool,
}

impl<'a> FieldReader<'a> {
    fn raw(&self, key: &str) -> Result<Option<&'a str>, CompileError> {
        if let Some(value) = self.fields.get(key) {
            return Ok(Some(value.as_str()));
        }
        let spec = self.kind.field(key);
        match spec.map(|s| (s.presence, s.variable)) {
            Some((Presence::Required(default), false)) if self.lenient => Ok(Some(default)),
            Some((Presence::Required(_), _)) => Err(CompileError::MissingField {
                element_id: self.element_id.to_string(),
                field: key.to_string(),
            }),
            _ => Ok(None),
        }
    }

    fn invalid(&self, key: &str, message: impl Into<String>) -> CompileError {
        CompileError::InvalidField {
            element_id: self.element_id.to_string(),
            field: key.to_string(),
            message: message.into(),
        }
    }

    fn text(&self, key: &str) -> Result<String, CompileError> {
        Ok(self.raw(key)?.unwrap_or_default().to_string())
    }

    fn opt_text(&self, key: &str) -> Result<Option<String>, CompileError> {
        Ok(self.raw(key)?.map(str::to_string))
    }

    fn opt_number(&self, key: &str) -> Result<Option<Number>, CompileError> {
        self.raw(key)?
            .map(|raw| {
                Number::parse(raw)
                    .ok_or_else(|| self.invalid(key, format!("'{}' is not a number", raw)))
            })
            .transpose()
    }

    fn number(&self, key: &str) -> Result<Number, CompileError> {
        self.opt_number(key)?
            .ok_or_else(|| self.invalid(key, "a number is required"))
    }

    fn opt_integer<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, CompileError> {
        self.raw(key)?
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|_| {
                    self.invalid(key, format!("'{}' is not a non-negative integer", raw))
                })
            })
            .transpose()
    }

    fn opt_bool(&self, key: &str) -> Result<Option<bool>, CompileError> {
        self.raw(key)?
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(self.invalid(key, format!("'{}' is not a boolean", raw))),
            })
            .transpose()
    }

    fn list(&self, key: &str) -> Result<Vec<String>, CompileError> {
        Ok(self.raw(key)?.map(split_list).unwrap_or_default())
    }

    fn variable(&self, key: &str) -> Result<String, CompileError> {
        let name = self.text(key)?;
        if name.trim().is_empty() {
            return Err(CompileError::MissingField {
                element_id: self.element_id.to_string(),
                field: key.to_string(),
            });
        }
        Ok(name)
    }

    fn opt_variable(&self, key: &str) -> Result<Option<String>, CompileError> {
        Ok(self.opt_text(key)?.filter(|name| !name.trim().is_empty()))
    }
}

/// Splits a comma-separated list, dropping empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl StepKind {
    pub fn kind_tag(&self) -> Kind {
        match self {
            StepKind::Connect(_) => Kind::Connect,
            StepKind::Disconnect(_) => Kind::Disconnect,
            StepKind::Write(_) => Kind::Write,
            StepKind::Query(_) => Kind::Query,
            StepKind::ForLoop { .. } => Kind::ForLoop,
            StepKind::WhileLoop { .. } => Kind::WhileLoop,
            StepKind::Conditional { .. } => Kind::Conditional,
            StepKind::SetVariable(_) => Kind::SetVariable,
            StepKind::GetVariable(_) => Kind::GetVariable,
            StepKind::Wait(_) => Kind::Wait,
            StepKind::CustomCode(_) => Kind::CustomCode,
            StepKind::Sweep { .. } => Kind::Sweep,
            StepKind::Poll(_) => Kind::Poll,
            StepKind::FileTransfer(_) => Kind::FileTransfer,
        }
    }

    /// Builds typed parameters from raw fields.
    ///
    /// In lenient mode (graph translation) missing required fields take their schema
    /// default; in strict mode (Step form) they are a structural error. Missing
    /// variable references are an error in both modes.
    pub fn from_fields(
        kind: Kind,
        element_id: &str,
        fields: &FieldMap,
        bodies: Bodies,
        lenient: bool,
    ) -> Result<StepKind, CompileError> {
        let r = FieldReader {
            element_id,
            kind,
            fields,
            lenient,
        };
        let Bodies { body, else_body } = bodies;

        let step = match kind {
            Kind::Connect => {
                let backend = r
                    .opt_text(keys::BACKEND)?
                    .map(|name| {
                        BackendKind::from_name(&name).ok_or_else(|| {
                            r.invalid(keys::BACKEND, format!("unknown backend '{}'", name))
                        })
                    })
                    .transpose()?;
                let family = r
                    .opt_text(keys::FAMILY)?
                    .map(|name| {
                        DeviceFamily::from_name(&name).ok_or_else(|| {
                            r.invalid(keys::FAMILY, format!("unknown device family '{}'", name))
                        })
                    })
                    .transpose()?;
                StepKind::Connect(ConnectParams {
                    role: r.text(keys::ROLE)?,
                    host: r.text(keys::HOST)?,
                    port: r.opt_integer(keys::PORT)?,
                    backend,
                    family,
                    timeout_ms: r.opt_integer(keys::TIMEOUT_MS)?,
                })
            }
            Kind::Disconnect => StepKind::Disconnect(DisconnectParams {
                role: r.text(keys::ROLE)?,
            }),
            Kind::Write => StepKind::Write(WriteParams {
                command: r.text(keys::COMMAND)?,
                context: r.opt_text(keys::CONTEXT)?,
                await_completion: r.opt_bool(keys::AWAIT_COMPLETION)?,
            }),
            Kind::Query => StepKind::Query(QueryParams {
                command: r.text(keys::COMMAND)?,
                context: r.opt_text(keys::CONTEXT)?,
                result: r.opt_variable(keys::RESULT)?,
            }),
            Kind::ForLoop => {
                let params = ForLoopParams {
                    variable: r.variable(keys::VARIABLE)?,
                    start: r.number(keys::START)?,
                    end: r.number(keys::END)?,
                    step: r.number(keys::STEP)?,
                };
                if params.step.value() == 0.0 {
                    return Err(r.invalid(keys::STEP, "loop step must be non-zero"));
                }
                if !params.is_integral() && params.expanded_count().is_none() {
                    return Err(r.invalid(
                        keys::END,
                        format!("loop spans more than {} iterations", MAX_LOOP_EXPANSION),
                    ));
                }
                StepKind::ForLoop { params, body }
            }
            Kind::WhileLoop => StepKind::WhileLoop {
                params: WhileLoopParams {
                    condition: r.text(keys::CONDITION)?,
                    max_iterations: r.opt_integer(keys::MAX_ITERATIONS)?,
                },
                body,
            },
            Kind::Conditional => StepKind::Conditional {
                params: ConditionalParams {
                    condition: r.text(keys::CONDITION)?,
                },
                then_body: body,
                else_body,
            },
            Kind::SetVariable => StepKind::SetVariable(SetVariableParams {
                variable: r.variable(keys::VARIABLE)?,
                value: r.text(keys::VALUE)?,
            }),
            Kind::GetVariable => StepKind::GetVariable(GetVariableParams {
                variable: r.variable(keys::VARIABLE)?,
            }),
            Kind::Wait => {
                let seconds = r.number(keys::SECONDS)?;
                if seconds.value() < 0.0 {
                    return Err(r.invalid(keys::SECONDS, "wait time cannot be negative"));
                }
                StepKind::Wait(WaitParams { seconds })
            }
            Kind::CustomCode => StepKind::CustomCode(CustomCodeParams {
                code: r.text(keys::CODE)?,
            }),
            Kind::Sweep => {
                let points: u32 = r
                    .opt_integer(keys::POINTS)?
                    .ok_or_else(|| r.invalid(keys::POINTS, "a point count is required"))?;
                if points == 0 {
                    return Err(r.invalid(keys::POINTS, "a sweep needs at least one point"));
                }
                StepKind::Sweep {
                    params: SweepParams {
                        variable: r.variable(keys::VARIABLE)?,
                        start: r.number(keys::START)?,
                        stop: r.number(keys::STOP)?,
                        points,
                    },
                    body,
                }
            }
            Kind::Poll => {
                let params = PollParams {
                    context: r.opt_text(keys::CONTEXT)?,
                    query: r.text(keys::QUERY)?,
                    success_states: r.list(keys::SUCCESS_STATES)?,
                    recoverable_states: r.list(keys::RECOVERABLE_STATES)?,
                    recovery_command: r.opt_text(keys::RECOVERY_COMMAND)?,
                    failure_states: r.list(keys::FAILURE_STATES)?,
                    interval_s: r.opt_number(keys::INTERVAL_S)?,
                    timeout_s: r.opt_number(keys::TIMEOUT_S)?,
                };
                if params.success_states.is_empty() {
                    return Err(r.invalid(keys::SUCCESS_STATES, "at least one state is required"));
                }
                if params.interval_s.as_ref().is_some_and(|n| n.value() <= 0.0) {
                    return Err(r.invalid(keys::INTERVAL_S, "interval must be positive"));
                }
                if params.timeout_s.as_ref().is_some_and(|n| n.value() <= 0.0) {
                    return Err(r.invalid(keys::TIMEOUT_S, "timeout must be positive"));
                }
                if let (Some(interval), Some(timeout)) = (&params.interval_s, &params.timeout_s) {
                    if poll_attempts(timeout.value(), interval.value()).is_none() {
                        return Err(r.invalid(
                            keys::INTERVAL_S,
                            format!("polling would exceed {} attempts", MAX_POLL_ATTEMPTS),
                        ));
                    }
                }
                StepKind::Poll(params)
            }
            Kind::FileTransfer => StepKind::FileTransfer(FileTransferParams {
                context: r.opt_text(keys::CONTEXT)?,
                remote_path: r.text(keys::REMOTE_PATH)?,
                local_path: r.text(keys::LOCAL_PATH)?,
                save_command: r.opt_text(keys::SAVE_COMMAND)?,
                timeout_ms: r.opt_integer(keys::TIMEOUT_MS)?,
                cleanup: r.opt_bool(keys::CLEANUP)?,
            }),
        };
        Ok(step)
    }

    /// Flattens the parameters back into raw string fields (the inverse of
    /// [`StepKind::from_fields`]). Bodies are not included.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        let mut put = |key: &str, value: String| {
            fields.insert(key.to_string(), value);
        };
        match self {
            StepKind::Connect(p) => {
                put(keys::ROLE, p.role.clone());
                put(keys::HOST, p.host.clone());
                if let Some(port) = p.port {
                    put(keys::PORT, port.to_string());
                }
                if let Some(backend) = p.backend {
                    put(keys::BACKEND, backend.as_str().to_string());
                }
                if let Some(family) = p.family {
                    put(keys::FAMILY, family.as_str().to_string());
                }
                if let Some(timeout) = p.timeout_ms {
                    put(keys::TIMEOUT_MS, timeout.to_string());
                }
            }
            StepKind::Disconnect(p) => put(keys::ROLE, p.role.clone()),
            StepKind::Write(p) => {
                put(keys::COMMAND, p.command.clone());
                if let Some(context) = &p.context {
                    put(keys::CONTEXT, context.clone());
                }
                if let Some(flag) = p.await_completion {
                    put(keys::AWAIT_COMPLETION, flag.to_string());
                }
            }
            StepKind::Query(p) => {
                put(keys::COMMAND, p.command.clone());
                if let Some(context) = &p.context {
                    put(keys::CONTEXT, context.clone());
                }
                if let Some(result) = &p.result {
                    put(keys::RESULT, result.clone());
                }
            }
            StepKind::ForLoop { params, .. } => {
                put(keys::VARIABLE, params.variable.clone());
                put(keys::START, params.start.to_string());
                put(keys::END, params.end.to_string());
                put(keys::STEP, params.step.to_string());
            }
            StepKind::WhileLoop { params, .. } => {
                put(keys::CONDITION, params.condition.clone());
                if let Some(max) = params.max_iterations {
                    put(keys::MAX_ITERATIONS, max.to_string());
                }
            }
            StepKind::Conditional { params, .. } => {
                put(keys::CONDITION, params.condition.clone())
            }
            StepKind::SetVariable(p) => {
                put(keys::VARIABLE, p.variable.clone());
                put(keys::VALUE, p.value.clone());
            }
            StepKind::GetVariable(p) => put(keys::VARIABLE, p.variable.clone()),
            StepKind::Wait(p) => put(keys::SECONDS, p.seconds.to_string()),
            StepKind::CustomCode(p) => put(keys::CODE, p.code.clone()),
            StepKind::Sweep { params, .. } => {
                put(keys::VARIABLE, params.variable.clone());
                put(keys::START, params.start.to_string());
                put(keys::STOP, params.stop.to_string());
                put(keys::POINTS, params.points.to_string());
            }
            StepKind::Poll(p) => {
                if let Some(context) = &p.context {
                    put(keys::CONTEXT, context.clone());
                }
                put(keys::QUERY, p.query.clone());
                put(keys::SUCCESS_STATES, p.success_states.iter().join(","));
                if !p.recoverable_states.is_empty() {
                    put(keys::RECOVERABLE_STATES, p.recoverable_states.iter().join(","));
                }
                if let Some(command) = &p.recovery_command {
                    put(keys::RECOVERY_COMMAND, command.clone());
                }
                if !p.failure_states.is_empty() {
                    put(keys::FAILURE_STATES, p.failure_states.iter().join(","));
                }
                if let Some(interval) = &p.interval_s {
                    put(keys::INTERVAL_S, interval.to_string());
                }
                if let Some(timeout) = &p.timeout_s {
                    put(keys::TIMEOUT_S, timeout.to_string());
                }
            }
            StepKind::FileTransfer(p) => {
                if let Some(context) = &p.context {
                    put(keys::CONTEXT, context.clone());
                }
                put(keys::REMOTE_PATH, p.remote_path.clone());
                put(keys::LOCAL_PATH, p.local_path.clone());
                if let Some(command) = &p.save_command {
                    put(keys::SAVE_COMMAND, command.clone());
                }
                if let Some(timeout) = p.timeout_ms {
                    put(keys::TIMEOUT_MS, timeout.to_string());
                }
                if let Some(flag) = p.cleanup {
                    put(keys::CLEANUP, flag.to_string());
                }
            }
        }
        fields
    }

    /// Nested bodies, split the way [`StepKind::from_fields`] expects them.
    pub fn bodies(&self) -> (&[Step], &[Step]) {
        let empty: &[Step] = &[];
        match self {
            StepKind::ForLoop { body, .. }
            | StepKind::WhileLoop { body, .. }
            | StepKind::Sweep { body, .. } => (body.as_slice(), empty),
            StepKind::Conditional {
                then_body,
                else_body,
                ..
            } => (then_body.as_slice(), else_body.as_slice()),
            _ => (empty, empty),
        }
    }
}

impl FieldType {
    /// Encodes raw field text as the JSON value the Step form uses.
    pub fn to_json(&self, raw: &str) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldType::Text => Value::String(raw.to_string()),
            FieldType::Number => match Number::parse(raw) {
                Some(n) if n.is_integral() && !raw.contains(|c| matches!(c, '.' | 'e' | 'E')) => {
                    Value::from(n.value() as i64)
                }
                Some(n) => serde_json::Number::from_f64(n.value())
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(raw.to_string())),
                None => Value::String(raw.to_string()),
            },
            FieldType::Integer => raw
                .trim()
                .parse::<u64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            FieldType::Bool => match raw.trim() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => Value::String(other.to_string()),
            },
            FieldType::List => Value::Array(
                split_list(raw)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
        }
    }
}
