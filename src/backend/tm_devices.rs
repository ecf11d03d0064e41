use super::{BackendAdapter, BackendKind, CommandCall, ConnectSpec, seconds};
use crate::device::DeviceFamily;

const PYTHON_KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Structured driver objects from `tm_devices`: `CH1:SCAle 1.0` becomes
/// `scope.commands.ch[1].scale.write(1.0)`. Commands that cannot be expressed
/// as an attribute path (common commands, interpolated headers, several
/// arguments) fall back to the driver's free-form `write`/`query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TmDevicesBackend;

/// `CH1:SCAle` → `commands.ch[1].scale`.
fn attribute_path(header: &str) -> Option<String> {
    let header = header.trim().trim_start_matches(':').trim_end_matches('?');
    if header.is_empty() {
        return None;
    }
    let mut path = String::from("commands");
    for segment in header.split(':') {
        let lower = segment.to_ascii_lowercase();
        let stem = lower.trim_end_matches(|c: char| c.is_ascii_digit());
        let valid = stem
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !PYTHON_KEYWORDS.contains(&stem);
        if !valid {
            return None;
        }
        path.push('.');
        path.push_str(stem);
        if stem.len() != lower.len() {
            path.push_str(&format!("[{}]", &lower[stem.len()..]));
        }
    }
    Some(path)
}

fn factory(family: DeviceFamily) -> &'static str {
    match family {
        DeviceFamily::Scope => "add_scope",
        DeviceFamily::PowerSupply => "add_psu",
        DeviceFamily::Smu => "add_smu",
        DeviceFamily::SignalGenerator => "add_afg",
        DeviceFamily::Multimeter => "add_dmm",
    }
}

impl BackendAdapter for TmDevicesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TmDevices
    }

    fn imports(&self) -> Vec<String> {
        vec!["from tm_devices import DeviceManager".to_string()]
    }

    fn session_setup(&self) -> Vec<String> {
        vec!["device_manager = DeviceManager(verbose=False)".to_string()]
    }

    fn session_teardown(&self) -> Vec<String> {
        vec!["device_manager.close()".to_string()]
    }

    fn connect(&self, spec: &ConnectSpec<'_>) -> Option<Vec<String>> {
        let connection = match spec.port {
            Some(port) => format!(", connection_type=\"SOCKET\", port={}", port),
            None => String::new(),
        };
        Some(vec![
            format!(
                "{} = device_manager.{}({}, alias=\"{}\"{})",
                spec.handle,
                factory(spec.family),
                spec.host_literal,
                spec.handle,
                connection
            ),
            format!("{}.visa_resource.timeout = {}", spec.handle, spec.timeout_ms),
        ])
    }

    fn write(&self, handle: &str, command: &CommandCall<'_>) -> Option<Vec<String>> {
        let structured = match command.arguments {
            [value] => attribute_path(command.header)
                .map(|path| format!("{}.{}.write({})", handle, path, value)),
            _ => None,
        };
        Some(vec![
            structured.unwrap_or_else(|| format!("{}.write({})", handle, command.literal)),
        ])
    }

    fn query(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        binding: Option<&str>,
    ) -> Option<Vec<String>> {
        let call = match command.arguments {
            [] => attribute_path(command.header).map(|path| format!("{}.{}.query()", handle, path)),
            _ => None,
        }
        .unwrap_or_else(|| format!("{}.query({})", handle, command.literal));
        Some(vec![match binding {
            Some(name) => format!("{} = {}", name, call),
            None => format!("print({})", call),
        }])
    }

    /// Status polling compares raw text, so it stays on the free-form call.
    fn status_query(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        binding: &str,
    ) -> Option<Vec<String>> {
        Some(vec![format!(
            "{} = {}.query({})",
            binding, handle, command.literal
        )])
    }

    fn disconnect(&self, handle: &str) -> Option<Vec<String>> {
        Some(vec![format!("{}.close()", handle)])
    }

    fn await_completion(
        &self,
        handle: &str,
        timeout_s: f64,
        _interval_s: f64,
    ) -> Option<Vec<String>> {
        Some(vec![
            format!("_previous_timeout = {}.visa_resource.timeout", handle),
            format!(
                "{}.visa_resource.timeout = {}",
                handle,
                seconds(timeout_s * 1000.0)
            ),
            "try:".to_string(),
            format!("    {}.query(\"*OPC?\")", handle),
            "finally:".to_string(),
            format!("    {}.visa_resource.timeout = _previous_timeout", handle),
        ])
    }

    fn timeout_attribute(&self, handle: &str) -> Option<String> {
        Some(format!("{}.visa_resource.timeout", handle))
    }

    fn read_binary(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        into: &str,
    ) -> Option<Vec<String>> {
        Some(vec![
            format!("{}.write({})", handle, command.literal),
            format!("{} = {}.visa_resource.read_raw()", into, handle),
        ])
    }
}
