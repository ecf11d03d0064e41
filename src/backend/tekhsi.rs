use super::{BackendAdapter, BackendKind, CommandCall, ConnectSpec, address_literal};

const DEFAULT_PORT: u16 = 5000;

/// The TekHSI streaming client. It only moves waveform data: a query names the
/// source to fetch (`CH1`, `CURVe? CH1`) and binds the waveform object. Plain
/// SCPI writes and file transfers have no template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TekHsiBackend;

/// The waveform source named by a query, lowercased (`CURVe? CH1` → `ch1`).
fn waveform_source(raw: &str) -> String {
    raw.split_whitespace()
        .last()
        .unwrap_or_default()
        .trim_start_matches(':')
        .trim_end_matches('?')
        .trim_matches(|c: char| c == '"' || c == '\'')
        .to_ascii_lowercase()
}

impl BackendAdapter for TekHsiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TekHsi
    }

    fn imports(&self) -> Vec<String> {
        vec!["from tekhsi import TekHSIConnect".to_string()]
    }

    fn connect(&self, spec: &ConnectSpec<'_>) -> Option<Vec<String>> {
        let port = spec.port.unwrap_or(DEFAULT_PORT);
        Some(vec![format!(
            "{} = TekHSIConnect({})",
            spec.handle,
            address_literal(spec, "", &format!(":{}", port))
        )])
    }

    fn write(&self, _handle: &str, _command: &CommandCall<'_>) -> Option<Vec<String>> {
        None
    }

    fn query(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        binding: Option<&str>,
    ) -> Option<Vec<String>> {
        let fetch = format!("{}.get_data(\"{}\")", handle, waveform_source(command.raw));
        Some(vec![
            format!("with {}.access_data():", handle),
            match binding {
                Some(name) => format!("    {} = {}", name, fetch),
                None => format!("    print({})", fetch),
            },
        ])
    }

    fn status_query(
        &self,
        _handle: &str,
        _command: &CommandCall<'_>,
        _binding: &str,
    ) -> Option<Vec<String>> {
        None
    }

    fn disconnect(&self, handle: &str) -> Option<Vec<String>> {
        Some(vec![format!("{}.close()", handle)])
    }

    fn await_completion(
        &self,
        _handle: &str,
        _timeout_s: f64,
        _interval_s: f64,
    ) -> Option<Vec<String>> {
        None
    }

    fn timeout_attribute(&self, _handle: &str) -> Option<String> {
        None
    }

    fn read_binary(
        &self,
        _handle: &str,
        _command: &CommandCall<'_>,
        _into: &str,
    ) -> Option<Vec<String>> {
        None
    }
}
