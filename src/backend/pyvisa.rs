use super::{BackendAdapter, BackendKind, CommandCall, ConnectSpec, address_literal, seconds};

/// Generic write/query through `pyvisa`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PyVisaBackend;

impl BackendAdapter for PyVisaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PyVisa
    }

    fn imports(&self) -> Vec<String> {
        vec!["import pyvisa".to_string()]
    }

    fn session_setup(&self) -> Vec<String> {
        vec!["rm = pyvisa.ResourceManager()".to_string()]
    }

    fn session_teardown(&self) -> Vec<String> {
        vec!["rm.close()".to_string()]
    }

    fn connect(&self, spec: &ConnectSpec<'_>) -> Option<Vec<String>> {
        let h = spec.handle;
        let mut lines = Vec::new();
        match spec.port {
            Some(port) => {
                let resource = address_literal(spec, "TCPIP::", &format!("::{}::SOCKET", port));
                lines.push(format!("{} = rm.open_resource({})", h, resource));
                lines.push(format!("{}.read_termination = \"\\n\"", h));
                lines.push(format!("{}.write_termination = \"\\n\"", h));
            }
            None => {
                let resource = address_literal(spec, "TCPIP::", "::INSTR");
                lines.push(format!("{} = rm.open_resource({})", h, resource));
            }
        }
        lines.push(format!("{}.timeout = {}", h, spec.timeout_ms));
        Some(lines)
    }

    fn write(&self, handle: &str, command: &CommandCall<'_>) -> Option<Vec<String>> {
        Some(vec![format!("{}.write({})", handle, command.literal)])
    }

    fn query(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        binding: Option<&str>,
    ) -> Option<Vec<String>> {
        let call = format!("{}.query({}).strip()", handle, command.literal);
        Some(vec![match binding {
            Some(name) => format!("{} = {}", name, call),
            None => format!("print({})", call),
        }])
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
        // *OPC? blocks until done; the I/O timeout bounds the wait.
        Some(vec![
            format!("_previous_timeout = {}.timeout", handle),
            format!("{}.timeout = {}", handle, seconds(timeout_s * 1000.0)),
            "try:".to_string(),
            format!("    {}.query(\"*OPC?\")", handle),
            "finally:".to_string(),
            format!("    {}.timeout = _previous_timeout", handle),
        ])
    }

    fn timeout_attribute(&self, handle: &str) -> Option<String> {
        Some(format!("{}.timeout", handle))
    }

    fn read_binary(
        &self,
        handle: &str,
        command: &CommandCall<'_>,
        into: &str,
    ) -> Option<Vec<String>> {
        Some(vec![
            format!("{}.write({})", handle, command.literal),
            format!("{} = {}.read_raw()", into, handle),
        ])
    }
}
