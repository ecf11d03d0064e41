use super::{BackendAdapter, BackendKind, CommandCall, ConnectSpec, seconds};

const DEFAULT_PORT: u16 = 4000;

/// Line-based SCPI client emitted into scripts that use the raw socket backend.
/// Binary reads are chunked and end on a receive timeout once data has arrived.
const HELPER: &str = r#"class ScpiSocket:
    """Minimal SCPI client over a raw TCP socket."""

    def __init__(self, host, port=4000, timeout_ms=5000):
        self.sock = socket.create_connection((host, port), timeout=timeout_ms / 1000)
        self.timeout = timeout_ms

    @property
    def timeout(self):
        return self._timeout

    @timeout.setter
    def timeout(self, value):
        self._timeout = value
        self.sock.settimeout(value / 1000)

    def write(self, command):
        self.sock.sendall((command + "\n").encode())

    def read_line(self):
        data = bytearray()
        while True:
            chunk = self.sock.recv(1)
            if not chunk or chunk == b"\n":
                break
            data.extend(chunk)
        return data.decode(errors="replace").strip()

    def query(self, command):
        self.write(command)
        return self.read_line()

    def read_raw(self, chunk_timeout=5.0):
        previous = self.sock.gettimeout()
        self.sock.settimeout(chunk_timeout)
        data = bytearray()
        try:
            while True:
                try:
                    chunk = self.sock.recv(65536)
                except socket.timeout:
                    if data:
                        break
                    raise
                if not chunk:
                    break
                data.extend(chunk)
        finally:
            self.sock.settimeout(previous)
        return bytes(data)

    def close(self):
        self.sock.close()"#;

/// Generic write/query over a raw TCP socket. Completion is detected by polling
/// the event status register instead of a blocking `*OPC?`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketBackend;

impl BackendAdapter for SocketBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Socket
    }

    fn imports(&self) -> Vec<String> {
        vec!["import socket".to_string()]
    }

    fn helpers(&self) -> Vec<String> {
        HELPER.lines().map(str::to_string).collect()
    }

    fn connect(&self, spec: &ConnectSpec<'_>) -> Option<Vec<String>> {
        Some(vec![format!(
            "{} = ScpiSocket({}, {}, timeout_ms={})",
            spec.handle,
            spec.host_literal,
            spec.port.unwrap_or(DEFAULT_PORT),
            spec.timeout_ms
        )])
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
        let call = format!("{}.query({})", handle, command.literal);
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
        interval_s: f64,
    ) -> Option<Vec<String>> {
        Some(vec![
            format!("{}.write(\"*OPC\")", handle),
            format!("_deadline = time.monotonic() + {}", seconds(timeout_s)),
            format!("while not int({}.query(\"*ESR?\") or 0) & 1:", handle),
            "    if time.monotonic() > _deadline:".to_string(),
            format!(
                "        raise TimeoutError(\"{}: operation did not complete\")",
                handle
            ),
            format!("    time.sleep({})", seconds(interval_s)),
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
