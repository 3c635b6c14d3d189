//! Mock serial line transport.
//!
//! ```
//! use libterm_hardware::mock::MockLineTransport;
//! use libterm_hardware::traits::LineTransport;
//! use libterm_hardware::types::{LineConfig, PortPolicy};
//!
//! let (transport, handle) = MockLineTransport::new();
//! let mut port = transport
//!     .open(&LineConfig::for_port("COM7"), PortPolicy::default())
//!     .unwrap();
//!
//! handle.push_line("04AB12CD");
//! let mut buf = [0u8; 64];
//! let n = port.reader.read(&mut buf).unwrap();
//! assert_eq!(&buf[..n], b"04AB12CD\n");
//! ```

use crate::traits::{LinePort, LineTransport, PortReader, PortWriter};
use crate::types::{LineConfig, PortPolicy};
use libterm_core::PortDescriptor;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a mock read blocks when no input is queued.
const READ_WAIT: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct LineState {
    available: bool,
    /// Bumped on every open; halves of an older open see a broken pipe.
    generation: u64,
    open: bool,
    inbound: VecDeque<u8>,
    fault: Option<io::ErrorKind>,
    written: Vec<String>,
    open_count: usize,
    last_policy: Option<PortPolicy>,
    /// Enumerated ports, for `auto:` selectors.
    ports: Vec<PortDescriptor>,
    /// When set, only these port names open.
    present: Option<Vec<String>>,
    opened: Vec<String>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<LineState>,
    input: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Line transport backed by in-memory queues.
#[derive(Debug, Clone)]
pub struct MockLineTransport {
    shared: Arc<Shared>,
}

/// Test-side control of a [`MockLineTransport`].
#[derive(Debug, Clone)]
pub struct MockLineHandle {
    shared: Arc<Shared>,
}

impl MockLineTransport {
    pub fn new() -> (Self, MockLineHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(LineState {
                available: true,
                generation: 0,
                open: false,
                inbound: VecDeque::new(),
                fault: None,
                written: Vec::new(),
                open_count: 0,
                last_policy: None,
                ports: Vec::new(),
                present: None,
                opened: Vec::new(),
            }),
            input: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockLineHandle { shared },
        )
    }
}

impl LineTransport for MockLineTransport {
    fn open(&self, config: &LineConfig, policy: PortPolicy) -> io::Result<LinePort> {
        let name = self.resolve(&config.port)?;
        let mut state = self.shared.lock();
        let present = state
            .present
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n.eq_ignore_ascii_case(&name)));
        if !state.available || !present {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name} not present"),
            ));
        }

        state.generation += 1;
        state.open = true;
        state.fault = None;
        state.open_count += 1;
        state.last_policy = Some(policy);
        state.opened.push(name.clone());

        let generation = state.generation;
        Ok(LinePort {
            name,
            reader: Box::new(MockReader {
                shared: Arc::clone(&self.shared),
                generation,
            }),
            writer: Box::new(MockWriter {
                shared: Arc::clone(&self.shared),
                generation,
            }),
        })
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        self.shared.lock().ports.clone()
    }
}

struct MockReader {
    shared: Arc<Shared>,
    generation: u64,
}

impl PortReader for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.shared.lock();
        let (mut state, _) = self
            .shared
            .input
            .wait_timeout_while(state, READ_WAIT, |s| {
                s.generation == self.generation && s.fault.is_none() && s.inbound.is_empty()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.generation != self.generation {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if let Some(kind) = state.fault.take() {
            state.open = false;
            return Err(kind.into());
        }

        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct MockWriter {
    shared: Arc<Shared>,
    generation: u64,
}

impl PortWriter for MockWriter {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.shared.lock();
        if state.generation != self.generation || !state.open {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.written.push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }
}

impl MockLineHandle {
    /// Queue raw bytes for the reader.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.shared.lock().inbound.extend(bytes);
        self.shared.input.notify_all();
    }

    /// Queue `line` followed by `\n`.
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push_bytes(&bytes);
    }

    /// Make the next read on the open port fail with `kind`.
    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.shared.lock().fault = Some(kind);
        self.shared.input.notify_all();
    }

    /// Control whether opens succeed, as if the device were unplugged.
    pub fn set_available(&self, available: bool) {
        self.shared.lock().available = available;
    }

    /// Everything written so far, one entry per write.
    /// Ports reported to `auto:` selectors.
    pub fn set_ports(&self, ports: Vec<PortDescriptor>) {
        self.shared.lock().ports = ports;
    }

    /// Let only the named ports open; every other name is absent.
    pub fn set_present(&self, names: &[&str]) {
        self.shared.lock().present = Some(names.iter().map(|n| n.to_string()).collect());
    }

    /// Resolved name of every successful open, in order.
    pub fn opened_ports(&self) -> Vec<String> {
        self.shared.lock().opened.clone()
    }

    pub fn written(&self) -> Vec<String> {
        self.shared.lock().written.clone()
    }

    pub fn open_count(&self) -> usize {
        self.shared.lock().open_count
    }

    pub fn last_policy(&self) -> Option<PortPolicy> {
        self.shared.lock().last_policy
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_port_fails_to_open() {
        let (transport, handle) = MockLineTransport::new();
        handle.set_available(false);

        let result = transport.open(&LineConfig::for_port("COM9"), PortPolicy::default());
        assert_eq!(result.err().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
        assert_eq!(handle.open_count(), 0);
    }

    #[test]
    fn test_reopen_breaks_previous_halves() {
        let (transport, handle) = MockLineTransport::new();
        let config = LineConfig::for_port("COM9");
        let mut first = transport.open(&config, PortPolicy::default()).unwrap();
        let _second = transport.open(&config, PortPolicy::default()).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(
            first.reader.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        assert!(first.writer.write_all(b"x").is_err());
        assert_eq!(handle.open_count(), 2);
    }

    #[test]
    fn test_fault_is_reported_once() {
        let (transport, handle) = MockLineTransport::new();
        let mut port = transport
            .open(&LineConfig::for_port("COM9"), PortPolicy::default())
            .unwrap();

        handle.fail_reads(io::ErrorKind::ConnectionAborted);
        let mut buf = [0u8; 8];
        assert_eq!(
            port.reader.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::ConnectionAborted
        );
        assert!(!handle.is_open());
    }

    #[test]
    fn test_auto_selector_opens_resolved_port() {
        let (transport, handle) = MockLineTransport::new();
        handle.set_ports(vec![
            PortDescriptor {
                name: "COM5".into(),
                vid: Some(0x1A86),
                pid: Some(0x7523),
                ..PortDescriptor::default()
            },
            PortDescriptor::named("COM1"),
        ]);
        handle.set_present(&["COM5"]);

        let config = LineConfig {
            port: "auto:VID_1A86&PID_7523".parse().unwrap(),
            ..LineConfig::default()
        };
        let port = transport.open(&config, PortPolicy::default()).unwrap();
        assert_eq!(port.name, "COM5");
        assert_eq!(handle.opened_ports(), vec!["COM5"]);

        let absent = transport.open(&LineConfig::for_port("COM1"), PortPolicy::default());
        assert_eq!(absent.err().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
    }
}
