//! Reconnecting line driver for serial devices.
//!
//! [`LineDriver`] owns one serial port on a dedicated thread. It keeps the
//! port open, splits the byte stream into lines, hands every non-empty
//! trimmed line to its subscribers and to a device-specific [`LineHooks`]
//! implementation, and transparently reopens the port after any fault:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   Connecting ──open ok──► Open ──read lines──► fault ──► Reconnecting
//!       │                                                   ▲   (sleep
//!       └──────────────open failed──────────────────────────┘  reconnect
//!                                                               delay)
//! ```
//!
//! Read timeouts are not faults. A stop request ends the loop without
//! sleeping, and the stop call joins the thread with a bounded wait.
//!
//! Each port name may be owned by one driver at a time in the process;
//! a second driver on the same port fails to start with
//! [`HardwareError::PortInUse`].

use crate::cancel::{StopSignal, join_bounded};
use crate::error::{HardwareError, Result};
use crate::events::{StateTracker, Subscribers};
use crate::traits::{LinePort, LineTransport, PortWriter, ReaderDevice};
use crate::types::{ConnectionState, Detection, DeviceEvent, LineConfig, PortPolicy, ReaderKind};
use libterm_core::constants::LINE_IDLE_FLUSH_MS;
use libterm_protocol::LineAssembler;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Bytes requested from the port per read.
const READ_CHUNK_SIZE: usize = 256;

/// Ports currently owned by a running driver, uppercased.
static CLAIMED_PORTS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Device-specific behavior plugged into a [`LineDriver`].
pub trait LineHooks: Send + 'static {
    /// Modem lines to assert when opening. Defaults to the configured ones.
    fn port_policy(&self, config: &LineConfig) -> PortPolicy {
        config.policy()
    }

    /// Called after every successful open, before any line is read.
    fn opened(&mut self, _link: &LineLink) {}

    /// Inspect a trimmed, non-empty line.
    fn on_line(&mut self, line: &str, link: &LineLink) -> Option<Detection>;

    /// Called after the port was lost or failed to open.
    fn closed(&mut self, _error: &io::Error) {}
}

/// Write access to the port of a running driver.
///
/// Cheap to clone; all clones share the same port.
#[derive(Clone)]
pub struct LineLink {
    device: Arc<str>,
    newline: Arc<str>,
    writer: Arc<Mutex<Option<Box<dyn PortWriter>>>>,
}

impl LineLink {
    pub(crate) fn new(device: &str, newline: &str) -> Self {
        Self {
            device: Arc::from(device),
            newline: Arc::from(newline),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer().is_some()
    }

    /// Write `text` plus the configured newline.
    ///
    /// A closed port makes this a no-op; returns whether the line was written.
    pub fn send_line(&self, text: &str) -> bool {
        let mut writer = self.writer();
        let Some(port) = writer.as_mut() else {
            debug!(device = %self.device, "Port not open, line not sent");
            return false;
        };

        let mut frame = String::with_capacity(text.len() + self.newline.len());
        frame.push_str(text);
        frame.push_str(&self.newline);

        match port.write_all(frame.as_bytes()) {
            Ok(()) => {
                trace!(device = %self.device, tx = %escape_controls(&frame), "TX");
                true
            }
            Err(e) => {
                warn!(device = %self.device, error = %e, "Write failed");
                false
            }
        }
    }

    fn attach(&self, writer: Box<dyn PortWriter>) {
        *self.writer() = Some(writer);
    }

    fn detach(&self) {
        self.writer().take();
    }

    fn writer(&self) -> MutexGuard<'_, Option<Box<dyn PortWriter>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LineLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineLink")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Exclusive ownership of a port name, released on drop.
#[derive(Debug)]
struct PortClaim(String);

impl PortClaim {
    fn acquire(port: &str) -> Result<Self> {
        let key = port.to_ascii_uppercase();
        let mut claimed = CLAIMED_PORTS.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(key.clone()) {
            return Err(HardwareError::port_in_use(port));
        }
        Ok(Self(key))
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        CLAIMED_PORTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

/// A serial device driven by a reconnecting reader thread.
pub struct LineDriver<H: LineHooks> {
    name: String,
    config: LineConfig,
    transport: Arc<dyn LineTransport>,
    hooks: Arc<Mutex<H>>,
    link: LineLink,
    subscribers: Subscribers<DeviceEvent>,
    state: Arc<StateTracker>,
    stop: StopSignal,
    worker: Option<JoinHandle<()>>,
    claim: Option<PortClaim>,
}

impl<H: LineHooks> LineDriver<H> {
    pub fn new(
        name: impl Into<String>,
        config: LineConfig,
        transport: Arc<dyn LineTransport>,
        hooks: H,
    ) -> Self {
        let name = name.into();
        let subscribers = Subscribers::new();
        Self {
            link: LineLink::new(&name, &config.newline),
            state: Arc::new(StateTracker::new(name.clone(), subscribers.clone())),
            subscribers,
            name,
            config,
            transport,
            hooks: Arc::new(Mutex::new(hooks)),
            stop: StopSignal::new(),
            worker: None,
            claim: None,
        }
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// A handle for writing to the port from other threads.
    pub fn link(&self) -> LineLink {
        self.link.clone()
    }

    /// Write a line if the port is open; a silent no-op otherwise.
    pub fn send_line(&self, text: &str) -> bool {
        self.link.send_line(text)
    }

    fn spawn_worker(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(HardwareError::already_running(&self.name));
        }
        // `auto:` and literal selectors for one adapter claim the same name.
        let port = match self.transport.resolve(&self.config.port) {
            Ok(name) => name,
            Err(e) => {
                debug!(device = %self.name, port = %self.config.port, error = %e, "Port not resolvable yet");
                self.config.port.to_string()
            }
        };
        let claim = PortClaim::acquire(&port)?;

        self.stop = StopSignal::new();
        let worker = Worker {
            device: self.name.clone(),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            hooks: Arc::clone(&self.hooks),
            link: self.link.clone(),
            subscribers: self.subscribers.clone(),
            state: Arc::clone(&self.state),
            stop: self.stop.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("line-{}", self.name))
            .spawn(move || worker.run())
            .map_err(|e| HardwareError::start_failed(&self.name, format!("driver thread: {e}")))?;

        self.worker = Some(handle);
        self.claim = Some(claim);
        Ok(())
    }

    fn halt(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.worker.take() {
            join_bounded(handle, &self.name);
        }
        self.link.detach();
        self.state.set(ConnectionState::Disconnected);
        self.claim = None;
    }
}

impl<H: LineHooks> ReaderDevice for LineDriver<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ReaderKind {
        ReaderKind::SerialLine
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn events(&self) -> &Subscribers<DeviceEvent> {
        &self.subscribers
    }

    fn start(&mut self) -> Result<()> {
        self.spawn_worker()
    }

    fn stop(&mut self) {
        self.halt();
    }
}

impl<H: LineHooks> Drop for LineDriver<H> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.halt();
        }
    }
}

impl<H: LineHooks> fmt::Debug for LineDriver<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineDriver")
            .field("name", &self.name)
            .field("port", &self.config.port)
            .field("state", &self.state.get())
            .finish()
    }
}

/// State moved onto the driver thread.
struct Worker<H> {
    device: String,
    config: LineConfig,
    transport: Arc<dyn LineTransport>,
    hooks: Arc<Mutex<H>>,
    link: LineLink,
    subscribers: Subscribers<DeviceEvent>,
    state: Arc<StateTracker>,
    stop: StopSignal,
}

impl<H: LineHooks> Worker<H> {
    fn run(self) {
        info!(device = %self.device, port = %self.config.port, "Line driver started");

        while !self.stop.is_stopped() {
            self.state.set(ConnectionState::Connecting);
            let policy = self.hooks().port_policy(&self.config);

            let fault = match self.transport.open(&self.config, policy) {
                Ok(port) => self.serve(port),
                Err(e) => Some(e),
            };
            let Some(error) = fault else {
                break;
            };

            self.hooks().closed(&error);
            if self.stop.is_stopped() {
                break;
            }

            self.state.set(ConnectionState::Reconnecting);
            warn!(
                device = %self.device,
                port = %self.config.port,
                error = %error,
                delay_ms = self.config.reconnect_delay_ms,
                "Serial link unavailable, reconnecting"
            );
            if !self.stop.sleep(self.config.reconnect_delay()) {
                break;
            }
        }

        self.link.detach();
        self.state.set(ConnectionState::Disconnected);
        info!(device = %self.device, "Line driver stopped");
    }

    /// Read from an open port until it faults (`Some`) or a stop is
    /// requested (`None`).
    fn serve(&self, port: LinePort) -> Option<io::Error> {
        let LinePort {
            name,
            mut reader,
            writer,
        } = port;

        self.link.attach(writer);
        self.state.set(ConnectionState::Open);
        info!(
            device = %self.device,
            port = %name,
            baud = self.config.baud_rate,
            "Serial port opened"
        );
        self.hooks().opened(&self.link);

        let mut lines = LineAssembler::new(
            &self.config.newline,
            Duration::from_millis(LINE_IDLE_FLUSH_MS),
        );
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        let fault = loop {
            if self.stop.is_stopped() {
                break None;
            }

            match reader.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => lines.feed(&chunk[..n], Instant::now()),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {}
                Err(e) => break Some(e),
            }

            while let Some(line) = lines.next_line() {
                self.dispatch(&line);
            }
            if let Some(line) = lines.flush_idle(Instant::now()) {
                self.dispatch(&line);
            }
        };

        if lines.discarded() > 0 {
            debug!(device = %self.device, bytes = lines.discarded(), "Discarded overlong input");
        }
        self.link.detach();
        info!(device = %self.device, port = %name, "Serial port closed");
        fault
    }

    fn dispatch(&self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        trace!(device = %self.device, rx = %line, "RX");

        self.subscribers.emit(&DeviceEvent::LineReceived {
            device: self.device.clone(),
            line: line.to_string(),
        });

        let detection = self.hooks().on_line(line, &self.link);
        if let Some(detection) = detection {
            self.subscribers.emit(&detection.into_event(&self.device));
        }
    }

    fn hooks(&self) -> MutexGuard<'_, H> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render `\r` and `\n` visibly for logs.
pub(crate) fn escape_controls(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}
