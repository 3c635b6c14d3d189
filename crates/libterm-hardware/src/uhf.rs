//! Vendor UHF reader driver.
//!
//! The UHF reader is reached through the vendor's library, and the field
//! wiring is rarely what the configuration says: the COM number changes
//! with the USB socket, the baud rate was changed by a previous tool, and
//! the device may answer on the broadcast address instead of its own.
//! Opening therefore runs an explicit, bounded and logged search:
//!
//! ```text
//! 1. exact:       configured port × configured baud × each address
//! 2. exhaustive:  every port × every baud × every address
//! 3. auto:        vendor auto-detect × every baud × every address
//! ```
//!
//! Ports are the configured one followed by every enumerated system port;
//! bauds are the configured one followed by 115200, 57600, 38400, 19200,
//! 9600; addresses are the configured one followed by `0xFF` and `0x00`.
//! Before each direct open the port is "nudged" (opened with DTR/RTS
//! asserted, held briefly, closed) to clear half-open driver state. Every
//! attempt is logged and recorded in a [`ProbeReport`].
//!
//! Once open, the device is switched to active mode, its tag buffer is
//! cleared and a thread polls the buffer, emitting one `TagFound` per
//! complete length-prefixed frame.

use crate::cancel::{StopSignal, join_bounded};
use crate::error::{HardwareError, Result};
use crate::events::{StateTracker, Subscribers};
use crate::traits::{ReaderDevice, SerialPorts, UhfVendorApi, VendorCode};
use crate::types::{ConnectionState, DeviceEvent, ReaderKind};
use libterm_core::constants::{
    DEFAULT_UHF_ADDRESS, DEFAULT_UHF_BAUD_RATE, DEFAULT_UHF_POLL_INTERVAL_MS, DEFAULT_UHF_PORT,
    UHF_FALLBACK_ADDRESSES, UHF_FALLBACK_BAUD_RATES, UHF_MAX_FRAME_LEN, UHF_MIN_FRAME_LEN,
    UHF_NUDGE_HOLD_MS, UHF_RC_PORT_NOT_OPEN, UHF_READ_BUFFER_SIZE, UHF_SILENT_POLLS_LOG_EVERY,
};
use libterm_core::hex;
use libterm_protocol::{FrameExtractor, FrameLimits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// UHF reader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UhfConfig {
    /// Port tried first, e.g. `COM5`.
    pub port: String,

    pub baud_rate: u32,

    /// Device address tried first.
    pub address: u8,

    /// Addresses tried after the configured one.
    pub fallback_addresses: Vec<u8>,

    pub poll_interval_ms: u64,

    /// Accepted frame payload length, inclusive.
    pub min_frame_len: u8,
    pub max_frame_len: u8,

    /// Toggle DTR/RTS on a port before each open attempt.
    pub nudge: bool,
}

impl UhfConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits::new(self.min_frame_len, self.max_frame_len)
    }
}

impl Default for UhfConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_UHF_PORT.to_string(),
            baud_rate: DEFAULT_UHF_BAUD_RATE,
            address: DEFAULT_UHF_ADDRESS,
            fallback_addresses: UHF_FALLBACK_ADDRESSES.to_vec(),
            poll_interval_ms: DEFAULT_UHF_POLL_INTERVAL_MS,
            min_frame_len: UHF_MIN_FRAME_LEN,
            max_frame_len: UHF_MAX_FRAME_LEN,
            nudge: true,
        }
    }
}

/// Baud rate as encoded for the vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaudCode(u8);

impl BaudCode {
    const TABLE: [(u32, u8); 5] = [(9600, 0), (19200, 1), (38400, 2), (57600, 3), (115_200, 4)];

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn baud_rate(self) -> u32 {
        Self::TABLE
            .iter()
            .find(|(_, code)| *code == self.0)
            .map_or(0, |(baud, _)| *baud)
    }
}

impl TryFrom<u32> for BaudCode {
    type Error = libterm_core::Error;

    fn try_from(baud: u32) -> std::result::Result<Self, Self::Error> {
        Self::TABLE
            .iter()
            .find(|(rate, _)| *rate == baud)
            .map(|(_, code)| Self(*code))
            .ok_or(libterm_core::Error::UnknownBaudRate(baud))
    }
}

impl fmt::Display for BaudCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.baud_rate())
    }
}

/// The COM number in a port name: its trailing digits (`COM5` → 5).
///
/// ```
/// use libterm_hardware::uhf::port_number;
///
/// assert_eq!(port_number("COM12"), Some(12));
/// assert_eq!(port_number("com3"), Some(3));
/// assert_eq!(port_number("/dev/ttyUSB"), None);
/// ```
pub fn port_number(name: &str) -> Option<u32> {
    let name = name.trim();
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    name[name.len() - digits..].parse().ok().filter(|n| *n > 0)
}

/// An opened vendor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorPort {
    /// COM number, 0 when the vendor did not say.
    pub port: u32,

    /// Frame port index passed to every later call.
    pub index: i32,

    /// Address the device answered on.
    pub address: u8,

    pub baud: BaudCode,
}

/// Which phase of the search an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    Exact,
    Exhaustive,
    Auto,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Exhaustive => write!(f, "exhaustive"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// One open attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub stage: ProbeStage,

    /// COM number tried; `None` for vendor auto-detect.
    pub port: Option<u32>,

    pub baud: BaudCode,
    pub address: u8,

    /// Vendor return code, 0 on success.
    pub code: VendorCode,
}

/// Every attempt made while opening the reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub attempts: Vec<ProbeAttempt>,
    pub opened: Option<VendorPort>,
}

impl ProbeReport {
    /// Return code of the last failed attempt, or "port not open" when
    /// nothing was attempted.
    pub fn last_code(&self) -> VendorCode {
        self.attempts
            .iter()
            .rev()
            .map(|a| a.code)
            .find(|code| *code != 0)
            .unwrap_or(UHF_RC_PORT_NOT_OPEN)
    }
}

/// Candidate values for the search, in trial order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePlan {
    /// Port names with their COM numbers, configured port first.
    pub ports: Vec<(String, u32)>,
    pub bauds: Vec<BaudCode>,
    pub addresses: Vec<u8>,
}

impl ProbePlan {
    /// Build the plan from the configuration and the enumerated ports.
    pub fn new(config: &UhfConfig, enumerated: &[String]) -> Result<Self> {
        let configured = BaudCode::try_from(config.baud_rate)
            .map_err(|e| HardwareError::invalid_config(e.to_string()))?;

        let mut ports: Vec<(String, u32)> = Vec::new();
        for name in std::iter::once(&config.port).chain(enumerated) {
            let Some(number) = port_number(name) else {
                continue;
            };
            if !ports.iter().any(|(_, n)| *n == number) {
                ports.push((name.trim().to_string(), number));
            }
        }

        let mut bauds = vec![configured];
        for rate in UHF_FALLBACK_BAUD_RATES {
            if let Ok(code) = BaudCode::try_from(rate)
                && !bauds.contains(&code)
            {
                bauds.push(code);
            }
        }

        let mut addresses = vec![config.address];
        for address in &config.fallback_addresses {
            if !addresses.contains(address) {
                addresses.push(*address);
            }
        }

        Ok(Self {
            ports,
            bauds,
            addresses,
        })
    }

    /// Upper bound on open attempts.
    pub fn max_attempts(&self) -> usize {
        let grid = self.bauds.len() * self.addresses.len();
        grid * self.ports.len() + grid
    }
}

/// Runs the open search against the vendor library.
struct Prober<'a> {
    device: &'a str,
    vendor: &'a dyn UhfVendorApi,
    ports: &'a dyn SerialPorts,
    nudge: bool,
    stop: &'a StopSignal,
    report: ProbeReport,
}

impl Prober<'_> {
    fn run(mut self, plan: &ProbePlan) -> ProbeReport {
        let configured_baud = plan.bauds[0];

        if let Some((name, number)) = plan.ports.first() {
            for &address in &plan.addresses {
                if self.open_direct(ProbeStage::Exact, name, *number, configured_baud, address) {
                    return self.report;
                }
            }
        }

        for (i, (name, number)) in plan.ports.iter().enumerate() {
            for &baud in &plan.bauds {
                for &address in &plan.addresses {
                    if i == 0 && baud == configured_baud {
                        continue;
                    }
                    if self.stop.is_stopped() {
                        return self.report;
                    }
                    if self.open_direct(ProbeStage::Exhaustive, name, *number, baud, address) {
                        return self.report;
                    }
                }
            }
        }

        for &baud in &plan.bauds {
            for &address in &plan.addresses {
                if self.stop.is_stopped() {
                    return self.report;
                }
                if self.open_auto(baud, address) {
                    return self.report;
                }
            }
        }

        self.report
    }

    fn open_direct(
        &mut self,
        stage: ProbeStage,
        name: &str,
        number: u32,
        baud: BaudCode,
        address: u8,
    ) -> bool {
        if self.nudge
            && let Err(e) =
                self.ports
                    .nudge(name, baud.baud_rate(), Duration::from_millis(UHF_NUDGE_HOLD_MS))
        {
            trace!(port = %name, error = %e, "Nudge failed");
        }

        let mut echoed = address;
        let result = self.vendor.open_port(number, &mut echoed, baud.code());
        let code = result.err().unwrap_or(0);
        self.record(stage, Some(number), baud, address, echoed, code);

        match result {
            Ok(index) => {
                self.report.opened = Some(VendorPort {
                    port: number,
                    index,
                    address: echoed,
                    baud,
                });
                true
            }
            Err(_) => false,
        }
    }

    fn open_auto(&mut self, baud: BaudCode, address: u8) -> bool {
        let mut echoed = address;
        let result = self.vendor.auto_open_port(&mut echoed, baud.code());
        let code = result.err().unwrap_or(0);
        let port = result.ok().map(|(port, _)| port);
        self.record(ProbeStage::Auto, port, baud, address, echoed, code);

        match result {
            Ok((port, index)) => {
                self.report.opened = Some(VendorPort {
                    port,
                    index,
                    address: echoed,
                    baud,
                });
                true
            }
            Err(_) => false,
        }
    }

    fn record(
        &mut self,
        stage: ProbeStage,
        port: Option<u32>,
        baud: BaudCode,
        address: u8,
        echoed: u8,
        code: VendorCode,
    ) {
        debug!(
            device = self.device,
            %stage,
            port = ?port,
            %baud,
            address = %format!("0x{address:02X}"),
            echoed = %format!("0x{echoed:02X}"),
            code,
            "UHF open attempt"
        );
        self.report.attempts.push(ProbeAttempt {
            stage,
            port,
            baud,
            address,
            code,
        });
    }
}

/// Search for the reader. The report's `opened` is set on success.
pub fn probe(
    device: &str,
    vendor: &dyn UhfVendorApi,
    ports: &dyn SerialPorts,
    config: &UhfConfig,
    stop: &StopSignal,
) -> Result<ProbeReport> {
    let enumerated: Vec<String> = ports.list().into_iter().map(|p| p.name).collect();
    let plan = ProbePlan::new(config, &enumerated)?;
    info!(
        device,
        ports = plan.ports.len(),
        bauds = plan.bauds.len(),
        addresses = plan.addresses.len(),
        "Probing UHF reader"
    );

    let prober = Prober {
        device,
        vendor,
        ports,
        nudge: config.nudge,
        stop,
        report: ProbeReport::default(),
    };
    Ok(prober.run(&plan))
}

/// Vendor UHF reader in active mode.
pub struct UhfDriver {
    name: String,
    config: UhfConfig,
    vendor: Arc<dyn UhfVendorApi>,
    ports: Arc<dyn SerialPorts>,
    subscribers: Subscribers<DeviceEvent>,
    state: Arc<StateTracker>,
    stop: StopSignal,
    worker: Option<JoinHandle<()>>,
    opened: Option<VendorPort>,
    last_report: Option<ProbeReport>,
}

impl UhfDriver {
    pub fn new(
        name: impl Into<String>,
        config: UhfConfig,
        vendor: Arc<dyn UhfVendorApi>,
        ports: Arc<dyn SerialPorts>,
    ) -> Self {
        let name = name.into();
        let subscribers = Subscribers::new();
        Self {
            state: Arc::new(StateTracker::new(name.clone(), subscribers.clone())),
            subscribers,
            name,
            config,
            vendor,
            ports,
            stop: StopSignal::new(),
            worker: None,
            opened: None,
            last_report: None,
        }
    }

    pub fn config(&self) -> &UhfConfig {
        &self.config
    }

    /// The port in use while running.
    pub fn opened_port(&self) -> Option<VendorPort> {
        self.opened
    }

    /// Attempts made by the most recent start.
    pub fn last_probe(&self) -> Option<&ProbeReport> {
        self.last_report.as_ref()
    }

    fn open_and_spawn(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(HardwareError::already_running(&self.name));
        }

        self.stop = StopSignal::new();
        self.state.set(ConnectionState::Connecting);

        let report = match probe(
            &self.name,
            self.vendor.as_ref(),
            self.ports.as_ref(),
            &self.config,
            &self.stop,
        ) {
            Ok(report) => report,
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        let opened = report.opened;
        let last_code = report.last_code();
        let attempts = report.attempts.len();
        self.last_report = Some(report);

        let Some(mut port) = opened else {
            self.state.set(ConnectionState::Disconnected);
            warn!(device = %self.name, last_code, attempts, "UHF reader did not open");
            return Err(HardwareError::probe_exhausted(last_code, attempts));
        };

        if let Err(code) = self.vendor.set_active_mode(&mut port.address, port.index) {
            self.close(port);
            self.state.set(ConnectionState::Disconnected);
            return Err(HardwareError::start_failed(
                &self.name,
                format!("active mode rejected (code {code})"),
            ));
        }
        if let Err(code) = self.vendor.clear_tag_buffer(&mut port.address, port.index) {
            warn!(device = %self.name, code, "Clearing tag buffer failed");
        }

        let poller = TagPoller {
            device: self.name.clone(),
            vendor: Arc::clone(&self.vendor),
            port,
            extractor: FrameExtractor::new(self.config.frame_limits()),
            interval: self.config.poll_interval(),
            subscribers: self.subscribers.clone(),
            stop: self.stop.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("uhf-{}", self.name))
            .spawn(move || poller.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.close(port);
                self.state.set(ConnectionState::Disconnected);
                return Err(HardwareError::start_failed(
                    &self.name,
                    format!("driver thread: {e}"),
                ));
            }
        };

        self.worker = Some(handle);
        self.opened = Some(port);
        self.state.set(ConnectionState::Open);
        info!(
            device = %self.name,
            port = port.port,
            baud = %port.baud,
            address = %format!("0x{:02X}", port.address),
            "UHF reader ready"
        );
        Ok(())
    }

    fn close(&self, port: VendorPort) {
        let result = if port.port > 0 {
            self.vendor.close_specific_port(port.port)
        } else {
            self.vendor.close_port()
        };
        if let Err(code) = result {
            debug!(device = %self.name, code, "Vendor close returned error");
        }
    }

    fn halt(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.worker.take() {
            join_bounded(handle, &self.name);
        }
        if let Some(port) = self.opened.take() {
            self.close(port);
            info!(device = %self.name, port = port.port, "UHF reader closed");
        }
        self.state.set(ConnectionState::Disconnected);
    }
}

/// Active-mode polling loop state.
struct TagPoller {
    device: String,
    vendor: Arc<dyn UhfVendorApi>,
    port: VendorPort,
    extractor: FrameExtractor,
    interval: Duration,
    subscribers: Subscribers<DeviceEvent>,
    stop: StopSignal,
}

impl TagPoller {
    fn run(self) {
        let mut buffer = vec![0u8; UHF_READ_BUFFER_SIZE];
        let mut silent: u32 = 0;

        while !self.stop.is_stopped() {
            match self.vendor.read_active_mode_data(&mut buffer, self.port.index) {
                Ok(len) if len > 0 => {
                    if self.emit_frames(&buffer[..len.min(buffer.len())]) > 0 {
                        silent = 0;
                    } else {
                        silent += 1;
                    }
                }
                Ok(_) => silent += 1,
                Err(code) => {
                    silent += 1;
                    trace!(device = %self.device, code, "Active-mode read failed");
                }
            }

            if silent >= UHF_SILENT_POLLS_LOG_EVERY {
                debug!(device = %self.device, polls = silent, "No tags");
                silent = 0;
            }

            if !self.stop.sleep(self.interval) {
                break;
            }
        }
    }

    fn emit_frames(&self, data: &[u8]) -> usize {
        let mut frames = self.extractor.frames(data);
        let mut emitted = 0;

        for frame in frames.by_ref() {
            let tag = hex::encode_upper(frame);
            debug!(device = %self.device, tag = %tag, "Tag read");
            self.subscribers.emit(&DeviceEvent::TagFound {
                device: self.device.clone(),
                tag,
            });
            emitted += 1;
        }

        if frames.skipped() > 0 {
            trace!(device = %self.device, bytes = frames.skipped(), "Skipped bytes outside frames");
        }
        emitted
    }
}

impl ReaderDevice for UhfDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ReaderKind {
        ReaderKind::VendorUhf
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn events(&self) -> &Subscribers<DeviceEvent> {
        &self.subscribers
    }

    fn start(&mut self) -> Result<()> {
        self.open_and_spawn()
    }

    fn stop(&mut self) {
        self.halt();
    }
}

impl Drop for UhfDriver {
    fn drop(&mut self) {
        if self.worker.is_some() || self.opened.is_some() {
            self.halt();
        }
    }
}

impl fmt::Debug for UhfDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UhfDriver")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("opened", &self.opened)
            .finish()
    }
}
