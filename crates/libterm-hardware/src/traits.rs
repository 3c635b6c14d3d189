//! Hardware seams.
//!
//! Every driver talks to the outside world through one of the traits in
//! this module, so the driver logic (reconnection, retry policy, probing,
//! frame extraction) is exercised against the mocks in [`crate::mock`]
//! and bound to real hardware by the backends in [`crate::backend`].
//!
//! ```text
//! LineDriver ──────────► LineTransport ─► PortReader / PortWriter
//! ContactlessDriver ───► CardService ───► CardContext ─► CardSession
//! UhfDriver ───────────► UhfVendorApi
//!            └─────────► SerialPorts (enumeration, nudge)
//! BookOperations ──────► CabinetActuator
//! ```
//!
//! All seams are synchronous: drivers own a dedicated thread each and
//! block on their hardware with bounded timeouts.

use crate::error::Result;
use crate::events::Subscribers;
use crate::types::{ConnectionState, DeviceEvent, LineConfig, PortPolicy, ReaderKind};
use libterm_core::{PortDescriptor, PortSelector};
use std::io;
use std::time::Duration;

// ============================================================================
// Serial line transport
// ============================================================================

/// Read half of an open serial port.
pub trait PortReader: Send {
    /// Read whatever bytes are available into `buf`.
    ///
    /// `Ok(0)` or an error of kind [`io::ErrorKind::TimedOut`] means
    /// nothing arrived within the read timeout; the caller keeps reading.
    /// Any other error means the link is gone.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write half of an open serial port.
pub trait PortWriter: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// An open serial port split into halves.
///
/// Dropping both halves closes the port.
pub struct LinePort {
    /// Resolved system name of the port.
    pub name: String,
    pub reader: Box<dyn PortReader>,
    pub writer: Box<dyn PortWriter>,
}

/// Opens serial ports for line drivers.
pub trait LineTransport: Send + Sync {
    /// Open the port named by `config` with the given modem lines.
    fn open(&self, config: &LineConfig, policy: PortPolicy) -> io::Result<LinePort>;

    /// Ports this transport can reach, consulted for `auto:` selectors.
    fn ports(&self) -> Vec<PortDescriptor> {
        Vec::new()
    }

    /// The system port name `selector` currently stands for.
    fn resolve(&self, selector: &PortSelector) -> io::Result<String> {
        let ports = if selector.is_auto() {
            self.ports()
        } else {
            Vec::new()
        };
        selector.resolve(&ports).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no serial port matches {selector}"),
            )
        })
    }
}

/// Enumerates system serial ports.
pub trait SerialPorts: Send + Sync {
    fn list(&self) -> Vec<PortDescriptor>;

    /// Open `port` with DTR/RTS asserted, hold it for `hold` and close it.
    ///
    /// Resets half-open driver state left behind by a crashed process.
    fn nudge(&self, port: &str, baud_rate: u32, hold: Duration) -> io::Result<()>;
}

// ============================================================================
// Card service (PC/SC)
// ============================================================================

/// Failures reported by the system card service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardServiceError {
    /// Another process holds the reader.
    #[error("Reader busy (sharing violation)")]
    SharingViolation,

    /// No card in the field.
    #[error("No card present")]
    NoSmartcard,

    #[error("No readers available")]
    NoReadersAvailable,

    #[error("{0}")]
    Other(String),
}

/// Entry point into the card service.
pub trait CardService: Send + Sync {
    /// Establish a fresh context. Dropping it releases the context.
    fn establish(&self) -> std::result::Result<Box<dyn CardContext>, CardServiceError>;
}

/// An established card-service context.
pub trait CardContext: Send {
    fn list_readers(&self) -> std::result::Result<Vec<String>, CardServiceError>;

    /// Connect to the card in `reader` in shared mode.
    fn connect(&self, reader: &str) -> std::result::Result<Box<dyn CardSession>, CardServiceError>;
}

/// A connected card. Dropping it disconnects and leaves the card powered.
pub trait CardSession: Send {
    /// Exchange one APDU using the active protocol.
    fn transmit(&mut self, apdu: &[u8]) -> std::result::Result<Vec<u8>, CardServiceError>;
}

// ============================================================================
// Vendor UHF reader
// ============================================================================

/// Return code of a vendor library call; zero means success.
pub type VendorCode = i32;

/// Binding to the vendor's UHF reader library.
///
/// `address` parameters are in/out: the device may answer on a different
/// address than requested, and that echoed address must be used for every
/// later call.
pub trait UhfVendorApi: Send + Sync {
    /// Open COM port number `port`; returns the frame port index.
    fn open_port(
        &self,
        port: u32,
        address: &mut u8,
        baud_code: u8,
    ) -> std::result::Result<i32, VendorCode>;

    /// Let the library scan for the reader; returns the port number and
    /// frame port index it settled on.
    fn auto_open_port(
        &self,
        address: &mut u8,
        baud_code: u8,
    ) -> std::result::Result<(u32, i32), VendorCode>;

    /// Switch the device to active (buffered) mode.
    fn set_active_mode(&self, address: &mut u8, index: i32) -> std::result::Result<(), VendorCode>;

    fn clear_tag_buffer(&self, address: &mut u8, index: i32) -> std::result::Result<(), VendorCode>;

    /// Fetch buffered tags as concatenated length-prefixed frames.
    /// Returns the number of bytes written into `buffer`.
    fn read_active_mode_data(
        &self,
        buffer: &mut [u8],
        index: i32,
    ) -> std::result::Result<usize, VendorCode>;

    fn close_specific_port(&self, port: u32) -> std::result::Result<(), VendorCode>;

    fn close_port(&self) -> std::result::Result<(), VendorCode>;
}

// ============================================================================
// Cabinet actuator
// ============================================================================

/// The book cabinet controller.
///
/// Best effort: status signals are fire-and-forget and a missing actuator
/// must never stop identification.
pub trait CabinetActuator: Send + Sync {
    /// Whether the return bin has room. Defaults to `true` when unknown.
    fn has_space(&self) -> bool;

    fn open_bin(&self) -> Result<()>;

    fn send_ok(&self);

    fn send_error(&self);

    fn send_beep(&self, duration_ms: u32);
}

// ============================================================================
// Readers
// ============================================================================

/// Common surface of every reader driver.
pub trait ReaderDevice: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> ReaderKind;

    fn state(&self) -> ConnectionState;

    /// Subscribers receiving this reader's events.
    fn events(&self) -> &Subscribers<DeviceEvent>;

    /// Open the hardware and spawn the background loop.
    fn start(&mut self) -> Result<()>;

    /// Stop the loop and release the hardware. Safe to call repeatedly.
    fn stop(&mut self);
}
