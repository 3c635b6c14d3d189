//! Enum wrapper for reader dispatch.
//!
//! The manager owns a heterogeneous set of readers. [`AnyReader`] gives
//! it one concrete type to store and forwards every [`ReaderDevice`] call
//! to the wrapped driver.
//!
//! ```
//! use libterm_hardware::devices::AnyReader;
//! use libterm_hardware::mock::MockLineTransport;
//! use libterm_hardware::protocols::{SerialReader, SerialReaderConfig};
//! use libterm_hardware::traits::ReaderDevice;
//! use libterm_hardware::types::ReaderKind;
//! use std::sync::Arc;
//!
//! let (transport, _handle) = MockLineTransport::new();
//! let reader = SerialReader::book_reader("book", &SerialReaderConfig::default(), Arc::new(transport));
//! let any = AnyReader::from(reader);
//! assert_eq!(any.kind(), ReaderKind::SerialLine);
//! ```

use crate::contactless::ContactlessDriver;
use crate::error::Result;
use crate::events::Subscribers;
use crate::protocols::SerialReader;
use crate::traits::ReaderDevice;
use crate::types::{ConnectionState, DeviceEvent, ReaderKind};
use crate::uhf::UhfDriver;

/// Any supported reader driver.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReader {
    /// Line-oriented serial card or book reader.
    Serial(SerialReader),

    /// PC/SC contactless card reader.
    Contactless(ContactlessDriver),

    /// Vendor UHF book reader.
    Uhf(UhfDriver),
}

macro_rules! dispatch {
    ($self:ident, $reader:ident => $call:expr) => {
        match $self {
            Self::Serial($reader) => $call,
            Self::Contactless($reader) => $call,
            Self::Uhf($reader) => $call,
        }
    };
}

impl ReaderDevice for AnyReader {
    fn name(&self) -> &str {
        dispatch!(self, reader => reader.name())
    }

    fn kind(&self) -> ReaderKind {
        dispatch!(self, reader => reader.kind())
    }

    fn state(&self) -> ConnectionState {
        dispatch!(self, reader => reader.state())
    }

    fn events(&self) -> &Subscribers<DeviceEvent> {
        dispatch!(self, reader => reader.events())
    }

    fn start(&mut self) -> Result<()> {
        dispatch!(self, reader => reader.start())
    }

    fn stop(&mut self) {
        dispatch!(self, reader => reader.stop())
    }
}

impl From<SerialReader> for AnyReader {
    fn from(reader: SerialReader) -> Self {
        Self::Serial(reader)
    }
}

impl From<ContactlessDriver> for AnyReader {
    fn from(reader: ContactlessDriver) -> Self {
        Self::Contactless(reader)
    }
}

impl From<UhfDriver> for AnyReader {
    fn from(reader: UhfDriver) -> Self {
        Self::Uhf(reader)
    }
}
