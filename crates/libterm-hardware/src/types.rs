//! Common types shared across reader drivers.
//!
//! This module defines the connection state machine, the events every
//! driver emits, the serial line configuration and a few small value
//! types used by more than one driver.

use libterm_core::PortSelector;
use libterm_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_NEWLINE, DEFAULT_READ_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_WRITE_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection state of a driver.
///
/// ```text
/// Disconnected ──start──► Connecting ──open──► Open
///       ▲                     ▲                  │ I/O fault
///       │ stop                │ delay            ▼
///       └─────────────────────┴────────── Reconnecting
/// ```
///
/// `Disconnected` is only entered again on explicit shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Reader technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReaderKind {
    /// Line-oriented serial reader (card or book).
    SerialLine,

    /// PC/SC contactless reader.
    Contactless,

    /// Vendor UHF reader in active mode.
    VendorUhf,
}

impl fmt::Display for ReaderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SerialLine => write!(f, "Serial"),
            Self::Contactless => write!(f, "Contactless"),
            Self::VendorUhf => write!(f, "UHF"),
        }
    }
}

/// Event emitted by a driver to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceEvent {
    /// A non-empty trimmed line was read from a serial device.
    LineReceived { device: String, line: String },

    /// A card UID was read.
    UidFound { device: String, uid: String },

    /// A tag payload was read.
    TagFound { device: String, tag: String },

    /// The driver moved to a new connection state.
    StateChanged {
        device: String,
        state: ConnectionState,
    },
}

impl DeviceEvent {
    /// Name of the device that emitted the event.
    pub fn device(&self) -> &str {
        match self {
            Self::LineReceived { device, .. }
            | Self::UidFound { device, .. }
            | Self::TagFound { device, .. }
            | Self::StateChanged { device, .. } => device,
        }
    }
}

/// An identifier a device protocol recognized in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Uid(String),
    Tag(String),
}

impl Detection {
    /// Turn the detection into the event emitted for `device`.
    pub fn into_event(self, device: &str) -> DeviceEvent {
        match self {
            Self::Uid(uid) => DeviceEvent::UidFound {
                device: device.to_string(),
                uid,
            },
            Self::Tag(tag) => DeviceEvent::TagFound {
                device: device.to_string(),
                tag,
            },
        }
    }
}

/// Modem control lines asserted when a port is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortPolicy {
    pub dtr: bool,
    pub rts: bool,
}

/// Serial link settings for a line-oriented device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Literal port name or `auto:` selector.
    pub port: PortSelector,

    pub baud_rate: u32,

    /// Line terminator used when sending.
    pub newline: String,

    /// Upper bound for a single blocking read.
    pub read_timeout_ms: u64,

    /// Upper bound for a single write.
    pub write_timeout_ms: u64,

    /// Delay between a link fault and the next open attempt.
    pub reconnect_delay_ms: u64,

    pub dtr: bool,
    pub rts: bool,
}

impl LineConfig {
    /// Settings for the named port with every other field at its default.
    pub fn for_port(name: impl Into<String>) -> Self {
        Self {
            port: PortSelector::Named(name.into()),
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// DTR/RTS as configured.
    pub fn policy(&self) -> PortPolicy {
        PortPolicy {
            dtr: self.dtr,
            rts: self.rts,
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            port: PortSelector::Named("COM1".to_string()),
            baud_rate: DEFAULT_BAUD_RATE,
            newline: DEFAULT_NEWLINE.to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            dtr: true,
            rts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_config_defaults() {
        let config = LineConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.newline, "\n");
        assert_eq!(config.read_timeout(), Duration::from_millis(5000));
        assert_eq!(config.write_timeout(), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.policy(), PortPolicy { dtr: true, rts: true });
    }

    #[test]
    fn test_line_config_partial_document() {
        let config: LineConfig =
            serde_json::from_str(r#"{ "port": "auto:VID_1A86&PID_7523", "baud_rate": 9600 }"#)
                .unwrap();
        assert!(config.port.is_auto());
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.reconnect_delay_ms, 3000);
    }

    #[test]
    fn test_detection_into_event() {
        assert_eq!(
            Detection::Uid("04AB12CD".into()).into_event("card"),
            DeviceEvent::UidFound {
                device: "card".into(),
                uid: "04AB12CD".into()
            }
        );
        assert_eq!(
            Detection::Tag("ABC".into()).into_event("book").device(),
            "book"
        );
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
    }
}
