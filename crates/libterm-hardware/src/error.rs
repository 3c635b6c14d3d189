//! Error types for hardware operations.
//!
//! Only startup and explicit command failures surface as [`HardwareError`].
//! Faults inside a running driver loop (read timeouts, busy readers, empty
//! polls, dropped links) are logged and retried by the loop itself.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The device link is down, so a command could not be sent.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Another driver in this process already owns the port.
    #[error("Port already in use: {port}")]
    PortInUse { port: String },

    #[error("Device already running: {device}")]
    AlreadyRunning { device: String },

    /// No port/baud/address combination opened the vendor reader.
    #[error("No combination opened the reader after {attempts} attempts (last code {last_code})")]
    ProbeExhausted { last_code: i32, attempts: usize },

    /// The driver could not be brought up after its port opened.
    #[error("Failed to start {device}: {message}")]
    StartFailed { device: String, message: String },

    #[error("Invalid reader configuration: {message}")]
    InvalidConfig { message: String },
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn port_in_use(port: impl Into<String>) -> Self {
        Self::PortInUse { port: port.into() }
    }

    pub fn already_running(device: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            device: device.into(),
        }
    }

    pub fn probe_exhausted(last_code: i32, attempts: usize) -> Self {
        Self::ProbeExhausted {
            last_code,
            attempts,
        }
    }

    pub fn start_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StartFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
