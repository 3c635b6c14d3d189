//! Cabinet actuators.
//!
//! The cabinet controller speaks short text lines over serial:
//!
//! | Host sends  | Meaning                         | Reply          |
//! |-------------|---------------------------------|----------------|
//! | `OK`        | success indication              |                |
//! | `ERR`       | failure indication              |                |
//! | `BEEP:<ms>` | sound the buzzer                |                |
//! | `OPEN`      | open the return bin             |                |
//! | `SPACE?`    | is there room in the bin        | `SPACE:0\|1`   |
//!
//! Everything except the space query is fire-and-forget. An unanswered
//! space query counts as "has space" so a silent controller never blocks
//! returns.

use crate::error::{HardwareError, Result};
use crate::line::{LineDriver, LineHooks, LineLink, escape_controls};
use crate::traits::{CabinetActuator, LineTransport, ReaderDevice};
use crate::types::{Detection, LineConfig, PortPolicy};
use libterm_core::constants::DEFAULT_SPACE_REPLY_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Actuator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    #[serde(flatten)]
    pub line: LineConfig,

    /// Assert DTR/RTS on open. The controller resets when DTR rises, so
    /// the lines stay low unless this is set; `line.dtr`/`line.rts` are
    /// not consulted.
    pub assert_modem_lines: bool,

    /// How long to wait for a `SPACE:` reply.
    pub reply_timeout_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            line: LineConfig::default(),
            assert_modem_lines: false,
            reply_timeout_ms: DEFAULT_SPACE_REPLY_TIMEOUT_MS,
        }
    }
}

/// Actuator used when no cabinet is connected: logs and reports space.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

impl CabinetActuator for NullActuator {
    fn has_space(&self) -> bool {
        debug!("No actuator, assuming space");
        true
    }

    fn open_bin(&self) -> Result<()> {
        info!("No actuator, open bin skipped");
        Ok(())
    }

    fn send_ok(&self) {
        debug!("No actuator: OK");
    }

    fn send_error(&self) {
        debug!("No actuator: ERR");
    }

    fn send_beep(&self, duration_ms: u32) {
        debug!(duration_ms, "No actuator: BEEP");
    }
}

/// Parse a `SPACE:0|1` reply.
pub fn parse_space_reply(line: &str) -> Option<bool> {
    let (key, value) = line.trim().split_once(':')?;
    if !key.trim().eq_ignore_ascii_case("SPACE") {
        return None;
    }
    match value.trim() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

type ReplySlot = Arc<Mutex<Option<Sender<bool>>>>;

/// Line hooks of the cabinet controller.
#[derive(Debug)]
pub struct ActuatorProtocol {
    pending: ReplySlot,
    modem_lines: bool,
}

impl LineHooks for ActuatorProtocol {
    fn port_policy(&self, _config: &LineConfig) -> PortPolicy {
        PortPolicy {
            dtr: self.modem_lines,
            rts: self.modem_lines,
        }
    }

    fn on_line(&mut self, line: &str, _link: &LineLink) -> Option<Detection> {
        debug!(rx = %escape_controls(line), "Actuator RX");

        if let Some(space) = parse_space_reply(line) {
            let waiter = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(waiter) = waiter {
                let _ = waiter.send(space);
            }
        }
        None
    }
}

/// Cabinet controller on a serial port.
///
/// The port is kept open by a [`LineDriver`], so a controller that is
/// unplugged and replugged comes back on its own.
#[derive(Debug)]
pub struct SerialActuator {
    driver: LineDriver<ActuatorProtocol>,
    pending: ReplySlot,
    reply_timeout: Duration,
}

impl SerialActuator {
    pub fn new(
        name: impl Into<String>,
        config: &ActuatorConfig,
        transport: Arc<dyn LineTransport>,
    ) -> Self {
        let pending: ReplySlot = Arc::new(Mutex::new(None));
        let hooks = ActuatorProtocol {
            pending: Arc::clone(&pending),
            modem_lines: config.assert_modem_lines,
        };
        Self {
            driver: LineDriver::new(name, config.line.clone(), transport, hooks),
            pending,
            reply_timeout: Duration::from_millis(config.reply_timeout_ms),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.driver.start()
    }

    pub fn stop(&mut self) {
        self.driver.stop();
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_open()
    }

    fn send(&self, command: &str) -> bool {
        debug!(device = %self.driver.name(), tx = %escape_controls(command), "Actuator TX");
        self.driver.send_line(command)
    }
}

impl CabinetActuator for SerialActuator {
    fn has_space(&self) -> bool {
        let (tx, rx) = mpsc::channel();
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        if !self.send("SPACE?") {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            debug!("Actuator offline, assuming space");
            return true;
        }

        match rx.recv_timeout(self.reply_timeout) {
            Ok(space) => space,
            Err(_) => {
                debug!(
                    timeout_ms = self.reply_timeout.as_millis() as u64,
                    "No space reply, assuming space"
                );
                true
            }
        }
    }

    fn open_bin(&self) -> Result<()> {
        if self.send("OPEN") {
            Ok(())
        } else {
            Err(HardwareError::disconnected(self.driver.name()))
        }
    }

    fn send_ok(&self) {
        self.send("OK");
    }

    fn send_error(&self) {
        self.send("ERR");
    }

    fn send_beep(&self, duration_ms: u32) {
        self.send(&format!("BEEP:{duration_ms}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("SPACE:1", Some(true))]
    #[case(" space : 0 ", Some(false))]
    #[case("SPACE:2", None)]
    #[case("OK", None)]
    #[case("BEEP:120", None)]
    fn test_parse_space_reply(#[case] line: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_space_reply(line), expected);
    }

    #[test]
    fn test_null_actuator_reports_space() {
        let actuator = NullActuator;
        assert!(actuator.has_space());
        assert!(actuator.open_bin().is_ok());
    }

    #[test]
    fn test_protocol_delivers_reply_once() {
        let pending: ReplySlot = Arc::new(Mutex::new(None));
        let mut protocol = ActuatorProtocol {
            pending: Arc::clone(&pending),
            modem_lines: false,
        };
        let (tx, rx) = mpsc::channel();
        *pending.lock().unwrap() = Some(tx);

        let link = LineLink::new("cabinet", "\n");
        assert_eq!(protocol.on_line("SPACE:0", &link), None);
        assert_eq!(rx.try_recv(), Ok(false));
        assert!(pending.lock().unwrap().is_none());
    }

    #[test]
    fn test_modem_lines_low_unless_asserted() {
        let config: ActuatorConfig =
            serde_json::from_str(r#"{ "port": "COM4", "dtr": true }"#).unwrap();
        assert!(!config.assert_modem_lines);
        assert_eq!(config.reply_timeout_ms, 500);

        let protocol = ActuatorProtocol {
            pending: Arc::default(),
            modem_lines: config.assert_modem_lines,
        };
        assert_eq!(
            protocol.port_policy(&config.line),
            PortPolicy {
                dtr: false,
                rts: false
            }
        );

        let asserted = ActuatorProtocol {
            pending: Arc::default(),
            modem_lines: true,
        };
        assert_eq!(
            asserted.port_policy(&config.line),
            PortPolicy {
                dtr: true,
                rts: true
            }
        );
    }
}
