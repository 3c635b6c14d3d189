//! Serial line device auto-detection.
//!
//! Readers that stream continuously (book and card readers in continuous
//! mode) can be found without configuration: open each port at each baud
//! rate, listen for a while and take the first combination that produces
//! any bytes. The CR/LF bytes seen tell the newline convention.
//!
//! [`resolve_detected`] applies this to a [`LineConfig`] whose port is
//! [`PortSelector::Detect`].

use crate::traits::{LineTransport, SerialPorts};
use crate::types::LineConfig;
use libterm_core::PortSelector;
use libterm_core::constants::{LINE_DETECT_BAUD_RATES, LINE_DETECT_LISTEN_MS};
use libterm_protocol::NewlineSniffer;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest single read while listening.
const LISTEN_READ_TIMEOUT_MS: u64 = 100;

/// A port/baud pair that produced traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedDevice {
    pub port: String,
    pub baud_rate: u32,
    pub newline: &'static str,
}

/// Baud rates tried when none are given.
pub fn default_detect_bauds() -> Vec<u32> {
    LINE_DETECT_BAUD_RATES.to_vec()
}

/// Find the first port and baud rate on which a device talks.
pub fn detect_line_device(
    transport: &dyn LineTransport,
    ports: &[String],
    bauds: &[u32],
    listen: Duration,
) -> Option<DetectedDevice> {
    for port in ports {
        for &baud_rate in bauds {
            let config = LineConfig {
                baud_rate,
                read_timeout_ms: LISTEN_READ_TIMEOUT_MS,
                ..LineConfig::for_port(port.as_str())
            };

            match listen_on(transport, &config, listen) {
                Ok(Some(newline)) => {
                    info!(port = %port, baud = baud_rate, newline = ?newline, "Line device detected");
                    return Some(DetectedDevice {
                        port: port.clone(),
                        baud_rate,
                        newline,
                    });
                }
                Ok(None) => debug!(port = %port, baud = baud_rate, "No traffic"),
                Err(e) => {
                    debug!(port = %port, baud = baud_rate, error = %e, "Port unusable");
                    break;
                }
            }
        }
    }
    None
}

/// Replace a `detect` port in `line` with the first port that talks.
///
/// Configs naming a port are returned unchanged. Detection listens on
/// every enumerated port at the default baud rates and takes over the
/// detected baud rate and newline. `None` if nothing talked.
pub fn resolve_detected(
    line: &LineConfig,
    transport: &dyn LineTransport,
    ports: &dyn SerialPorts,
) -> Option<LineConfig> {
    if !line.port.is_detect() {
        return Some(line.clone());
    }

    let names: Vec<String> = ports.list().into_iter().map(|p| p.name).collect();
    let listen = Duration::from_millis(LINE_DETECT_LISTEN_MS);
    let Some(found) = detect_line_device(transport, &names, &default_detect_bauds(), listen) else {
        info!(ports = names.len(), "No line device detected");
        return None;
    };

    Some(LineConfig {
        port: PortSelector::Named(found.port),
        baud_rate: found.baud_rate,
        newline: found.newline.to_string(),
        ..line.clone()
    })
}

/// Listen on one port; `Some(newline)` if anything arrived.
fn listen_on(
    transport: &dyn LineTransport,
    config: &LineConfig,
    listen: Duration,
) -> io::Result<Option<&'static str>> {
    let mut port = transport.open(config, config.policy())?;
    let deadline = Instant::now() + listen;
    let mut sniffer = NewlineSniffer::new();
    let mut chunk = [0u8; 256];

    while Instant::now() < deadline {
        let n = match port.reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(e),
        };
        sniffer.feed(&chunk[..n]);
        if chunk[..n].iter().any(|b| matches!(b, b'\r' | b'\n')) {
            break;
        }
    }

    Ok((sniffer.bytes_seen() > 0).then(|| sniffer.newline()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLineTransport, MockSerialPorts};

    #[test]
    fn test_detects_first_talking_combination() {
        let (transport, handle) = MockLineTransport::new();
        handle.push_bytes(b"304DB75F19600005000004D2\r\n");

        let detected = detect_line_device(
            &transport,
            &["COM3".to_string(), "COM4".to_string()],
            &default_detect_bauds(),
            Duration::from_millis(200),
        );

        assert_eq!(
            detected,
            Some(DetectedDevice {
                port: "COM3".into(),
                baud_rate: 115_200,
                newline: "\r\n",
            })
        );
        assert_eq!(handle.open_count(), 1);
    }

    #[test]
    fn test_silent_ports_not_detected() {
        let (transport, handle) = MockLineTransport::new();

        let detected = detect_line_device(
            &transport,
            &["COM3".to_string()],
            &[9600, 19200],
            Duration::from_millis(40),
        );

        assert_eq!(detected, None);
        assert_eq!(handle.open_count(), 2);
    }

    #[test]
    fn test_unopenable_port_skipped() {
        let (transport, handle) = MockLineTransport::new();
        handle.set_available(false);

        let detected = detect_line_device(
            &transport,
            &["COM3".to_string()],
            &[9600, 19200],
            Duration::from_millis(40),
        );

        assert_eq!(detected, None);
        assert_eq!(handle.open_count(), 0);
    }

    #[test]
    fn test_detect_port_replaced_by_talking_port() {
        let (transport, handle) = MockLineTransport::new();
        handle.set_present(&["COM4"]);
        handle.push_bytes(b"UID: 04AB12CD\n");
        let ports = MockSerialPorts::named(&["COM3", "COM4"]);

        let line = LineConfig {
            port: PortSelector::Detect,
            reconnect_delay_ms: 50,
            ..LineConfig::default()
        };
        let resolved = resolve_detected(&line, &transport, &ports).unwrap();

        assert_eq!(resolved.port, PortSelector::Named("COM4".into()));
        assert_eq!(resolved.baud_rate, 115_200);
        assert_eq!(resolved.newline, "\n");
        assert_eq!(resolved.reconnect_delay_ms, 50);
        assert_eq!(handle.opened_ports(), vec!["COM4"]);
    }

    #[test]
    fn test_named_port_not_detected() {
        let (transport, handle) = MockLineTransport::new();
        let ports = MockSerialPorts::named(&["COM3"]);
        let line = LineConfig::for_port("COM7");

        assert_eq!(resolve_detected(&line, &transport, &ports), Some(line));
        assert_eq!(handle.open_count(), 0);
    }
}
