//! Serial ports through the `serialport` crate.

use crate::traits::{LinePort, LineTransport, PortReader, PortWriter, SerialPorts};
use crate::types::{LineConfig, PortPolicy};
use libterm_core::constants::UHF_NUDGE_TIMEOUT_MS;
use libterm_core::PortDescriptor;
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Cap on a single blocking read so stop requests and idle flushes stay
/// responsive whatever the configured read timeout.
const MAX_READ_BLOCK: Duration = Duration::from_millis(100);

/// Every serial port the system reports, with USB details when known.
pub fn describe_ports() -> Vec<PortDescriptor> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "Failed to list serial ports");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) => PortDescriptor {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
                manufacturer: usb.manufacturer,
            },
            _ => PortDescriptor::named(info.port_name),
        })
        .collect()
}

fn open_port(name: &str, baud_rate: u32, timeout: Duration) -> io::Result<Box<dyn SerialPort>> {
    let port = serialport::new(name, baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()?;
    Ok(port)
}

/// Opens system serial ports for line drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialLineTransport;

/// Timeouts for the read and write handles of a line port.
///
/// Reads are capped at [`MAX_READ_BLOCK`]; writes use the configured
/// write timeout as is.
fn half_timeouts(config: &LineConfig) -> (Duration, Duration) {
    (
        config.read_timeout().min(MAX_READ_BLOCK),
        config.write_timeout(),
    )
}

impl LineTransport for SerialLineTransport {
    fn open(&self, config: &LineConfig, policy: PortPolicy) -> io::Result<LinePort> {
        let name = self.resolve(&config.port)?;
        let (read_timeout, write_timeout) = half_timeouts(config);

        let mut port = open_port(&name, config.baud_rate, read_timeout)?;
        port.write_data_terminal_ready(policy.dtr)?;
        port.write_request_to_send(policy.rts)?;
        let mut writer = port.try_clone()?;
        writer.set_timeout(write_timeout)?;

        Ok(LinePort {
            name,
            reader: Box::new(SerialHalf(port)),
            writer: Box::new(SerialHalf(writer)),
        })
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        describe_ports()
    }
}

struct SerialHalf(Box<dyn SerialPort>);

impl PortReader for SerialHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl PortWriter for SerialHalf {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_all(bytes)?;
        self.0.flush()
    }
}

/// System port enumeration and nudging.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialPorts;

impl SerialPorts for SystemSerialPorts {
    fn list(&self) -> Vec<PortDescriptor> {
        describe_ports()
    }

    fn nudge(&self, port: &str, baud_rate: u32, hold: Duration) -> io::Result<()> {
        let mut serial = open_port(port, baud_rate, Duration::from_millis(UHF_NUDGE_TIMEOUT_MS))?;
        serial.write_data_terminal_ready(true)?;
        serial.write_request_to_send(true)?;
        thread::sleep(hold);
        drop(serial);
        debug!(port, baud = baud_rate, "Port nudged");
        Ok(())
    }
}
