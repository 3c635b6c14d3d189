//! Integration tests for the vendor UHF driver and its open search.

mod common;

use common::{EventLog, SETTLE, wait_until};
use libterm_hardware::mock::{MockSerialPorts, MockUhfVendor, VendorCall};
use libterm_hardware::traits::ReaderDevice;
use libterm_hardware::uhf::ProbeStage;
use libterm_hardware::{ConnectionState, HardwareError, UhfConfig, UhfDriver};
use std::sync::Arc;

const BAUD_57600: u8 = 3;
const BAUD_115200: u8 = 4;

const BOOK_FRAME: [u8; 13] = [
    12, 0x30, 0x4D, 0xB7, 0x5F, 0x19, 0x60, 0x00, 0x05, 0x00, 0x00, 0x04, 0xD2,
];

fn fast_config() -> UhfConfig {
    UhfConfig {
        poll_interval_ms: 5,
        ..UhfConfig::default()
    }
}

fn driver(vendor: &MockUhfVendor, ports: &MockSerialPorts, config: UhfConfig) -> UhfDriver {
    UhfDriver::new(
        "uhf",
        config,
        Arc::new(vendor.clone()),
        Arc::new(ports.clone()),
    )
}

#[test]
fn test_exact_combination_opens_first() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_reader(5, BAUD_57600, 0x00);
    let ports = MockSerialPorts::named(&["COM3", "COM5"]);

    let mut reader = driver(&vendor, &ports, fast_config());
    reader.start().unwrap();

    assert_eq!(
        handle.open_calls(),
        vec![VendorCall::OpenPort {
            port: 5,
            address: 0x00,
            baud_code: BAUD_57600
        }]
    );
    let opened = reader.opened_port().unwrap();
    assert_eq!(opened.port, 5);
    assert_eq!(reader.state(), ConnectionState::Open);
    assert_eq!(ports.nudged(), vec![("COM5".to_string(), 57600)]);

    let calls = handle.calls();
    assert!(calls.contains(&VendorCall::SetActiveMode {
        address: 0x00,
        index: opened.index
    }));
    assert!(calls.contains(&VendorCall::ClearTagBuffer {
        address: 0x00,
        index: opened.index
    }));
    reader.stop();
}

#[test]
fn test_exhaustive_search_finds_moved_reader() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_reader(3, BAUD_115200, 0x00);
    let ports = MockSerialPorts::named(&["COM3"]);

    let mut reader = driver(&vendor, &ports, fast_config());
    reader.start().unwrap();

    let report = reader.last_probe().unwrap();
    // exact: 2 addresses; COM5 remaining bauds: 4 x 2; COM3 at 57600: 2; hit.
    assert_eq!(report.attempts.len(), 2 + 8 + 2 + 1);
    let last = report.attempts.last().unwrap();
    assert_eq!(last.stage, ProbeStage::Exhaustive);
    assert_eq!(last.port, Some(3));
    assert_eq!(last.code, 0);
    assert_eq!(reader.opened_port().unwrap().port, 3);
    assert_eq!(ports.nudged().len(), report.attempts.len());
    reader.stop();
}

#[test]
fn test_echoed_address_used_afterwards() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_reader(5, BAUD_57600, 0x05);
    let ports = MockSerialPorts::default();

    let mut reader = driver(&vendor, &ports, fast_config());
    reader.start().unwrap();

    assert_eq!(
        handle.open_calls().last(),
        Some(&VendorCall::OpenPort {
            port: 5,
            address: 0xFF,
            baud_code: BAUD_57600
        })
    );
    let opened = reader.opened_port().unwrap();
    assert_eq!(opened.address, 0x05);
    assert!(handle.calls().contains(&VendorCall::SetActiveMode {
        address: 0x05,
        index: opened.index
    }));
    reader.stop();
}

#[test]
fn test_auto_detect_is_last_resort() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_hidden_reader(9, BAUD_57600, 0x00);
    let ports = MockSerialPorts::default();

    let mut reader = driver(&vendor, &ports, fast_config());
    reader.start().unwrap();

    let report = reader.last_probe().unwrap();
    let last = report.attempts.last().unwrap();
    assert_eq!(last.stage, ProbeStage::Auto);
    assert_eq!(last.port, Some(9));
    assert_eq!(reader.opened_port().unwrap().port, 9);

    reader.stop();
    assert!(handle.calls().contains(&VendorCall::CloseSpecificPort(9)));
}

#[test]
fn test_exhausted_search_reports_last_code() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.set_open_failure(0x35);
    let ports = MockSerialPorts::default();

    let mut reader = driver(&vendor, &ports, fast_config());
    let result = reader.start();

    match result {
        Err(HardwareError::ProbeExhausted {
            last_code,
            attempts,
        }) => {
            assert_eq!(last_code, 0x35);
            // one port: 5 bauds x 2 addresses direct, the same again auto
            assert_eq!(attempts, 20);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(reader.state(), ConnectionState::Disconnected);
    assert!(reader.opened_port().is_none());
}

#[test]
fn test_active_mode_rejection_closes_port() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_reader(5, BAUD_57600, 0x00);
    handle.fail_active_mode(0x07);
    let ports = MockSerialPorts::default();

    let mut reader = driver(&vendor, &ports, fast_config());
    assert!(matches!(
        reader.start(),
        Err(HardwareError::StartFailed { .. })
    ));
    assert!(handle.calls().contains(&VendorCall::CloseSpecificPort(5)));
    assert_eq!(reader.state(), ConnectionState::Disconnected);
}

#[test]
fn test_frames_emitted_as_tags() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_reader(5, BAUD_57600, 0x00);
    let ports = MockSerialPorts::default();

    let mut buffer = BOOK_FRAME.to_vec();
    buffer.extend_from_slice(&[0xFF, 0x01]);
    handle.push_read(buffer);

    let mut reader = driver(&vendor, &ports, fast_config());
    let log = EventLog::attach(reader.events());
    reader.start().unwrap();

    assert!(wait_until(SETTLE, || !log.tags().is_empty()));
    assert_eq!(log.tags(), vec!["304DB75F19600005000004D2"]);
    reader.stop();
}

#[test]
fn test_frames_at_length_limits_share_one_read() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_reader(5, BAUD_57600, 0x00);
    let ports = MockSerialPorts::default();

    let shortest = [0xE2, 0x00, 0x34, 0x12, 0x01, 0x23, 0x45, 0x67];
    let longest: Vec<u8> = (0..64).collect();
    let mut buffer = vec![8];
    buffer.extend_from_slice(&shortest);
    buffer.push(64);
    buffer.extend_from_slice(&longest);
    // Length byte of a frame cut off by the read.
    buffer.push(12);
    handle.push_read(buffer);

    let mut reader = driver(&vendor, &ports, fast_config());
    let log = EventLog::attach(reader.events());
    reader.start().unwrap();

    assert!(wait_until(SETTLE, || log.tags().len() >= 2));
    let longest_hex: String = longest.iter().map(|b| format!("{b:02X}")).collect();
    assert_eq!(log.tags(), vec!["E200341201234567".to_string(), longest_hex]);
    reader.stop();
    assert_eq!(log.tags().len(), 2);
}

#[test]
fn test_stop_uses_generic_close_without_port_number() {
    let (vendor, handle) = MockUhfVendor::new();
    handle.attach_hidden_reader(0, BAUD_57600, 0x00);
    let ports = MockSerialPorts::default();

    let mut reader = driver(&vendor, &ports, fast_config());
    reader.start().unwrap();
    assert!(wait_until(SETTLE, || handle.read_count() > 0));

    reader.stop();
    let calls = handle.calls();
    assert!(calls.contains(&VendorCall::ClosePort));
    assert!(!calls.iter().any(|c| matches!(c, VendorCall::CloseSpecificPort(_))));
    assert_eq!(reader.state(), ConnectionState::Disconnected);
}
