//! Common test utilities for protocol integration tests.
//!
//! Helpers here build reader buffers the way the hardware produces them,
//! so tests can state expectations in terms of tag payloads instead of
//! hand-counted byte arrays.

#![allow(dead_code)]

/// Encode payloads as a vendor active-mode buffer (`[len][payload]...`).
pub fn active_mode_buffer(payloads: &[Vec<u8>]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for payload in payloads {
        buffer.push(u8::try_from(payload.len()).expect("payload longer than 255 bytes"));
        buffer.extend_from_slice(payload);
    }
    buffer
}

/// Uppercase hex of a payload, as the extractor reports it.
pub fn hex(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{b:02X}")).collect()
}

/// A library EPC-96 tag with the given library code and serial.
pub fn library_epc(library: u16, kind: u8, serial: u32) -> Vec<u8> {
    let low48 = (u64::from(library) << 32) | (u64::from(kind & 0xF) << 28) | u64::from(serial & 0x0FFF_FFFF);
    let mut bytes = vec![0x30, 0x4D, 0xB7, 0x5F, 0x19, 0x60];
    bytes.extend_from_slice(&low48.to_be_bytes()[2..]);
    bytes
}
