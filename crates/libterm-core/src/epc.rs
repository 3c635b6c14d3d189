//! EPC-96 decoder for library tags.
//!
//! Decoding is a pure function of its input. A payload that is not a
//! library tag yields `None`, never a record with default fields, so
//! callers can drop it without further checks.
//!
//! ```
//! use libterm_core::{epc, TagKind};
//!
//! let record = epc::decode("304DB75F19600005F0000001").unwrap();
//! assert_eq!(record.kind, TagKind::Card);
//! assert_eq!(record.library_code, 5);
//! assert_eq!(record.serial, 1);
//!
//! assert!(epc::decode("E2801160600002085A4C1C33").is_none());
//! ```

use crate::constants::{EPC_BYTE_LEN, EPC_HEADER, EPC_HEX_LEN, EPC_SERIAL_MASK};
use crate::hex;
use crate::types::TagKind;
use serde::Serialize;

/// Fields of a decoded library tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EpcRecord {
    pub kind: TagKind,
    pub library_code: u16,
    pub serial: u32,
    /// The 24 hex characters the record was decoded from.
    pub raw_hex: String,
}

impl EpcRecord {
    /// Catalog key derived from the library code and serial (`05-1234`).
    #[must_use]
    pub fn library_key(&self) -> String {
        format!("{:02}-{}", self.library_code, self.serial)
    }
}

/// Decode a 24-character hex string into an [`EpcRecord`].
///
/// Returns `None` when the length is wrong, a character is not hex, or
/// the first six bytes differ from [`EPC_HEADER`].
#[must_use]
pub fn decode(epc_hex: &str) -> Option<EpcRecord> {
    if epc_hex.len() != EPC_HEX_LEN {
        return None;
    }

    let bytes = hex::decode(epc_hex)?;
    debug_assert_eq!(bytes.len(), EPC_BYTE_LEN);

    let (header, body) = bytes.split_at(EPC_HEADER.len());
    if header != EPC_HEADER {
        return None;
    }

    let low48 = body
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

    let library_code = ((low48 >> 32) & 0xFFFF) as u16;
    let kind = TagKind::from_nibble(((low48 >> 28) & 0x0F) as u8);
    let serial = (low48 & EPC_SERIAL_MASK) as u32;

    Some(EpcRecord {
        kind,
        library_code,
        serial,
        raw_hex: epc_hex.to_string(),
    })
}
