//! Hex helpers for identifiers.
//!
//! Readers report identifiers in several textual shapes (`04AB12CD`,
//! `04-AB-12-CD`, `04:ab:12:cd`). These helpers produce and parse the
//! forms used inside the pipeline.

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Encode bytes as contiguous uppercase hex.
///
/// ```
/// assert_eq!(libterm_core::hex::encode_upper(&[0x04, 0xAB]), "04AB");
/// ```
#[must_use]
pub fn encode_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_UPPER[(b >> 4) as usize] as char);
        out.push(HEX_UPPER[(b & 0x0F) as usize] as char);
    }
    out
}

/// Encode bytes as dash-separated uppercase hex pairs (`04-AB-12`).
///
/// This is the shape the contactless driver emits.
///
/// ```
/// assert_eq!(libterm_core::hex::encode_dashed(&[0x04, 0xAB, 0x12]), "04-AB-12");
/// ```
#[must_use]
pub fn encode_dashed(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, &b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.push(HEX_UPPER[(b >> 4) as usize] as char);
        out.push(HEX_UPPER[(b & 0x0F) as usize] as char);
    }
    out
}

/// Decode contiguous hex (either case) into bytes.
///
/// Returns `None` for odd lengths or non-hex characters.
#[must_use]
pub fn decode(hex: &str) -> Option<Vec<u8>> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks_exact(2)
        .map(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

/// Keep only the hex digits of `s`, uppercased.
#[must_use]
pub fn hex_digits_upper(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
