//! Identifier normalization.
//!
//! Drivers report identifiers verbatim. Before two reports can be compared
//! they are reduced to a canonical key by [`NormalizationRules`]:
//!
//! ```text
//! " 04-ab:12 cd\r"  ──normalize──►  "04AB12CD"
//! "UID=04AB12CD;OK" ──extract_hex_uid──►  "04AB12CD"
//! "304DB75F19600005000004D2" ──book_key (EPC on)──►  "05-1234"
//! ```

use crate::constants::{DEFAULT_CARD_UID_LENGTH, DEFAULT_MIN_HEX_UID_LEN, EPC_HEX_LEN};
use crate::epc;
use crate::hex;
use crate::types::{NormalizedIdentifier, TagKind};
use serde::{Deserialize, Serialize};

/// Rules for turning raw reader payloads into comparable keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Remove whitespace, `:` and `-` from payloads.
    pub strip_delimiters: bool,

    /// Uppercase payloads.
    pub uppercase: bool,

    /// Minimum run of hex digits accepted as a UID in free text.
    pub min_hex_len: usize,

    /// Decode 24-hex book payloads as EPC-96 and key books by library/serial.
    pub use_epc_book_key: bool,

    /// Hex digits kept when a UHF EPC stands in for a card UID (0 keeps all).
    pub card_uid_length: usize,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            strip_delimiters: true,
            uppercase: true,
            min_hex_len: DEFAULT_MIN_HEX_UID_LEN,
            use_epc_book_key: false,
            card_uid_length: DEFAULT_CARD_UID_LENGTH,
        }
    }
}

impl NormalizationRules {
    /// Normalize a payload into a key.
    ///
    /// Returns `None` when nothing is left after trimming and stripping.
    ///
    /// ```
    /// use libterm_core::NormalizationRules;
    ///
    /// let rules = NormalizationRules::default();
    /// let key = rules.normalize(" 04-ab:12 cd\r\n").unwrap();
    /// assert_eq!(key.as_str(), "04AB12CD");
    /// assert!(rules.normalize(" - : ").is_none());
    /// ```
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<NormalizedIdentifier> {
        let trimmed = raw.trim();
        let mut value: String = if self.strip_delimiters {
            trimmed
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
                .collect()
        } else {
            trimmed.to_string()
        };

        if self.uppercase {
            value.make_ascii_uppercase();
        }

        (!value.is_empty()).then(|| NormalizedIdentifier::new(value))
    }

    /// Pull a hex UID out of a free-text reader line.
    ///
    /// The whole line is tried first (with delimiters removed); failing
    /// that, the longest whitespace/`,`/`;`/`=` separated token made only
    /// of hex digits, `:` and `-` wins. Candidates shorter than
    /// `min_hex_len` digits are ignored. The result is uppercase.
    #[must_use]
    pub fn extract_hex_uid(&self, line: &str) -> Option<String> {
        let min = self.min_hex_len.max(1);

        if let Some(whole) = hex_candidate(line, |c| c.is_whitespace() || c == ':' || c == '-')
            && whole.len() >= min
        {
            return Some(whole);
        }

        line.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '='))
            .filter_map(|token| hex_candidate(token, |c| c == ':' || c == '-'))
            .filter(|candidate| candidate.len() >= min)
            .fold(None, |best: Option<String>, candidate| match best {
                Some(b) if b.len() >= candidate.len() => Some(b),
                _ => Some(candidate),
            })
    }

    /// Resolve the catalog key for a book payload.
    ///
    /// The first 24 hex digits of the payload are the tag key. When
    /// `use_epc_book_key` is set and those digits decode to a book EPC,
    /// the library/serial key (`05-1234`) is used instead.
    ///
    /// A tag key is always uppercase hex with every non-hex character
    /// dropped, whatever `uppercase` and `strip_delimiters` say. Only
    /// payloads with fewer than 24 hex digits go through
    /// [`normalize`](Self::normalize) and its flags.
    #[must_use]
    pub fn book_key(&self, raw: &str) -> Option<NormalizedIdentifier> {
        let digits = hex::hex_digits_upper(raw);
        if digits.len() >= EPC_HEX_LEN {
            let hex24 = &digits[..EPC_HEX_LEN];

            if self.use_epc_book_key
                && let Some(record) = epc::decode(hex24)
                && record.kind == TagKind::Book
            {
                return Some(NormalizedIdentifier::new(record.library_key()));
            }

            return Some(NormalizedIdentifier::new(hex24.to_string()));
        }

        self.normalize(raw)
    }

    /// Derive a card UID from a UHF EPC payload.
    ///
    /// Keeps the first `card_uid_length` hex digits (all of them when the
    /// length is zero).
    #[must_use]
    pub fn card_uid_from_epc(&self, epc_hex: &str) -> Option<NormalizedIdentifier> {
        let mut digits = hex::hex_digits_upper(epc_hex);
        if digits.is_empty() {
            return None;
        }
        if self.card_uid_length > 0 && digits.len() > self.card_uid_length {
            digits.truncate(self.card_uid_length);
        }
        Some(NormalizedIdentifier::new(digits))
    }
}

/// Strip `skip` characters from `text`; succeed only if what remains is
/// non-empty hex.
fn hex_candidate(text: &str, skip: impl Fn(char) -> bool) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if skip(c) {
            continue;
        }
        if !c.is_ascii_hexdigit() {
            return None;
        }
        out.push(c.to_ascii_uppercase());
    }
    (!out.is_empty()).then_some(out)
}
