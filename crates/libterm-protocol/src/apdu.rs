//! PC/SC "get UID" exchange.
//!
//! Contactless readers answer the pseudo-APDU `FF CA 00 00 00` with the
//! card UID followed by a two-byte status word:
//!
//! ```text
//! ┌────────────────┬─────┬─────┐
//! │ UID (4-10 B)   │ SW1 │ SW2 │     90 00 = success
//! └────────────────┴─────┴─────┘
//! ```

pub use libterm_core::constants::GET_UID_APDU;
use libterm_core::constants::SW_SUCCESS;
use std::fmt;

/// ISO 7816 status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

impl StatusWord {
    #[must_use]
    pub fn is_success(&self) -> bool {
        [self.sw1, self.sw2] == SW_SUCCESS
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Outcome of a "get UID" response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidResponse {
    /// Success with a non-empty UID.
    Uid(Vec<u8>),

    /// Success status but no UID bytes.
    Empty,

    /// The reader answered with a non-success status word.
    Status(StatusWord),

    /// Fewer than two bytes came back.
    Malformed,
}

impl UidResponse {
    /// Split a response into UID and status word.
    ///
    /// ```
    /// use libterm_protocol::UidResponse;
    ///
    /// let response = [0x04, 0xAB, 0x12, 0xCD, 0x90, 0x00];
    /// assert_eq!(
    ///     UidResponse::parse(&response),
    ///     UidResponse::Uid(vec![0x04, 0xAB, 0x12, 0xCD])
    /// );
    /// ```
    #[must_use]
    pub fn parse(response: &[u8]) -> Self {
        let Some(split) = response.len().checked_sub(2) else {
            return Self::Malformed;
        };
        let (data, trailer) = response.split_at(split);
        let status = StatusWord {
            sw1: trailer[0],
            sw2: trailer[1],
        };

        if !status.is_success() {
            Self::Status(status)
        } else if data.is_empty() {
            Self::Empty
        } else {
            Self::Uid(data.to_vec())
        }
    }
}
