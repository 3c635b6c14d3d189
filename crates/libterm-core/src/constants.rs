//! Constants shared by the terminal's drivers and event gate.
//!
//! Hardware defaults mirror the values the kiosk has been deployed with.
//! Driver configuration structs use them for their `Default` impls, so a
//! config document only needs to spell out what differs on a given site.
//!
//! # Tag layout
//!
//! Library tags carry a 96-bit EPC with a fixed six-byte header:
//!
//! ```text
//! | 30 4D B7 5F 19 60 | LL LL | K S S S S S S S |
//! |   header (48b)    | lib   | kind + serial   |
//! ```
//!
//! | Field | Bits | Meaning |
//! |-------|------|---------|
//! | header | 95-48 | must equal [`EPC_HEADER`] |
//! | library | 47-32 | library code, 0-65535 |
//! | kind | 31-28 | `0` book, `F` card, anything else unknown |
//! | serial | 27-0 | item serial, 0-268435455 |
//!
//! # Usage
//!
//! ```
//! use libterm_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(EPC_HEX_LEN, 24);
//! let delay = Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS);
//! assert_eq!(delay.as_secs(), 3);
//! ```

// ============================================================================
// EPC-96
// ============================================================================

/// Fixed header that marks a tag as belonging to the library system.
pub const EPC_HEADER: [u8; 6] = [0x30, 0x4D, 0xB7, 0x5F, 0x19, 0x60];

/// Length of an EPC-96 payload in hex characters.
pub const EPC_HEX_LEN: usize = 24;

/// Length of an EPC-96 payload in bytes.
pub const EPC_BYTE_LEN: usize = 12;

/// Kind nibble for a book tag.
pub const EPC_KIND_BOOK: u8 = 0x0;

/// Kind nibble for a patron card tag.
pub const EPC_KIND_CARD: u8 = 0xF;

/// Mask for the 28-bit serial field.
pub const EPC_SERIAL_MASK: u64 = 0x0FFF_FFFF;

// ============================================================================
// Contactless (PC/SC)
// ============================================================================

/// "Get data / UID" pseudo-APDU understood by PC/SC contactless readers.
pub const GET_UID_APDU: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// Status word returned on success.
pub const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Receive buffer size for the UID response.
pub const UID_RESPONSE_CAPACITY: usize = 64;

/// Reader name fragment preferred when several readers are attached.
///
/// Dual-interface readers expose a contact and a contactless slot; the
/// contactless one carries "PICC" in its name.
pub const DEFAULT_PREFERRED_READER: &str = "PICC";

/// Delay between polling cycles in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Connect attempts per polling cycle.
pub const DEFAULT_CONNECT_RETRIES: u32 = 10;

/// Wait after a sharing violation before the next connect attempt.
pub const DEFAULT_BUSY_RETRY_DELAY_MS: u64 = 300;

// ============================================================================
// Serial line devices
// ============================================================================

/// Default baud rate for line-oriented serial readers.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default line terminator written after each command.
pub const DEFAULT_NEWLINE: &str = "\n";

/// Default read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Default write timeout in milliseconds.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1_000;

/// Delay before reopening a port after a fault.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

/// A partial line is delivered after this much input silence.
pub const LINE_IDLE_FLUSH_MS: u64 = 250;

/// Lines longer than this without a terminator are discarded.
pub const MAX_LINE_LENGTH: usize = 4 * 1024;

/// Upper bound on how long `stop()` waits for a driver thread.
pub const STOP_JOIN_TIMEOUT_MS: u64 = 1_000;

/// Delay before and after a reader init command.
pub const DEFAULT_INIT_DELAY_MS: u64 = 100;

/// Minimum number of hex digits accepted as a UID in free text.
pub const DEFAULT_MIN_HEX_UID_LEN: usize = 8;

/// Baud rates tried, in order, when auto-detecting a line reader.
pub const LINE_DETECT_BAUD_RATES: [u32; 4] = [115_200, 57_600, 38_400, 9_600];

/// How long auto-detection listens on each port/baud pair.
pub const LINE_DETECT_LISTEN_MS: u64 = 2_200;

// ============================================================================
// Cabinet actuator
// ============================================================================

/// Beep duration used for status feedback.
pub const DEFAULT_BEEP_MS: u32 = 120;

/// How long the space query waits for an answer.
pub const DEFAULT_SPACE_REPLY_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Vendor UHF reader
// ============================================================================

/// Default COM port number of the UHF reader.
pub const DEFAULT_UHF_PORT: &str = "COM5";

/// Default baud rate of the UHF reader.
pub const DEFAULT_UHF_BAUD_RATE: u32 = 57_600;

/// Default device address of the UHF reader.
pub const DEFAULT_UHF_ADDRESS: u8 = 0x00;

/// Addresses tried after the configured one. `0xFF` is broadcast.
pub const UHF_FALLBACK_ADDRESSES: [u8; 2] = [0xFF, 0x00];

/// Baud rates tried after the configured one.
pub const UHF_FALLBACK_BAUD_RATES: [u32; 5] = [115_200, 57_600, 38_400, 19_200, 9_600];

/// Delay between active-mode reads.
pub const DEFAULT_UHF_POLL_INTERVAL_MS: u64 = 100;

/// Shortest tag frame payload accepted from the reader.
pub const UHF_MIN_FRAME_LEN: u8 = 8;

/// Longest tag frame payload accepted from the reader.
pub const UHF_MAX_FRAME_LEN: u8 = 64;

/// Receive buffer size for active-mode reads.
pub const UHF_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Return code reported when no open call was attempted.
pub const UHF_RC_PORT_NOT_OPEN: i32 = 48;

/// How long a nudge keeps the port open.
pub const UHF_NUDGE_HOLD_MS: u64 = 120;

/// Read/write timeout used while nudging a port.
pub const UHF_NUDGE_TIMEOUT_MS: u64 = 250;

/// Empty polls between "no tags" diagnostics.
pub const UHF_SILENT_POLLS_LOG_EVERY: u32 = 25;

// ============================================================================
// Event gate
// ============================================================================

/// Debounce window for book take/return channels.
pub const DEFAULT_BOOK_DEBOUNCE_MS: u64 = 800;

/// Debounce window for the card channel.
pub const DEFAULT_CARD_DEBOUNCE_MS: u64 = 250;

/// Number of hex digits kept when a UHF EPC is used as a card UID.
pub const DEFAULT_CARD_UID_LENGTH: usize = 24;

/// Capacity of the reader manager's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;
