//! Line assembly for text-protocol serial devices.
//!
//! Serial readers and the cabinet controller talk in text lines, but
//! firmware disagrees about terminators: some send `\r\n`, some a bare
//! `\r` or `\n`, some a custom byte, and some none at all until the next
//! read. [`LineAssembler`] accepts any of `\r`, `\n` or the first byte of
//! the configured newline, skips the empty segments a `\r\n` pair
//! produces, and hands out a pending partial line once input has been
//! idle long enough.
//!
//! ```text
//! bytes:  "04AB\r\n12CD\r\n99"      (idle 250 ms)
//! lines:  "04AB", "12CD",          "99"
//! ```
//!
//! # Usage
//!
//! ```
//! use libterm_protocol::LineAssembler;
//! use std::time::{Duration, Instant};
//!
//! let mut lines = LineAssembler::new("\n", Duration::from_millis(250));
//! let t0 = Instant::now();
//!
//! lines.feed(b"04AB\r\n12", t0);
//! assert_eq!(lines.next_line().as_deref(), Some("04AB"));
//! assert_eq!(lines.next_line(), None);
//!
//! assert_eq!(lines.flush_idle(t0 + Duration::from_millis(300)).as_deref(), Some("12"));
//! ```

use bytes::BytesMut;
use libterm_core::constants::MAX_LINE_LENGTH;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Initial buffer capacity for incoming serial data.
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Splits a serial byte stream into lines.
#[derive(Debug)]
pub struct LineAssembler {
    /// Bytes of the line being assembled.
    buffer: BytesMut,

    /// Extra terminator taken from the configured newline.
    custom_terminator: Option<u8>,

    /// Complete lines ready for extraction.
    lines: VecDeque<String>,

    /// When the last byte was fed.
    last_input: Option<Instant>,

    /// Silence after which a partial line is delivered.
    idle_flush: Duration,

    /// Bytes thrown away because a line outgrew [`MAX_LINE_LENGTH`].
    discarded: usize,
}

impl LineAssembler {
    /// Create an assembler for the given newline convention.
    pub fn new(newline: &str, idle_flush: Duration) -> Self {
        let custom_terminator = newline
            .as_bytes()
            .first()
            .copied()
            .filter(|b| !matches!(b, b'\r' | b'\n'));

        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            custom_terminator,
            lines: VecDeque::new(),
            last_input: None,
            idle_flush,
            discarded: 0,
        }
    }

    /// Feed bytes read from the port at time `now`.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) {
        if bytes.is_empty() {
            return;
        }
        self.last_input = Some(now);

        for &b in bytes {
            if self.is_terminator(b) {
                self.complete_line();
                continue;
            }

            if self.buffer.len() >= MAX_LINE_LENGTH {
                self.discarded += self.buffer.len();
                self.buffer.clear();
            }
            self.buffer.extend_from_slice(&[b]);
        }
    }

    /// Next complete line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    /// Deliver the pending partial line if input has been idle long enough.
    pub fn flush_idle(&mut self, now: Instant) -> Option<String> {
        let last = self.last_input?;
        if self.buffer.is_empty() || now.saturating_duration_since(last) < self.idle_flush {
            return None;
        }
        self.complete_line();
        self.lines.pop_front()
    }

    /// Number of complete lines waiting.
    pub fn lines_available(&self) -> usize {
        self.lines.len()
    }

    /// Bytes of the partial line held back.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes dropped because a line grew too long.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Drop all buffered data, e.g. after the port was reopened.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.lines.clear();
        self.last_input = None;
    }

    fn is_terminator(&self, b: u8) -> bool {
        b == b'\n' || b == b'\r' || Some(b) == self.custom_terminator
    }

    fn complete_line(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let bytes = self.buffer.split();
        self.lines
            .push_back(String::from_utf8_lossy(&bytes).into_owned());
    }
}

/// Guesses a device's newline convention from the bytes it sends.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewlineSniffer {
    seen_cr: bool,
    seen_lf: bool,
    bytes_seen: usize,
}

impl NewlineSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.bytes_seen += bytes.len();
        for &b in bytes {
            match b {
                b'\r' => self.seen_cr = true,
                b'\n' => self.seen_lf = true,
                _ => {}
            }
        }
    }

    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen
    }

    /// The newline that best explains the traffic; `\r\n` when no
    /// terminator has been seen.
    pub fn newline(&self) -> &'static str {
        match (self.seen_cr, self.seen_lf) {
            (true, false) => "\r",
            (false, true) => "\n",
            _ => "\r\n",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const IDLE: Duration = Duration::from_millis(250);

    fn drain(lines: &mut LineAssembler) -> Vec<String> {
        std::iter::from_fn(|| lines.next_line()).collect()
    }

    #[rstest]
    #[case(b"04AB\r\n12CD\r\n", &["04AB", "12CD"])]
    #[case(b"04AB\n12CD\n", &["04AB", "12CD"])]
    #[case(b"04AB\r12CD\r", &["04AB", "12CD"])]
    #[case(b"\r\n\r\n04AB\n\n", &["04AB"])]
    #[case(b"no terminator", &[])]
    fn test_terminators(#[case] input: &[u8], #[case] expected: &[&str]) {
        let mut lines = LineAssembler::new("\n", IDLE);
        lines.feed(input, Instant::now());
        assert_eq!(drain(&mut lines), expected);
    }

    #[test]
    fn test_custom_terminator() {
        let mut lines = LineAssembler::new(";", IDLE);
        lines.feed(b"OK;BEEP:120;", Instant::now());
        assert_eq!(drain(&mut lines), vec!["OK", "BEEP:120"]);
    }

    #[test]
    fn test_line_split_across_feeds() {
        let mut lines = LineAssembler::new("\n", IDLE);
        let now = Instant::now();

        lines.feed(b"04A", now);
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending_len(), 3);

        lines.feed(b"B12\n", now);
        assert_eq!(lines.next_line().as_deref(), Some("04AB12"));
    }

    #[test]
    fn test_idle_flush_waits_for_silence() {
        let mut lines = LineAssembler::new("\n", IDLE);
        let t0 = Instant::now();
        lines.feed(b"partial", t0);

        assert_eq!(lines.flush_idle(t0 + Duration::from_millis(100)), None);
        assert_eq!(
            lines.flush_idle(t0 + Duration::from_millis(250)).as_deref(),
            Some("partial")
        );
        assert_eq!(lines.flush_idle(t0 + Duration::from_millis(900)), None);
    }

    #[test]
    fn test_overlong_line_discarded() {
        let mut lines = LineAssembler::new("\n", IDLE);
        let junk = vec![b'A'; MAX_LINE_LENGTH + 10];
        lines.feed(&junk, Instant::now());
        lines.feed(b"\n", Instant::now());

        assert_eq!(lines.discarded(), MAX_LINE_LENGTH);
        assert_eq!(lines.next_line().map(|l| l.len()), Some(10));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut lines = LineAssembler::new("\n", IDLE);
        lines.feed(&[0x30, 0xFF, 0x31, b'\n'], Instant::now());
        assert_eq!(lines.next_line().as_deref(), Some("0\u{FFFD}1"));
    }

    #[test]
    fn test_clear() {
        let mut lines = LineAssembler::new("\n", IDLE);
        lines.feed(b"a\nb", Instant::now());
        lines.clear();
        assert_eq!(lines.lines_available(), 0);
        assert_eq!(lines.pending_len(), 0);
    }

    #[rstest]
    #[case(b"04AB\r\n", "\r\n")]
    #[case(b"04AB\n", "\n")]
    #[case(b"04AB\r", "\r")]
    #[case(b"04AB", "\r\n")]
    fn test_newline_sniffer(#[case] traffic: &[u8], #[case] expected: &str) {
        let mut sniffer = NewlineSniffer::new();
        sniffer.feed(traffic);
        assert_eq!(sniffer.newline(), expected);
        assert_eq!(sniffer.bytes_seen(), traffic.len());
    }
}
