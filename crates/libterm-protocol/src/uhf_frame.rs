//! Tag frame extraction for vendor UHF readers in active mode.
//!
//! An active-mode read returns the reader's tag buffer as zero or more
//! concatenated frames, each a length byte followed by that many payload
//! bytes:
//!
//! ```text
//! ┌─────┬──────────────┬─────┬──────────┬───
//! │ len │ payload[len] │ len │ payload  │ ...
//! └─────┴──────────────┴─────┴──────────┴───
//! ```
//!
//! Readers occasionally hand back a truncated tail. A length byte that is
//! outside the accepted range, or that points past the end of the buffer,
//! is skipped one byte at a time so the frames before it are still
//! delivered and a bad tail never poisons the next read.
//!
//! # Usage
//!
//! ```
//! use libterm_protocol::{FrameExtractor, FrameLimits};
//!
//! let extractor = FrameExtractor::new(FrameLimits::new(1, 64));
//! let buffer = [5, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 3, 0x11, 0x22, 0x33];
//!
//! let tags = extractor.hex_frames(&buffer);
//! assert_eq!(tags, vec!["AABBCCDDEE", "112233"]);
//! ```

use libterm_core::constants::{UHF_MAX_FRAME_LEN, UHF_MIN_FRAME_LEN};
use libterm_core::hex;

/// Accepted payload length range, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    min: u8,
    max: u8,
}

impl FrameLimits {
    /// Limits for EPC payloads: 8 to 64 bytes.
    pub const EPC: FrameLimits = FrameLimits {
        min: UHF_MIN_FRAME_LEN,
        max: UHF_MAX_FRAME_LEN,
    };

    /// Create limits. A zero minimum is raised to one. If `max < min` no
    /// frame is ever accepted.
    #[must_use]
    pub const fn new(min: u8, max: u8) -> Self {
        let min = if min == 0 { 1 } else { min };
        Self { min, max }
    }

    #[must_use]
    pub fn min(&self) -> u8 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u8 {
        self.max
    }

    #[inline]
    fn accepts(&self, len: u8) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self::EPC
    }
}

/// Stateless splitter for active-mode buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameExtractor {
    limits: FrameLimits,
}

impl FrameExtractor {
    #[must_use]
    pub fn new(limits: FrameLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Iterate the payloads of every complete frame in `buffer`.
    pub fn frames<'a>(&self, buffer: &'a [u8]) -> TagFrames<'a> {
        TagFrames {
            buffer,
            pos: 0,
            limits: self.limits,
            skipped: 0,
        }
    }

    /// Every complete frame in `buffer` as uppercase hex, in order.
    #[must_use]
    pub fn hex_frames(&self, buffer: &[u8]) -> Vec<String> {
        self.frames(buffer).map(hex::encode_upper).collect()
    }
}

/// Iterator over frame payloads, created by [`FrameExtractor::frames`].
#[derive(Debug)]
pub struct TagFrames<'a> {
    buffer: &'a [u8],
    pos: usize,
    limits: FrameLimits,
    skipped: usize,
}

impl TagFrames<'_> {
    /// Bytes skipped so far because they did not start a complete frame.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<'a> Iterator for TagFrames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.buffer.len() {
            let len = self.buffer[self.pos];
            let start = self.pos + 1;
            let end = start + usize::from(len);

            if self.limits.accepts(len) && end <= self.buffer.len() {
                self.pos = end;
                return Some(&self.buffer[start..end]);
            }

            self.pos += 1;
            self.skipped += 1;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.len().saturating_sub(self.pos);
        (0, Some(remaining / (usize::from(self.limits.min) + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn permissive() -> FrameExtractor {
        FrameExtractor::new(FrameLimits::new(1, 64))
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let buffer = [5, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 3, 0x11, 0x22, 0x33];
        assert_eq!(
            permissive().hex_frames(&buffer),
            vec!["AABBCCDDEE".to_string(), "112233".to_string()]
        );
    }

    #[test]
    fn test_trailing_incomplete_length_byte() {
        let buffer = [5, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 3];
        assert_eq!(permissive().hex_frames(&buffer), vec!["AABBCCDDEE"]);
    }

    #[test]
    fn test_truncated_trailing_frame() {
        let buffer = [3, 0x11, 0x22, 0x33, 40, 0x50, 0x60];
        let mut frames = permissive().frames(&buffer);

        assert_eq!(frames.next(), Some(&[0x11, 0x22, 0x33][..]));
        assert_eq!(frames.next(), None);
        assert_eq!(frames.skipped(), 3);
    }

    #[test]
    fn test_zero_length_byte_skipped() {
        let buffer = [0, 2, 0xAB, 0xCD];
        assert_eq!(permissive().hex_frames(&buffer), vec!["ABCD"]);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(permissive().hex_frames(&[]).is_empty());
    }

    #[test]
    fn test_epc_limits_reject_short_frames() {
        let extractor = FrameExtractor::default();
        let mut buffer = vec![5, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];
        buffer.push(12);
        buffer.extend_from_slice(&[
            0x30, 0x4D, 0xB7, 0x5F, 0x19, 0x60, 0x00, 0x05, 0xF0, 0x00, 0x00, 0x01,
        ]);

        assert_eq!(extractor.hex_frames(&buffer), vec!["304DB75F19600005F0000001"]);
    }

    #[rstest]
    #[case(8, true)]
    #[case(12, true)]
    #[case(64, true)]
    #[case(7, false)]
    #[case(65, false)]
    fn test_epc_limits(#[case] len: u8, #[case] accepted: bool) {
        assert_eq!(FrameLimits::EPC.accepts(len), accepted);
    }

    #[test]
    fn test_zero_min_is_raised() {
        assert_eq!(FrameLimits::new(0, 10).min(), 1);
    }
}
