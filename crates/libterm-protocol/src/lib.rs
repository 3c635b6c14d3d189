//! Byte-level framing for the terminal's readers.
//!
//! - [`FrameExtractor`] splits a vendor UHF active-mode buffer into
//!   length-prefixed tag frames.
//! - [`LineAssembler`] turns a serial byte stream into text lines.
//! - [`apdu`] builds and parses the PC/SC "get UID" exchange.

pub mod apdu;
pub mod line;
pub mod uhf_frame;

pub use apdu::{StatusWord, UidResponse};
pub use line::{LineAssembler, NewlineSniffer};
pub use uhf_frame::{FrameExtractor, FrameLimits, TagFrames};
