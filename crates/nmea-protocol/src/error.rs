//! Error types for NMEA framing and AIS decoding

use thiserror::Error;

/// Errors returned by an AIS decoder
///
/// The multiplexer treats every variant the same way (the frame is forwarded
/// unfiltered), but the variants stay distinct so callers can log them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Sentence does not carry the AIVDM tag
    #[error("not an AIVDM sentence")]
    NotAis,

    /// Sentence structure is broken (missing fields, bad characters)
    #[error("malformed sentence: {0}")]
    Malformed(String),

    /// Checksum in the sentence does not match its body
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Part of a multi-sentence message; waiting for the remaining fragments
    #[error("incomplete message: {received} of {total} fragments")]
    Incomplete { received: u8, total: u8 },

    /// Message type the decoder does not handle
    #[error("unsupported message type: {0}")]
    Unsupported(u8),

    /// Payload ends before the fields of its message type
    #[error("payload too short: need {needed} bits, have {available}")]
    TooShort { needed: usize, available: usize },
}

impl DecodeError {
    /// True when the sentence is valid but cannot be interpreted yet or at all
    ///
    /// These are the "ambiguous" outcomes: unsupported types and fragments
    /// of an unfinished multi-part message.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Incomplete { .. } | Self::Unsupported(_))
    }
}
