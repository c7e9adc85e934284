//! NMEA-0183 sentence framing
//!
//! Sentences arrive on the wire terminated by CR, LF or CR/LF. Inside the
//! multiplexer they are carried as [`Frame`]s with the terminator removed.

use std::fmt;

use crate::error::DecodeError;

/// Literal prefix identifying AIS sentences
pub const AIS_PREFIX: &[u8] = b"!AIVDM";

/// Upper bound for a buffered line before it is treated as garbage
///
/// Real sentences are at most 82 characters; this leaves room for
/// proprietary sentences and tag blocks.
pub const MAX_LINE_LEN: usize = 1024;

/// One sentence, without its line terminator
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Wrap raw sentence bytes
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    /// Build a frame from a line, stripping trailing CR/LF
    pub fn from_line(line: &[u8]) -> Self {
        Self(trim_terminator(line).to_vec())
    }

    /// Raw sentence bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this frame is an AIS sentence (`!AIVDM` prefix)
    pub fn is_ais(&self) -> bool {
        self.0.starts_with(AIS_PREFIX)
    }

    /// Bytes to put on the wire: the sentence followed by `terminator`
    pub fn to_wire(&self, terminator: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + terminator.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(terminator);
        out
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Frame {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Strip any trailing CR/LF characters
pub fn trim_terminator(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |p| p + 1);
    &line[..end]
}

/// Streaming line framer for byte-oriented transports
///
/// Bytes are pushed as they arrive; complete lines are pulled out one at a
/// time. Both CR and LF end a line, so CR/LF pairs and bare terminators are
/// handled the same way. Empty lines are skipped.
#[derive(Debug, Default)]
pub struct SentenceCodec {
    buffer: Vec<u8>,
}

impl SentenceCodec {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // An unterminated run this long is line noise (wrong baud rate etc.)
        if self.buffer.len() > MAX_LINE_LEN && !self.buffer.iter().any(is_terminator) {
            tracing::warn!(
                "Discarding {} bytes without a line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    /// Extract the next complete, non-empty line
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let term_pos = self.buffer.iter().position(is_terminator)?;
            let line: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let line = &line[..line.len() - 1];
            if !line.is_empty() {
                return Some(Frame::new(line));
            }
        }
    }

    /// Bytes buffered that do not yet form a complete line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn is_terminator(b: &u8) -> bool {
    *b == b'\r' || *b == b'\n'
}

/// NMEA checksum: XOR of every byte of the sentence body
///
/// `body` is the text between the leading `$`/`!` and the `*`.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// Verify the `*hh` checksum of a sentence, if it carries one
pub fn verify_checksum(sentence: &[u8]) -> Result<(), DecodeError> {
    let sentence = trim_terminator(sentence);
    let Some(star) = sentence.iter().rposition(|&b| b == b'*') else {
        return Ok(());
    };
    if sentence.is_empty() || !matches!(sentence[0], b'!' | b'$') {
        return Err(DecodeError::Malformed("missing start delimiter".into()));
    }

    let digits = &sentence[star + 1..];
    let expected = std::str::from_utf8(digits)
        .ok()
        .filter(|s| s.len() == 2)
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .ok_or_else(|| DecodeError::Malformed("invalid checksum digits".into()))?;

    let actual = checksum(&sentence[1..star]);
    if actual != expected {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
