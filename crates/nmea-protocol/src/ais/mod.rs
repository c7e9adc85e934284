//! AIS (AIVDM) sentence decoding
//!
//! AIS messages are carried in `!AIVDM` sentences as 6-bit armored payloads.
//! Longer messages (type 5 static data, for example) are split across two or
//! more sentences that must be reassembled before decoding.
//!
//! # Example
//!
//! ```rust
//! use nmea_protocol::ais::{AisDecoder, AivdmDecoder};
//!
//! let mut decoder = AivdmDecoder::new();
//! let msg = decoder
//!     .decode(b"!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26")
//!     .unwrap();
//! assert_eq!(msg.msg_type(), Some(1));
//! ```

pub mod bits;
pub mod message;

use std::collections::HashMap;

use tracing::debug;

use crate::error::DecodeError;
use crate::sentence::{trim_terminator, verify_checksum, AIS_PREFIX};
use bits::BitReader;

pub use message::{decode_payload, DecodedMessage, FieldValue};

/// Partial multi-sentence groups kept at once
const MAX_PENDING_GROUPS: usize = 32;

/// Decodes raw AIS sentences into flat field mappings
///
/// Implementations may keep state between calls (multi-part reassembly).
pub trait AisDecoder {
    /// Decode one sentence (with or without its line terminator)
    fn decode(&mut self, sentence: &[u8]) -> Result<DecodedMessage, DecodeError>;
}

/// Parsed envelope of a single AIVDM sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AivdmSentence<'a> {
    /// Number of sentences making up the message
    pub total: u8,
    /// Index of this sentence (1-based)
    pub number: u8,
    /// Sequential message id tying fragments together (may be empty)
    pub sequence_id: &'a str,
    /// Radio channel (A/B, may be empty)
    pub channel: &'a str,
    /// Armored payload
    pub payload: &'a str,
    /// Padding bits at the end of the payload
    pub fill_bits: u8,
}

impl<'a> AivdmSentence<'a> {
    /// Split a sentence into its envelope fields, verifying the checksum
    pub fn parse(sentence: &'a [u8]) -> Result<Self, DecodeError> {
        let sentence = trim_terminator(sentence);
        if !sentence.starts_with(AIS_PREFIX) {
            return Err(DecodeError::NotAis);
        }
        verify_checksum(sentence)?;

        let text = std::str::from_utf8(sentence)
            .map_err(|_| DecodeError::Malformed("non-ASCII sentence".into()))?;
        let body = text.split('*').next().unwrap_or(text);
        let fields: Vec<&str> = body.split(',').collect();
        if fields.len() < 7 {
            return Err(DecodeError::Malformed(format!(
                "expected 7 fields, found {}",
                fields.len()
            )));
        }

        let total = parse_count(fields[1], "fragment count")?;
        let number = parse_count(fields[2], "fragment number")?;
        if total == 0 || number == 0 || number > total {
            return Err(DecodeError::Malformed(format!(
                "fragment {} of {}",
                number, total
            )));
        }

        let fill_bits = match fields[6] {
            "" => 0,
            s => s
                .parse::<u8>()
                .ok()
                .filter(|v| *v <= 5)
                .ok_or_else(|| DecodeError::Malformed(format!("fill bits {:?}", s)))?,
        };

        Ok(Self {
            total,
            number,
            sequence_id: fields[3],
            channel: fields[4],
            payload: fields[5],
            fill_bits,
        })
    }
}

fn parse_count(field: &str, what: &str) -> Result<u8, DecodeError> {
    field
        .parse::<u8>()
        .map_err(|_| DecodeError::Malformed(format!("{} {:?}", what, field)))
}

/// Fragments collected so far for one multi-part message
#[derive(Debug)]
struct PendingGroup {
    total: u8,
    received: u8,
    payload: String,
}

/// Stateful AIVDM decoder with multi-part reassembly
///
/// Fragments are grouped by (sequence id, channel). A fragment arriving out
/// of order discards the group it belongs to.
#[derive(Debug, Default)]
pub struct AivdmDecoder {
    pending: HashMap<(String, String), PendingGroup>,
}

impl AivdmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of multi-part messages waiting for more fragments
    pub fn pending_groups(&self) -> usize {
        self.pending.len()
    }

    fn decode_complete(payload: &str, fill_bits: u8) -> Result<DecodedMessage, DecodeError> {
        let bits = BitReader::from_payload(payload.as_bytes(), fill_bits)?;
        decode_payload(&bits)
    }

    fn accept_fragment(
        &mut self,
        sentence: &AivdmSentence<'_>,
    ) -> Result<Option<String>, DecodeError> {
        let key = (
            sentence.sequence_id.to_string(),
            sentence.channel.to_string(),
        );

        if sentence.number == 1 {
            if self.pending.len() >= MAX_PENDING_GROUPS && !self.pending.contains_key(&key) {
                debug!(
                    "Dropping {} stale AIS fragment groups",
                    self.pending.len()
                );
                self.pending.clear();
            }
            self.pending.insert(
                key,
                PendingGroup {
                    total: sentence.total,
                    received: 1,
                    payload: sentence.payload.to_string(),
                },
            );
            return Ok(None);
        }

        let Some(group) = self.pending.get_mut(&key) else {
            return Err(DecodeError::Incomplete {
                received: 0,
                total: sentence.total,
            });
        };

        if group.total != sentence.total || group.received + 1 != sentence.number {
            debug!(
                "Out of sequence AIS fragment {}/{} (have {}/{})",
                sentence.number, sentence.total, group.received, group.total
            );
            self.pending.remove(&key);
            return Err(DecodeError::Incomplete {
                received: 0,
                total: sentence.total,
            });
        }

        group.received = sentence.number;
        group.payload.push_str(sentence.payload);

        if group.received == group.total {
            Ok(self.pending.remove(&key).map(|g| g.payload))
        } else {
            Ok(None)
        }
    }
}

impl AisDecoder for AivdmDecoder {
    fn decode(&mut self, sentence: &[u8]) -> Result<DecodedMessage, DecodeError> {
        let parsed = AivdmSentence::parse(sentence)?;

        if parsed.total == 1 {
            return Self::decode_complete(parsed.payload, parsed.fill_bits);
        }

        match self.accept_fragment(&parsed)? {
            Some(payload) => Self::decode_complete(&payload, parsed.fill_bits),
            None => Err(DecodeError::Incomplete {
                received: parsed.number,
                total: parsed.total,
            }),
        }
    }
}
