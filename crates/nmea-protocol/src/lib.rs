//! NMEA Protocol Library
//!
//! This crate provides the wire-level pieces of the NMEA multiplexer:
//!
//! - **Framing**: [`Frame`] carries one sentence without its terminator, and
//!   [`SentenceCodec`] splits CR/LF-delimited byte streams into frames
//! - **Checksums**: NMEA `*hh` checksum calculation and verification
//! - **AIS**: [`AivdmDecoder`] turns `!AIVDM` sentences (including multi-part
//!   messages) into a flat field mapping, behind the [`AisDecoder`] trait
//!
//! # Example
//!
//! ```rust
//! use nmea_protocol::{AisDecoder, AivdmDecoder, SentenceCodec};
//!
//! let mut codec = SentenceCodec::new();
//! codec.push_bytes(b"$GPGLL,5057.970,N,00146.110,E,142451,A*27\r\n");
//! codec.push_bytes(b"!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26\r\n");
//!
//! let gll = codec.next_frame().unwrap();
//! assert!(!gll.is_ais());
//!
//! let ais = codec.next_frame().unwrap();
//! let mut decoder = AivdmDecoder::new();
//! let msg = decoder.decode(ais.as_bytes()).unwrap();
//! assert_eq!(msg.mmsi(), Some(244_670_316));
//! ```

pub mod ais;
pub mod error;
pub mod sentence;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use ais::{AisDecoder, AivdmDecoder, DecodedMessage, FieldValue};
pub use error::DecodeError;
pub use sentence::{checksum, verify_checksum, Frame, SentenceCodec, AIS_PREFIX};
