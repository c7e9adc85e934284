//! Decoded AIS messages
//!
//! A decoded message is a flat mapping of field name to value. Only the
//! message types that carry vessel movement or dimensions are interpreted.

use std::collections::BTreeMap;
use std::fmt;

use super::bits::BitReader;
use crate::error::DecodeError;

/// Field holding the vessel identity
pub const FIELD_MMSI: &str = "mmsi";
/// Speed over ground in knots
pub const FIELD_SPEED: &str = "speed";
/// Distance from the reference point to the bow, meters
pub const FIELD_TO_BOW: &str = "to_bow";
/// Distance from the reference point to the stern, meters
pub const FIELD_TO_STERN: &str = "to_stern";

/// Raw speed value meaning "not available"
const SPEED_NOT_AVAILABLE: u32 = 1023;
/// Raw heading value meaning "not available"
const HEADING_NOT_AVAILABLE: u32 = 511;
/// Raw course value meaning "not available"
const COURSE_NOT_AVAILABLE: u32 = 3600;

/// A single decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value (text yields `None`)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Integer view of the value (floats and text yield `None`)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Flat field mapping produced by an AIS decoder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMessage {
    fields: BTreeMap<String, FieldValue>,
}

impl DecodedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// AIS message type, when the decoder recorded it
    pub fn msg_type(&self) -> Option<u8> {
        self.get("type")
            .and_then(FieldValue::as_i64)
            .and_then(|v| u8::try_from(v).ok())
    }

    /// Vessel identity
    pub fn mmsi(&self) -> Option<u32> {
        self.get(FIELD_MMSI)
            .and_then(FieldValue::as_i64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Speed over ground in knots
    pub fn speed(&self) -> Option<f64> {
        self.get(FIELD_SPEED).and_then(FieldValue::as_f64)
    }

    pub fn to_bow(&self) -> Option<u32> {
        self.dimension(FIELD_TO_BOW)
    }

    pub fn to_stern(&self) -> Option<u32> {
        self.dimension(FIELD_TO_STERN)
    }

    /// Overall length (bow + stern offsets) if either offset is present
    pub fn length(&self) -> Option<u32> {
        match (self.to_bow(), self.to_stern()) {
            (None, None) => None,
            (bow, stern) => Some(bow.unwrap_or(0) + stern.unwrap_or(0)),
        }
    }

    fn dimension(&self, name: &str) -> Option<u32> {
        self.get(name)
            .and_then(FieldValue::as_i64)
            .and_then(|v| u32::try_from(v).ok())
    }
}

/// Decode a complete, de-armored payload
pub fn decode_payload(bits: &BitReader) -> Result<DecodedMessage, DecodeError> {
    bits.require(38)?;
    let msg_type = bits.uint(0, 6) as u8;

    let mut msg = DecodedMessage::new()
        .with("type", FieldValue::Int(msg_type.into()))
        .with("repeat", FieldValue::Int(bits.uint(6, 2).into()))
        .with(FIELD_MMSI, FieldValue::Int(bits.uint(8, 30).into()));

    match msg_type {
        1..=3 => {
            bits.require(137)?;
            msg.insert("status", FieldValue::Int(bits.uint(38, 4).into()));
            msg.insert("turn", FieldValue::Int(bits.int(42, 8).into()));
            insert_speed(&mut msg, bits.uint(50, 10));
            msg.insert("accuracy", FieldValue::Int(bits.uint(60, 1).into()));
            insert_position(&mut msg, bits, 61, 89);
            insert_course(&mut msg, bits.uint(116, 12), bits.uint(128, 9));
        }
        5 => {
            bits.require(270)?;
            msg.insert("imo", FieldValue::Int(bits.uint(40, 30).into()));
            msg.insert("callsign", FieldValue::Text(bits.text(70, 7)));
            msg.insert("shipname", FieldValue::Text(bits.text(112, 20)));
            msg.insert("shiptype", FieldValue::Int(bits.uint(232, 8).into()));
            insert_dimensions(&mut msg, bits, 240);
        }
        18 => {
            bits.require(133)?;
            insert_speed(&mut msg, bits.uint(46, 10));
            msg.insert("accuracy", FieldValue::Int(bits.uint(56, 1).into()));
            insert_position(&mut msg, bits, 57, 85);
            insert_course(&mut msg, bits.uint(112, 12), bits.uint(124, 9));
        }
        19 => {
            bits.require(301)?;
            insert_speed(&mut msg, bits.uint(46, 10));
            msg.insert("accuracy", FieldValue::Int(bits.uint(56, 1).into()));
            insert_position(&mut msg, bits, 57, 85);
            insert_course(&mut msg, bits.uint(112, 12), bits.uint(124, 9));
            msg.insert("shipname", FieldValue::Text(bits.text(143, 20)));
            msg.insert("shiptype", FieldValue::Int(bits.uint(263, 8).into()));
            insert_dimensions(&mut msg, bits, 271);
        }
        24 => {
            bits.require(40)?;
            let part = bits.uint(38, 2);
            msg.insert("partno", FieldValue::Int(part.into()));
            match part {
                0 => {
                    bits.require(160)?;
                    msg.insert("shipname", FieldValue::Text(bits.text(40, 20)));
                }
                1 => {
                    bits.require(162)?;
                    msg.insert("shiptype", FieldValue::Int(bits.uint(40, 8).into()));
                    msg.insert("callsign", FieldValue::Text(bits.text(90, 7)));
                    insert_dimensions(&mut msg, bits, 132);
                }
                _ => return Err(DecodeError::Malformed(format!("type 24 part {}", part))),
            }
        }
        other => return Err(DecodeError::Unsupported(other)),
    }

    Ok(msg)
}

fn insert_speed(msg: &mut DecodedMessage, raw: u32) {
    if raw != SPEED_NOT_AVAILABLE {
        msg.insert(FIELD_SPEED, FieldValue::Float(f64::from(raw) / 10.0));
    }
}

fn insert_position(msg: &mut DecodedMessage, bits: &BitReader, lon_at: usize, lat_at: usize) {
    msg.insert(
        "lon",
        FieldValue::Float(f64::from(bits.int(lon_at, 28)) / 600_000.0),
    );
    msg.insert(
        "lat",
        FieldValue::Float(f64::from(bits.int(lat_at, 27)) / 600_000.0),
    );
}

fn insert_course(msg: &mut DecodedMessage, course: u32, heading: u32) {
    if course != COURSE_NOT_AVAILABLE {
        msg.insert("course", FieldValue::Float(f64::from(course) / 10.0));
    }
    if heading != HEADING_NOT_AVAILABLE {
        msg.insert("heading", FieldValue::Int(heading.into()));
    }
}

/// Dimension block: bow (9), stern (9), port (6), starboard (6)
fn insert_dimensions(msg: &mut DecodedMessage, bits: &BitReader, start: usize) {
    msg.insert(FIELD_TO_BOW, FieldValue::Int(bits.uint(start, 9).into()));
    msg.insert(
        FIELD_TO_STERN,
        FieldValue::Int(bits.uint(start + 9, 9).into()),
    );
    msg.insert(
        "to_port",
        FieldValue::Int(bits.uint(start + 18, 6).into()),
    );
    msg.insert(
        "to_starboard",
        FieldValue::Int(bits.uint(start + 24, 6).into()),
    );
}
