//! Helpers for building AIS sentences in tests
//!
//! Only compiled for this crate's tests or with the `test-util` feature.

use crate::ais::bits::armor_char;
use crate::sentence::checksum;

/// Bit-level builder for AIS payloads
#[derive(Debug, Default, Clone)]
pub struct PayloadBuilder {
    bits: Vec<bool>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `width` bits of `value`, most significant first
    pub fn uint(mut self, value: u64, width: usize) -> Self {
        for i in (0..width).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
        self
    }

    /// Append a two's-complement signed value
    pub fn int(self, value: i64, width: usize) -> Self {
        let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        self.uint(value as u64 & mask, width)
    }

    /// Append `chars` 6-bit characters, padding with `@`
    pub fn text(mut self, text: &str, chars: usize) -> Self {
        let padded = text.chars().chain(std::iter::repeat('@')).take(chars);
        for c in padded.collect::<Vec<_>>() {
            let code = c as u32;
            let v = match code {
                64..=95 => code - 64,
                32..=63 => code,
                _ => 0,
            };
            self = self.uint(u64::from(v), 6);
        }
        self
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Armor the payload, returning it with the number of fill bits
    pub fn finish(&self) -> (String, u8) {
        let fill = (6 - self.bits.len() % 6) % 6;
        let mut bits = self.bits.clone();
        bits.extend(std::iter::repeat(false).take(fill));

        let payload = bits
            .chunks(6)
            .map(|chunk| {
                let v = chunk.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b));
                armor_char(v) as char
            })
            .collect();
        (payload, fill as u8)
    }
}

/// Format a complete `!AIVDM` sentence with a valid checksum
pub fn aivdm_sentence(
    total: u8,
    number: u8,
    sequence_id: &str,
    channel: &str,
    payload: &str,
    fill_bits: u8,
) -> String {
    let body = format!(
        "AIVDM,{},{},{},{},{},{}",
        total, number, sequence_id, channel, payload, fill_bits
    );
    format!("!{}*{:02X}", body, checksum(body.as_bytes()))
}

/// Single-sentence class A position report (type 1)
///
/// `speed_tenths` is speed over ground in 0.1 knot steps; 1023 means
/// "not available".
pub fn position_report(mmsi: u32, speed_tenths: u16) -> String {
    let builder = PayloadBuilder::new()
        .uint(1, 6)
        .uint(0, 2)
        .uint(mmsi.into(), 30)
        .uint(0, 4)
        .int(-128, 8)
        .uint(speed_tenths.into(), 10)
        .uint(0, 1)
        .int(-1_200_000, 28)
        .int(30_000_000, 27)
        .uint(3600, 12)
        .uint(511, 9)
        .uint(60, 6)
        .uint(0, 2)
        .uint(0, 3)
        .uint(0, 1)
        .uint(0, 19);
    let (payload, fill) = builder.finish();
    aivdm_sentence(1, 1, "", "A", &payload, fill)
}

/// Static and voyage data (type 5), split over two sentences
pub fn static_report(mmsi: u32, name: &str, to_bow: u16, to_stern: u16) -> [String; 2] {
    let builder = PayloadBuilder::new()
        .uint(5, 6)
        .uint(0, 2)
        .uint(mmsi.into(), 30)
        .uint(0, 2)
        .uint(0, 30)
        .text("TEST", 7)
        .text(name, 20)
        .uint(37, 8)
        .uint(to_bow.into(), 9)
        .uint(to_stern.into(), 9)
        .uint(2, 6)
        .uint(2, 6)
        .uint(1, 4)
        .uint(0, 20)
        .uint(0, 8)
        .text("", 20)
        .uint(0, 1)
        .uint(0, 1);
    let (payload, fill) = builder.finish();
    let (first, second) = payload.split_at(payload.len() / 2);
    [
        aivdm_sentence(2, 1, "1", "A", first, 0),
        aivdm_sentence(2, 2, "1", "A", second, fill),
    ]
}

/// Class B static data part B (type 24): dimensions, no speed
pub fn class_b_dimensions(mmsi: u32, to_bow: u16, to_stern: u16) -> String {
    let builder = PayloadBuilder::new()
        .uint(24, 6)
        .uint(0, 2)
        .uint(mmsi.into(), 30)
        .uint(1, 2)
        .uint(37, 8)
        .uint(0, 42)
        .text("", 7)
        .uint(to_bow.into(), 9)
        .uint(to_stern.into(), 9)
        .uint(1, 6)
        .uint(1, 6)
        .uint(0, 6);
    let (payload, fill) = builder.finish();
    aivdm_sentence(1, 1, "", "B", &payload, fill)
}
