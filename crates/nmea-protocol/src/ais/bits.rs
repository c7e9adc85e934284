//! 6-bit payload armoring used by AIVDM sentences

use crate::error::DecodeError;

/// Convert one armored payload character to its 6-bit value
pub fn dearmor_char(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'W' => Some(c - 48),
        b'`'..=b'w' => Some(c - 56),
        _ => None,
    }
}

/// Convert a 6-bit value to its armored payload character
pub fn armor_char(v: u8) -> u8 {
    debug_assert!(v < 64);
    if v < 40 {
        v + 48
    } else {
        v + 56
    }
}

/// Map a 6-bit value to the AIS text alphabet
fn sixbit_ascii(v: u8) -> char {
    if v < 32 {
        (v + 64) as char
    } else {
        v as char
    }
}

/// Bit-addressable view of a de-armored payload
///
/// Bits are numbered from the most significant bit of the first character,
/// matching the offsets in ITU-R M.1371.
#[derive(Debug, Clone)]
pub struct BitReader {
    sextets: Vec<u8>,
    len: usize,
}

impl BitReader {
    /// De-armor `payload`, dropping `fill_bits` padding bits from the end
    pub fn from_payload(payload: &[u8], fill_bits: u8) -> Result<Self, DecodeError> {
        let sextets = payload
            .iter()
            .map(|&c| {
                dearmor_char(c).ok_or_else(|| {
                    DecodeError::Malformed(format!("invalid payload character {:?}", c as char))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total = sextets.len() * 6;
        let len = total.saturating_sub(fill_bits as usize);
        Ok(Self { sextets, len })
    }

    /// Number of meaningful bits
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fail unless at least `needed` bits are available
    pub fn require(&self, needed: usize) -> Result<(), DecodeError> {
        if self.len < needed {
            return Err(DecodeError::TooShort {
                needed,
                available: self.len,
            });
        }
        Ok(())
    }

    fn bit(&self, index: usize) -> u32 {
        let sextet = self.sextets[index / 6];
        u32::from((sextet >> (5 - index % 6)) & 1)
    }

    /// Unsigned field of `width` bits (at most 32) starting at `start`
    ///
    /// Callers check bounds with [`BitReader::require`] first.
    pub fn uint(&self, start: usize, width: usize) -> u32 {
        debug_assert!(width <= 32 && start + width <= self.len);
        (start..start + width).fold(0, |acc, i| (acc << 1) | self.bit(i))
    }

    /// Two's-complement signed field
    pub fn int(&self, start: usize, width: usize) -> i32 {
        let raw = self.uint(start, width);
        if width < 32 && raw & (1 << (width - 1)) != 0 {
            (raw as i64 - (1i64 << width)) as i32
        } else {
            raw as i32
        }
    }

    /// Text field of `chars` 6-bit characters, with `@` padding and trailing
    /// spaces removed
    pub fn text(&self, start: usize, chars: usize) -> String {
        let s: String = (0..chars)
            .map(|i| sixbit_ascii(self.uint(start + i * 6, 6) as u8))
            .collect();
        s.trim_end_matches(['@', ' ']).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_armor_roundtrip_all_values() {
        for v in 0..64u8 {
            assert_eq!(dearmor_char(armor_char(v)), Some(v));
        }
    }

    #[test]
    fn test_dearmor_rejects_gap_characters() {
        assert_eq!(dearmor_char(b'X'), None);
        assert_eq!(dearmor_char(b'_'), None);
        assert_eq!(dearmor_char(b'x'), None);
        assert_eq!(dearmor_char(b' '), None);
    }

    #[test]
    fn test_uint_and_int_fields() {
        // "1" = 000001, "w" = 111111
        let reader = BitReader::from_payload(b"1w", 0).unwrap();
        assert_eq!(reader.len(), 12);
        assert_eq!(reader.uint(0, 6), 1);
        assert_eq!(reader.uint(6, 6), 63);
        assert_eq!(reader.int(6, 6), -1);
        assert_eq!(reader.uint(4, 4), 0b0111);
    }

    #[test]
    fn test_fill_bits_shorten_payload() {
        let reader = BitReader::from_payload(b"1w", 2).unwrap();
        assert_eq!(reader.len(), 10);
        assert!(reader.require(10).is_ok());
        assert_eq!(
            reader.require(11),
            Err(DecodeError::TooShort {
                needed: 11,
                available: 10
            })
        );
    }

    #[test]
    fn test_invalid_payload_character() {
        assert!(matches!(
            BitReader::from_payload(b"1x", 0),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_text_field_trims_padding() {
        // 'A' = 1, 'B' = 2, '@' = 0
        let payload = [armor_char(1), armor_char(2), armor_char(0), armor_char(0)];
        let reader = BitReader::from_payload(&payload, 0).unwrap();
        assert_eq!(reader.text(0, 4), "AB");
    }
}
