//! PER (Packed Encoding Rules) encoding/decoding
//!
//! Aligned PER (APER) as used by NGAP, following ITU-T X.691.
//! Fragmented length determinants (lengths above 16383) are not produced
//! or accepted; no NGAP message handled here comes close to that size.

use bitvec::prelude::*;
use bytes::Bytes;
use thiserror::Error;

/// Largest length a single (non-fragmented) length determinant can carry
pub const MAX_UNFRAGMENTED_LENGTH: usize = 16383;

/// PER codec errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerError {
    #[error("Buffer underflow: need {needed} bits, have {available}")]
    BufferUnderflow { needed: usize, available: usize },
    #[error("Invalid constraint: value {value} not in range {min}..={max}")]
    ConstraintViolation { value: i64, min: i64, max: i64 },
    #[error("Invalid choice index: {index} (max {max})")]
    InvalidChoiceIndex { index: usize, max: usize },
    #[error("Invalid length: {length}")]
    InvalidLength { length: usize },
    #[error("Unsupported extension")]
    UnsupportedExtension,
    #[error("Decode error: {0}")]
    DecodeError(String),
}

pub type PerResult<T> = Result<T, PerError>;

/// Constraint definition for constrained integers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub min: i64,
    pub max: i64,
    pub extensible: bool,
}

impl Constraint {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max, extensible: false }
    }

    pub const fn extensible(min: i64, max: i64) -> Self {
        Self { min, max, extensible: true }
    }

    /// Number of values in the constraint
    pub fn range(&self) -> u64 {
        if self.max >= self.min {
            (self.max - self.min) as u64 + 1
        } else {
            0
        }
    }

    /// Bits needed to encode an offset in this range as a bit-field
    pub fn bits_needed(&self) -> usize {
        let range = self.range();
        if range <= 1 {
            0
        } else {
            64 - (range - 1).leading_zeros() as usize
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Minimal number of octets holding `value` (at least one)
fn octets_needed(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize + 7) / 8
    }
}

/// APER (Aligned PER) Encoder
pub struct AperEncoder {
    buffer: BitVec<u8, Msb0>,
}

impl AperEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BitVec::new(),
        }
    }

    /// Get the encoded bytes (the last octet is zero-padded)
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer.into_vec())
    }

    /// Get current bit position
    pub fn bit_position(&self) -> usize {
        self.buffer.len()
    }

    /// Align to octet boundary
    pub fn align(&mut self) {
        let remainder = self.buffer.len() % 8;
        if remainder != 0 {
            for _ in 0..(8 - remainder) {
                self.buffer.push(false);
            }
        }
    }

    /// Write a single bit
    pub fn write_bit(&mut self, bit: bool) {
        self.buffer.push(bit);
    }

    /// Write the low `num_bits` of a value (MSB first)
    pub fn write_bits(&mut self, value: u64, num_bits: usize) {
        for i in (0..num_bits).rev() {
            self.buffer.push((value >> i) & 1 == 1);
        }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.write_bits(*byte as u64, 8);
        }
    }

    /// Encode constrained whole number (X.691 Section 10.5)
    pub fn encode_constrained_whole_number(
        &mut self,
        value: i64,
        constraint: &Constraint,
    ) -> PerResult<()> {
        if !constraint.contains(value) {
            return Err(PerError::ConstraintViolation {
                value,
                min: constraint.min,
                max: constraint.max,
            });
        }

        let range = constraint.range();
        let offset = (value - constraint.min) as u64;

        if range == 1 {
            return Ok(());
        }

        if range <= 255 {
            self.write_bits(offset, constraint.bits_needed());
        } else if range == 256 {
            self.align();
            self.write_bits(offset, 8);
        } else if range <= 65536 {
            self.align();
            self.write_bits(offset, 16);
        } else {
            // Indefinite-length case (10.5.7.4): octet count as a bit-field
            // constrained to 1..=max_octets, then the aligned octets.
            let max_octets = octets_needed(range - 1);
            let octets = octets_needed(offset);
            let len_constraint = Constraint::new(1, max_octets as i64);
            self.write_bits((octets - 1) as u64, len_constraint.bits_needed());
            self.align();
            self.write_bits(offset, octets * 8);
        }

        Ok(())
    }

    /// Encode semi-constrained whole number with lower bound 0 (X.691 Section 10.7)
    pub fn encode_semi_constrained_whole_number(&mut self, value: u64) -> PerResult<()> {
        let octets = octets_needed(value);
        self.encode_length_determinant(octets)?;
        self.write_bits(value, octets * 8);
        Ok(())
    }

    /// Encode unconstrained whole number (X.691 Section 10.8)
    pub fn encode_unconstrained_whole_number(&mut self, value: i64) -> PerResult<()> {
        let raw = value.to_be_bytes();
        // Drop redundant sign octets while keeping the sign bit intact
        let mut start = 0;
        while start < raw.len() - 1 {
            let redundant = (raw[start] == 0x00 && raw[start + 1] & 0x80 == 0)
                || (raw[start] == 0xFF && raw[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        let bytes = &raw[start..];
        self.encode_length_determinant(bytes.len())?;
        self.write_bytes(bytes);
        Ok(())
    }

    /// Encode unconstrained length determinant (X.691 Section 10.9.3.5 - 10.9.3.7)
    pub fn encode_length_determinant(&mut self, length: usize) -> PerResult<()> {
        self.align();
        if length <= 127 {
            self.write_bits(length as u64, 8);
        } else if length <= MAX_UNFRAGMENTED_LENGTH {
            self.write_bits(0x8000 | length as u64, 16);
        } else {
            return Err(PerError::InvalidLength { length });
        }
        Ok(())
    }

    /// Encode constrained length determinant (upper bound below 64K)
    pub fn encode_constrained_length(
        &mut self,
        length: usize,
        min: usize,
        max: usize,
    ) -> PerResult<()> {
        if max >= 65536 {
            return self.encode_length_determinant(length);
        }
        let constraint = Constraint::new(min as i64, max as i64);
        self.encode_constrained_whole_number(length as i64, &constraint)
    }

    /// Encode ENUMERATED (X.691 Section 13)
    pub fn encode_enumerated(&mut self, value: i64, constraint: &Constraint) -> PerResult<()> {
        if constraint.extensible {
            let in_root = constraint.contains(value);
            self.write_bit(!in_root);
            if in_root {
                self.encode_constrained_whole_number(value, constraint)?;
            } else if value > constraint.max {
                self.encode_normally_small_non_negative((value - constraint.max - 1) as u64)?;
            } else {
                return Err(PerError::ConstraintViolation {
                    value,
                    min: constraint.min,
                    max: constraint.max,
                });
            }
        } else {
            self.encode_constrained_whole_number(value, constraint)?;
        }
        Ok(())
    }

    /// Encode normally small non-negative whole number (X.691 Section 10.6)
    pub fn encode_normally_small_non_negative(&mut self, value: u64) -> PerResult<()> {
        if value <= 63 {
            self.write_bit(false);
            self.write_bits(value, 6);
        } else {
            self.write_bit(true);
            self.encode_semi_constrained_whole_number(value)?;
        }
        Ok(())
    }

    /// Encode CHOICE index (X.691 Section 23)
    pub fn encode_choice_index(
        &mut self,
        index: usize,
        num_alternatives: usize,
        extensible: bool,
    ) -> PerResult<()> {
        let constraint = Constraint::new(0, num_alternatives as i64 - 1);
        if extensible {
            let in_root = index < num_alternatives;
            self.write_bit(!in_root);
            if in_root {
                self.encode_constrained_whole_number(index as i64, &constraint)?;
            } else {
                self.encode_normally_small_non_negative((index - num_alternatives) as u64)?;
            }
        } else {
            if index >= num_alternatives {
                return Err(PerError::InvalidChoiceIndex {
                    index,
                    max: num_alternatives - 1,
                });
            }
            self.encode_constrained_whole_number(index as i64, &constraint)?;
        }
        Ok(())
    }

    /// Encode OCTET STRING (X.691 Section 17)
    pub fn encode_octet_string(
        &mut self,
        data: &[u8],
        min_len: Option<usize>,
        max_len: Option<usize>,
    ) -> PerResult<()> {
        let len = data.len();

        match (min_len, max_len) {
            (Some(min), Some(max)) if min == max => {
                if len != min {
                    return Err(PerError::InvalidLength { length: len });
                }
                if min > 2 {
                    self.align();
                }
                self.write_bytes(data);
            }
            (Some(min), Some(max)) => {
                if len < min || len > max {
                    return Err(PerError::InvalidLength { length: len });
                }
                self.encode_constrained_length(len, min, max)?;
                self.align();
                self.write_bytes(data);
            }
            _ => {
                self.encode_length_determinant(len)?;
                self.write_bytes(data);
            }
        }
        Ok(())
    }

    /// Encode a known-multiplier character string with 8-bit characters,
    /// e.g. `PrintableString (SIZE (1..150, ...))` (X.691 Section 30)
    pub fn encode_char_string(
        &mut self,
        text: &str,
        min_len: usize,
        max_len: usize,
        extensible: bool,
    ) -> PerResult<()> {
        let len = text.len();
        let in_root = len >= min_len && len <= max_len;
        if extensible {
            self.write_bit(!in_root);
        } else if !in_root {
            return Err(PerError::InvalidLength { length: len });
        }
        if in_root {
            self.encode_constrained_length(len, min_len, max_len)?;
            if max_len * 8 > 16 {
                self.align();
            }
        } else {
            self.encode_length_determinant(len)?;
        }
        self.write_bytes(text.as_bytes());
        Ok(())
    }

    /// Encode BIT STRING (X.691 Section 16)
    pub fn encode_bit_string(
        &mut self,
        bits: &BitSlice<u8, Msb0>,
        min_len: Option<usize>,
        max_len: Option<usize>,
    ) -> PerResult<()> {
        let len = bits.len();

        match (min_len, max_len) {
            (Some(min), Some(max)) if min == max => {
                if len != min {
                    return Err(PerError::InvalidLength { length: len });
                }
                if min > 16 {
                    self.align();
                }
            }
            (Some(min), Some(max)) => {
                if len < min || len > max {
                    return Err(PerError::InvalidLength { length: len });
                }
                self.encode_constrained_length(len, min, max)?;
                if max > 16 {
                    self.align();
                }
            }
            _ => {
                self.encode_length_determinant(len)?;
            }
        }
        self.buffer.extend_from_bitslice(bits);
        Ok(())
    }

    /// Encode the low `len` bits of `value` as a BIT STRING
    pub fn encode_bit_string_u64(
        &mut self,
        value: u64,
        len: usize,
        min_len: Option<usize>,
        max_len: Option<usize>,
    ) -> PerResult<()> {
        let mut bits: BitVec<u8, Msb0> = BitVec::with_capacity(len);
        for i in (0..len).rev() {
            bits.push((value >> i) & 1 == 1);
        }
        self.encode_bit_string(&bits, min_len, max_len)
    }

    /// Encode an OPEN TYPE: the already encoded value, wrapped in a length determinant
    pub fn encode_open_type(&mut self, encoded: &[u8]) -> PerResult<()> {
        self.encode_length_determinant(encoded.len())?;
        self.write_bytes(encoded);
        Ok(())
    }

    /// Encode `value` into its own buffer and write it as an OPEN TYPE
    pub fn encode_open_type_of<T: AperEncode + ?Sized>(&mut self, value: &T) -> PerResult<()> {
        let mut inner = AperEncoder::new();
        value.encode_aper(&mut inner)?;
        inner.align();
        let bytes = inner.into_bytes();
        if bytes.is_empty() {
            // An empty encoding is carried as a single zero octet (X.691 10.2.2)
            return self.encode_open_type(&[0]);
        }
        self.encode_open_type(&bytes)
    }
}

impl Default for AperEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// APER (Aligned PER) Decoder
pub struct AperDecoder<'a> {
    data: &'a BitSlice<u8, Msb0>,
    position: usize,
}

impl<'a> AperDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data: BitSlice::from_slice(data),
            position: 0,
        }
    }

    /// Get current bit position
    pub fn bit_position(&self) -> usize {
        self.position
    }

    /// Get remaining bits
    pub fn remaining_bits(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Align to octet boundary
    pub fn align(&mut self) {
        let remainder = self.position % 8;
        if remainder != 0 {
            self.position += 8 - remainder;
        }
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> PerResult<bool> {
        if self.position >= self.data.len() {
            return Err(PerError::BufferUnderflow {
                needed: 1,
                available: 0,
            });
        }
        let bit = self.data[self.position];
        self.position += 1;
        Ok(bit)
    }

    /// Read multiple bits as a value (MSB first)
    pub fn read_bits(&mut self, num_bits: usize) -> PerResult<u64> {
        if num_bits > 64 || self.position + num_bits > self.data.len() {
            return Err(PerError::BufferUnderflow {
                needed: num_bits,
                available: self.remaining_bits(),
            });
        }

        let mut value: u64 = 0;
        for _ in 0..num_bits {
            value = (value << 1) | (self.data[self.position] as u64);
            self.position += 1;
        }
        Ok(value)
    }

    /// Read raw bytes
    pub fn read_bytes(&mut self, num_bytes: usize) -> PerResult<Vec<u8>> {
        if self.remaining_bits() < num_bytes * 8 {
            return Err(PerError::BufferUnderflow {
                needed: num_bytes * 8,
                available: self.remaining_bits(),
            });
        }
        let mut bytes = Vec::with_capacity(num_bytes);
        for _ in 0..num_bytes {
            bytes.push(self.read_bits(8)? as u8);
        }
        Ok(bytes)
    }

    /// Read exactly N raw bytes into an array
    pub fn read_array<const N: usize>(&mut self) -> PerResult<[u8; N]> {
        let mut out = [0u8; N];
        for byte in out.iter_mut() {
            *byte = self.read_bits(8)? as u8;
        }
        Ok(out)
    }

    /// Decode constrained whole number (X.691 Section 10.5)
    pub fn decode_constrained_whole_number(&mut self, constraint: &Constraint) -> PerResult<i64> {
        let range = constraint.range();

        if range == 1 {
            return Ok(constraint.min);
        }

        let offset = if range <= 255 {
            self.read_bits(constraint.bits_needed())?
        } else if range == 256 {
            self.align();
            self.read_bits(8)?
        } else if range <= 65536 {
            self.align();
            self.read_bits(16)?
        } else {
            let max_octets = octets_needed(range - 1);
            let len_constraint = Constraint::new(1, max_octets as i64);
            let octets = self.read_bits(len_constraint.bits_needed())? as usize + 1;
            if octets > max_octets {
                return Err(PerError::InvalidLength { length: octets });
            }
            self.align();
            self.read_bits(octets * 8)?
        };

        let value = constraint.min + offset as i64;
        if !constraint.contains(value) {
            return Err(PerError::ConstraintViolation {
                value,
                min: constraint.min,
                max: constraint.max,
            });
        }
        Ok(value)
    }

    /// Decode semi-constrained whole number with lower bound 0 (X.691 Section 10.7)
    pub fn decode_semi_constrained_whole_number(&mut self) -> PerResult<u64> {
        let len = self.decode_length_determinant()?;
        if len == 0 || len > 8 {
            return Err(PerError::InvalidLength { length: len });
        }
        self.read_bits(len * 8)
    }

    /// Decode unconstrained whole number (X.691 Section 10.8)
    pub fn decode_unconstrained_whole_number(&mut self) -> PerResult<i64> {
        let len = self.decode_length_determinant()?;
        if len > 8 {
            return Err(PerError::InvalidLength { length: len });
        }
        let bytes = self.read_bytes(len)?;

        let Some(first) = bytes.first() else {
            return Ok(0);
        };

        let mut value: i64 = if first & 0x80 != 0 { -1 } else { 0 };
        for byte in bytes {
            value = (value << 8) | (byte as i64);
        }

        Ok(value)
    }

    /// Decode unconstrained length determinant
    pub fn decode_length_determinant(&mut self) -> PerResult<usize> {
        self.align();
        let first_byte = self.read_bits(8)? as u8;

        if first_byte & 0x80 == 0 {
            Ok(first_byte as usize)
        } else if first_byte & 0x40 == 0 {
            let second_byte = self.read_bits(8)? as u8;
            Ok((((first_byte & 0x3F) as usize) << 8) | (second_byte as usize))
        } else {
            Err(PerError::UnsupportedExtension)
        }
    }

    /// Decode constrained length determinant
    pub fn decode_constrained_length(&mut self, min: usize, max: usize) -> PerResult<usize> {
        if max >= 65536 {
            return self.decode_length_determinant();
        }
        let constraint = Constraint::new(min as i64, max as i64);
        self.decode_constrained_whole_number(&constraint)
            .map(|v| v as usize)
    }

    /// Decode ENUMERATED (X.691 Section 13)
    pub fn decode_enumerated(&mut self, constraint: &Constraint) -> PerResult<i64> {
        if constraint.extensible && self.read_bit()? {
            let value = self.decode_normally_small_non_negative()?;
            return Ok(constraint.max + 1 + value as i64);
        }
        self.decode_constrained_whole_number(constraint)
    }

    /// Decode normally small non-negative whole number (X.691 Section 10.6)
    pub fn decode_normally_small_non_negative(&mut self) -> PerResult<u64> {
        if self.read_bit()? {
            self.decode_semi_constrained_whole_number()
        } else {
            self.read_bits(6)
        }
    }

    /// Decode CHOICE index (X.691 Section 23)
    pub fn decode_choice_index(
        &mut self,
        num_alternatives: usize,
        extensible: bool,
    ) -> PerResult<usize> {
        if extensible && self.read_bit()? {
            let ext_index = self.decode_normally_small_non_negative()?;
            return Ok(num_alternatives + ext_index as usize);
        }
        let constraint = Constraint::new(0, num_alternatives as i64 - 1);
        self.decode_constrained_whole_number(&constraint)
            .map(|v| v as usize)
    }

    /// Decode OCTET STRING (X.691 Section 17)
    pub fn decode_octet_string(
        &mut self,
        min_len: Option<usize>,
        max_len: Option<usize>,
    ) -> PerResult<Vec<u8>> {
        let len = match (min_len, max_len) {
            (Some(min), Some(max)) if min == max => {
                if min > 2 {
                    self.align();
                }
                min
            }
            (Some(min), Some(max)) => {
                let len = self.decode_constrained_length(min, max)?;
                self.align();
                len
            }
            _ => self.decode_length_determinant()?,
        };

        self.read_bytes(len)
    }

    /// Decode a fixed-size OCTET STRING straight into an array
    pub fn decode_fixed_octets<const N: usize>(&mut self) -> PerResult<[u8; N]> {
        if N > 2 {
            self.align();
        }
        self.read_array::<N>()
    }

    /// Decode a known-multiplier character string with 8-bit characters
    pub fn decode_char_string(
        &mut self,
        min_len: usize,
        max_len: usize,
        extensible: bool,
    ) -> PerResult<String> {
        let extended = extensible && self.read_bit()?;
        let len = if extended {
            self.decode_length_determinant()?
        } else {
            let len = self.decode_constrained_length(min_len, max_len)?;
            if max_len * 8 > 16 {
                self.align();
            }
            len
        };
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| PerError::DecodeError(e.to_string()))
    }

    /// Decode BIT STRING (X.691 Section 16)
    pub fn decode_bit_string(
        &mut self,
        min_len: Option<usize>,
        max_len: Option<usize>,
    ) -> PerResult<BitVec<u8, Msb0>> {
        let len = match (min_len, max_len) {
            (Some(min), Some(max)) if min == max => {
                if min > 16 {
                    self.align();
                }
                min
            }
            (Some(min), Some(max)) => {
                let len = self.decode_constrained_length(min, max)?;
                if max > 16 {
                    self.align();
                }
                len
            }
            _ => self.decode_length_determinant()?,
        };

        if self.remaining_bits() < len {
            return Err(PerError::BufferUnderflow {
                needed: len,
                available: self.remaining_bits(),
            });
        }
        let bits = self.data[self.position..self.position + len].to_bitvec();
        self.position += len;
        Ok(bits)
    }

    /// Decode a BIT STRING of at most 64 bits, returning (value, length)
    pub fn decode_bit_string_u64(
        &mut self,
        min_len: Option<usize>,
        max_len: Option<usize>,
    ) -> PerResult<(u64, usize)> {
        let bits = self.decode_bit_string(min_len, max_len)?;
        if bits.len() > 64 {
            return Err(PerError::InvalidLength { length: bits.len() });
        }
        let value = bits.iter().fold(0u64, |acc, bit| (acc << 1) | (*bit as u64));
        Ok((value, bits.len()))
    }

    /// Decode an OPEN TYPE, returning the raw encoded value
    pub fn decode_open_type(&mut self) -> PerResult<Vec<u8>> {
        let len = self.decode_length_determinant()?;
        self.read_bytes(len)
    }
}

/// Trait for types that can be encoded with APER
pub trait AperEncode {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()>;
}

/// Trait for types that can be decoded with APER
pub trait AperDecode: Sized {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self>;
}

/// Encode a value into an aligned byte vector
pub fn encode_to_vec<T: AperEncode + ?Sized>(value: &T) -> PerResult<Vec<u8>> {
    let mut encoder = AperEncoder::new();
    value.encode_aper(&mut encoder)?;
    encoder.align();
    Ok(encoder.into_bytes().to_vec())
}

/// Decode a value from a byte slice
pub fn decode_from_slice<T: AperDecode>(data: &[u8]) -> PerResult<T> {
    let mut decoder = AperDecoder::new(data);
    T::decode_aper(&mut decoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_bits_needed() {
        assert_eq!(Constraint::new(0, 0).bits_needed(), 0);
        assert_eq!(Constraint::new(0, 1).bits_needed(), 1);
        assert_eq!(Constraint::new(0, 2).bits_needed(), 2);
        assert_eq!(Constraint::new(0, 3).bits_needed(), 2);
        assert_eq!(Constraint::new(0, 7).bits_needed(), 3);
        assert_eq!(Constraint::new(0, 255).bits_needed(), 8);
    }

    #[test]
    fn test_encode_decode_constrained() {
        let constraint = Constraint::new(0, 2);

        for value in 0..=2 {
            let mut encoder = AperEncoder::new();
            encoder.encode_constrained_whole_number(value, &constraint).unwrap();
            encoder.align();

            let bytes = encoder.into_bytes();
            let mut decoder = AperDecoder::new(&bytes);
            let decoded = decoder.decode_constrained_whole_number(&constraint).unwrap();

            assert_eq!(value, decoded);
        }
    }

    #[test]
    fn test_constrained_out_of_range() {
        let mut encoder = AperEncoder::new();
        let err = encoder
            .encode_constrained_whole_number(9, &Constraint::new(0, 5))
            .unwrap_err();
        assert!(matches!(err, PerError::ConstraintViolation { value: 9, .. }));
    }

    #[test]
    fn test_large_range_uses_octet_count() {
        // AMF-UE-NGAP-ID (0..2^40-1): 3-bit octet count, align, octets
        let constraint = Constraint::new(0, (1 << 40) - 1);
        let mut encoder = AperEncoder::new();
        encoder.encode_constrained_whole_number(1, &constraint).unwrap();
        assert_eq!(encoder.into_bytes().as_ref(), &[0x00, 0x01]);

        let mut encoder = AperEncoder::new();
        encoder.encode_constrained_whole_number(0x0102_0304_05, &constraint).unwrap();
        assert_eq!(encoder.into_bytes().as_ref(), &[0x80, 0x01, 0x02, 0x03, 0x04, 0x05]);

        // RAN-UE-NGAP-ID (0..2^32-1): 2-bit octet count
        let constraint = Constraint::new(0, u32::MAX as i64);
        let mut encoder = AperEncoder::new();
        encoder.encode_constrained_whole_number(0x1234, &constraint).unwrap();
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.as_ref(), &[0x40, 0x12, 0x34]);
        let mut decoder = AperDecoder::new(&bytes);
        assert_eq!(decoder.decode_constrained_whole_number(&constraint).unwrap(), 0x1234);
    }

    #[test]
    fn test_extensible_enumerated_extension_value() {
        let constraint = Constraint::extensible(0, 44);
        let mut encoder = AperEncoder::new();
        encoder.encode_enumerated(46, &constraint).unwrap();
        encoder.align();
        let bytes = encoder.into_bytes();
        // extension bit, normally-small 0 + six bits of (46 - 45)
        assert_eq!(bytes[0], 0b1000_0001);

        let mut decoder = AperDecoder::new(&bytes);
        assert_eq!(decoder.decode_enumerated(&constraint).unwrap(), 46);
    }

    #[test]
    fn test_encode_decode_length() {
        for len in [0, 1, 127, 128, 255, 1000, 16383] {
            let mut encoder = AperEncoder::new();
            encoder.encode_length_determinant(len).unwrap();

            let bytes = encoder.into_bytes();
            let mut decoder = AperDecoder::new(&bytes);
            let decoded = decoder.decode_length_determinant().unwrap();

            assert_eq!(len, decoded);
        }
    }

    #[test]
    fn test_fragmented_length_rejected() {
        let mut encoder = AperEncoder::new();
        assert!(encoder.encode_length_determinant(20000).is_err());
        let mut decoder = AperDecoder::new(&[0xC1, 0x00]);
        assert_eq!(
            decoder.decode_length_determinant().unwrap_err(),
            PerError::UnsupportedExtension
        );
    }

    #[test]
    fn test_unconstrained_whole_number() {
        for value in [0i64, 1, 127, 128, 255, 256, -1, -128, -129, 1 << 40] {
            let mut encoder = AperEncoder::new();
            encoder.encode_unconstrained_whole_number(value).unwrap();
            let bytes = encoder.into_bytes();
            let mut decoder = AperDecoder::new(&bytes);
            assert_eq!(decoder.decode_unconstrained_whole_number().unwrap(), value);
        }
    }

    #[test]
    fn test_encode_decode_octet_string() {
        let data = vec![0x01, 0x02, 0x03, 0x04];

        let mut encoder = AperEncoder::new();
        encoder.encode_octet_string(&data, None, None).unwrap();

        let bytes = encoder.into_bytes();
        let mut decoder = AperDecoder::new(&bytes);
        let decoded = decoder.decode_octet_string(None, None).unwrap();

        assert_eq!(data, decoded);
    }

    #[test]
    fn test_printable_string_layout() {
        let mut encoder = AperEncoder::new();
        encoder.encode_char_string("amf1", 1, 150, true).unwrap();
        let bytes = encoder.into_bytes();
        // ext bit 0, 8-bit length offset 3, align, characters
        assert_eq!(bytes.as_ref(), &[0x01, 0x80, b'a', b'm', b'f', b'1']);

        let mut decoder = AperDecoder::new(&bytes);
        assert_eq!(decoder.decode_char_string(1, 150, true).unwrap(), "amf1");
    }

    #[test]
    fn test_bit_string_aligned_after_length() {
        let mut encoder = AperEncoder::new();
        encoder.encode_bit_string_u64(0x000102, 24, Some(22), Some(32)).unwrap();
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.as_ref(), &[0x20, 0x00, 0x01, 0x02]);

        let mut decoder = AperDecoder::new(&bytes);
        assert_eq!(
            decoder.decode_bit_string_u64(Some(22), Some(32)).unwrap(),
            (0x000102, 24)
        );
    }

    #[test]
    fn test_read_past_end() {
        let mut decoder = AperDecoder::new(&[0xFF]);
        assert!(decoder.read_bytes(2).is_err());
        assert!(matches!(
            decoder.read_bits(9),
            Err(PerError::BufferUnderflow { needed: 9, .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Bit-field, single octet, two octet and octet-count ranges
        fn arb_constraint() -> impl Strategy<Value = Constraint> {
            let span = prop_oneof![0u64..256, 256u64..65536, 65536u64..(1 << 40)];
            (-1000i64..1000, span).prop_map(|(min, span)| Constraint::new(min, min + span as i64))
        }

        fn arb_value_in_range() -> impl Strategy<Value = (Constraint, i64)> {
            arb_constraint().prop_flat_map(|c| (Just(c), c.min..=c.max))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn prop_constrained_whole_number_roundtrip((constraint, value) in arb_value_in_range(), offset in 0usize..8) {
                let mut encoder = AperEncoder::new();
                encoder.write_bits(0, offset);
                encoder.encode_constrained_whole_number(value, &constraint).unwrap();
                let bytes = encoder.into_bytes();

                let mut decoder = AperDecoder::new(&bytes);
                decoder.read_bits(offset).unwrap();
                prop_assert_eq!(decoder.decode_constrained_whole_number(&constraint).unwrap(), value);
            }

            #[test]
            fn prop_constrained_whole_number_rejects_outside(constraint in arb_constraint(), below in 1i64..1000) {
                let mut encoder = AperEncoder::new();
                let low = encoder.encode_constrained_whole_number(constraint.min - below, &constraint);
                prop_assert!(matches!(low, Err(PerError::ConstraintViolation { .. })), "below min accepted");
                let high = encoder.encode_constrained_whole_number(constraint.max + below, &constraint);
                prop_assert!(matches!(high, Err(PerError::ConstraintViolation { .. })), "above max accepted");
            }

            #[test]
            fn prop_length_determinant_roundtrip(length in 0usize..=MAX_UNFRAGMENTED_LENGTH) {
                let mut encoder = AperEncoder::new();
                encoder.encode_length_determinant(length).unwrap();
                let bytes = encoder.into_bytes();
                prop_assert_eq!(bytes.len(), if length <= 127 { 1 } else { 2 });
                prop_assert_eq!(AperDecoder::new(&bytes).decode_length_determinant().unwrap(), length);
            }

            #[test]
            fn prop_unconstrained_whole_number_roundtrip(value in any::<i64>()) {
                let mut encoder = AperEncoder::new();
                encoder.encode_unconstrained_whole_number(value).unwrap();
                let bytes = encoder.into_bytes();
                prop_assert_eq!(AperDecoder::new(&bytes).decode_unconstrained_whole_number().unwrap(), value);
            }

            #[test]
            fn prop_sized_octet_string_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..64), slack in 0usize..300) {
                let (min, max) = (data.len().saturating_sub(slack), data.len() + slack);
                let mut encoder = AperEncoder::new();
                encoder.encode_octet_string(&data, Some(min), Some(max)).unwrap();
                let bytes = encoder.into_bytes();
                prop_assert_eq!(AperDecoder::new(&bytes).decode_octet_string(Some(min), Some(max)).unwrap(), data);
            }

            #[test]
            fn prop_decoder_never_panics(data in proptest::collection::vec(any::<u8>(), 0..24), constraint in arb_constraint()) {
                let _ = AperDecoder::new(&data).decode_constrained_whole_number(&constraint);
                let _ = AperDecoder::new(&data).decode_length_determinant();
                let _ = AperDecoder::new(&data).decode_octet_string(None, None);
                let _ = AperDecoder::new(&data).decode_bit_string_u64(Some(22), Some(32));
                let _ = AperDecoder::new(&data).decode_open_type();
            }
        }
    }
}
