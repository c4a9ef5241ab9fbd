//! Bit strings and their text, hex and packed-byte forms.
//!
//! A [`BitString`] stores one `u8` per bit (values 0 or 1), MSB first per
//! source byte. This is the same layout the randomness battery consumes, so
//! acquired bits can be handed to `hwtrng-tests` without conversion.

use std::fmt;

use crate::error::{Error, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// An immutable ordered sequence of bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitString {
    bits: Vec<u8>,
}

impl BitString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bits: Vec::with_capacity(bits),
        }
    }

    /// Unpack bytes into bits, MSB first per byte.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut out = Self::with_capacity(data.len() * 8);
        out.push_bytes(data);
        out
    }

    /// Parse `'0'`/`'1'` text. Any other character is an encoding error.
    pub fn parse(text: &str) -> Result<Self> {
        let bits = text
            .bytes()
            .enumerate()
            .map(|(i, c)| match c {
                b'0' => Ok(0),
                b'1' => Ok(1),
                _ => Err(Error::Encoding(format!(
                    "invalid character {:?} at position {i}",
                    c as char
                ))),
            })
            .collect::<Result<Vec<u8>>>()?;
        Ok(Self { bits })
    }

    pub(crate) fn push_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            for shift in (0..8).rev() {
                self.bits.push((byte >> shift) & 1);
            }
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.bits.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bits as a slice of 0/1 values.
    pub fn as_slice(&self) -> &[u8] {
        &self.bits
    }

    /// Copy of bits `start..end`.
    ///
    /// # Panics
    /// Panics if the range is out of bounds, like slice indexing.
    pub fn slice(&self, start: usize, end: usize) -> BitString {
        BitString {
            bits: self.bits[start..end].to_vec(),
        }
    }

    /// Uppercase hex, ceil(len/4) digits, the value right-aligned (leading
    /// zero bits pad the first digit). Empty input gives an empty string.
    pub fn to_hex(&self) -> String {
        let pad = (4 - self.bits.len() % 4) % 4;
        let mut out = String::with_capacity(self.bits.len().div_ceil(4));
        let mut nibble = 0usize;
        let mut filled = pad;
        for &bit in &self.bits {
            nibble = (nibble << 1) | bit as usize;
            filled += 1;
            if filled == 4 {
                out.push(HEX_DIGITS[nibble] as char);
                nibble = 0;
                filled = 0;
            }
        }
        out
    }

    /// Pack into ceil(len/8) bytes, big-endian, the value right-aligned.
    pub fn to_bytes(&self) -> Vec<u8> {
        let pad = (8 - self.bits.len() % 8) % 8;
        let mut out = Vec::with_capacity(self.bits.len().div_ceil(8));
        let mut byte = 0u8;
        let mut filled = pad;
        for &bit in &self.bits {
            byte = (byte << 1) | bit;
            filled += 1;
            if filled == 8 {
                out.push(byte);
                byte = 0;
                filled = 0;
            }
        }
        out
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self
            .bits
            .iter()
            .map(|&b| if b == 1 { '1' } else { '0' })
            .collect();
        f.write_str(&text)
    }
}

/// Convert a `'0'`/`'1'` string to uppercase hexadecimal.
///
/// The digit count is ceil(bits/4); the bit string is left-padded with zeros
/// to a multiple of four before conversion.
///
/// ```
/// assert_eq!(hwtrng_core::binary_to_hex("01100101").unwrap(), "65");
/// assert_eq!(hwtrng_core::binary_to_hex("00001").unwrap(), "01");
/// ```
pub fn binary_to_hex(binary: &str) -> Result<String> {
    if binary.is_empty() {
        return Err(Error::Encoding("empty binary string".to_string()));
    }
    Ok(BitString::parse(binary)?.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference decoder: each hex digit back to 4 bits, then keep the
    /// trailing `bits` characters.
    fn hex_to_binary(hex: &str, bits: usize) -> String {
        let full: String = hex
            .chars()
            .map(|c| format!("{:04b}", c.to_digit(16).unwrap()))
            .collect();
        full[full.len() - bits..].to_string()
    }

    #[test]
    fn from_bytes_is_msb_first() {
        let bits = BitString::from_bytes(&[0b1011_0001]);
        assert_eq!(bits.as_slice(), &[1, 0, 1, 1, 0, 0, 0, 1]);
        assert_eq!(bits.to_string(), "10110001");
    }

    #[test]
    fn hex_examples() {
        assert_eq!(binary_to_hex("01100101").unwrap(), "65");
        assert_eq!(binary_to_hex("1").unwrap(), "1");
        assert_eq!(binary_to_hex("0").unwrap(), "0");
        assert_eq!(binary_to_hex("11111").unwrap(), "1F");
        assert_eq!(binary_to_hex("000000000").unwrap(), "000");
        assert_eq!(binary_to_hex("1010101111001101").unwrap(), "ABCD");
    }

    #[test]
    fn hex_rejects_non_binary_and_empty() {
        assert!(matches!(binary_to_hex("0120"), Err(Error::Encoding(_))));
        assert!(matches!(binary_to_hex("10 1"), Err(Error::Encoding(_))));
        assert!(matches!(binary_to_hex(""), Err(Error::Encoding(_))));
    }

    #[test]
    fn hex_decodes_back_for_every_length_up_to_64() {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        for bits in 1..=64usize {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let text: String = (0..bits)
                .map(|i| if (state >> (i % 64)) & 1 == 1 { '1' } else { '0' })
                .collect();
            let hex = binary_to_hex(&text).unwrap();
            assert_eq!(hex.len(), bits.div_ceil(4), "digit count for {bits} bits");
            assert_eq!(hex_to_binary(&hex, bits), text, "round trip for {bits} bits");
        }
    }

    #[test]
    fn to_bytes_right_aligns_value() {
        assert_eq!(BitString::parse("101").unwrap().to_bytes(), vec![0x05]);
        assert_eq!(
            BitString::parse("111111111").unwrap().to_bytes(),
            vec![0x01, 0xFF]
        );
        assert_eq!(BitString::from_bytes(&[0xDE, 0xAD]).to_bytes(), vec![0xDE, 0xAD]);
        assert!(BitString::new().to_bytes().is_empty());
    }

    #[test]
    fn slice_copies_range() {
        let bits = BitString::parse("110010").unwrap();
        assert_eq!(bits.slice(2, 5).to_string(), "001");
    }
}
