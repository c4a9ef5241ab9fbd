//! Slicing an acquired bit string into fixed-width hex numbers.

use crate::bits::BitString;
use crate::error::{Error, Result};

/// Output of [`Device::generate_numbers`](crate::Device::generate_numbers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Uppercase hex numbers, each encoding `length` bits.
    pub numbers: Vec<String>,
    /// The failure detector tripped during this call; `numbers` holds only
    /// what fit in the bits collected before the trip.
    pub total_failure: bool,
    /// Bits available for slicing.
    pub bits_acquired: usize,
}

/// Total bits needed for `count` numbers of `length` bits.
pub(crate) fn requested_bits(count: usize, length: usize) -> Result<usize> {
    if count == 0 || length == 0 {
        return Err(Error::InvalidInput(format!(
            "count and length must be at least 1 (got count={count}, length={length})"
        )));
    }
    count
        .checked_mul(length)
        .ok_or_else(|| Error::InvalidInput(format!("{count} x {length} bits overflows")))
}

/// Cut `bits` into at most `count` contiguous, non-overlapping slices of
/// `length` bits from the front, each hex encoded. Trailing bits that do not
/// fill a slice are dropped.
pub fn slice_numbers(bits: &BitString, count: usize, length: usize) -> Vec<String> {
    if length == 0 {
        return Vec::new();
    }
    let fit = (bits.len() / length).min(count);
    (0..fit)
        .map(|i| bits.slice(i * length, (i + 1) * length).to_hex())
        .collect()
}

/// Turn an acquisition outcome into numbers.
///
/// A detector trip is salvaged: as many whole numbers as fit in the partial
/// bits. Every other error passes through.
pub(crate) fn numbers_from(
    acquired: Result<BitString>,
    count: usize,
    length: usize,
) -> Result<Generated> {
    match acquired {
        Ok(bits) => Ok(Generated {
            numbers: slice_numbers(&bits, count, length),
            total_failure: false,
            bits_acquired: bits.len(),
        }),
        Err(Error::TotalFailure { partial }) => Ok(Generated {
            numbers: slice_numbers(&partial, partial.len() / length, length),
            total_failure: true,
            bits_acquired: partial.len(),
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_cover_string_from_front() {
        let bits = BitString::parse("1111000010100101").unwrap();
        assert_eq!(slice_numbers(&bits, 4, 4), vec!["F", "0", "A", "5"]);
        assert_eq!(slice_numbers(&bits, 2, 8), vec!["F0", "A5"]);
        assert_eq!(slice_numbers(&bits, 1, 16), vec!["F0A5"]);
    }

    #[test]
    fn slices_stop_at_count_or_available_bits() {
        let bits = BitString::parse("1111000010").unwrap();
        assert_eq!(slice_numbers(&bits, 1, 4), vec!["F"]);
        assert_eq!(slice_numbers(&bits, 10, 4), vec!["F", "0"]);
        assert!(slice_numbers(&bits, 3, 11).is_empty());
    }

    #[test]
    fn odd_widths_pad_the_leading_digit() {
        let bits = BitString::parse("111111").unwrap();
        assert_eq!(slice_numbers(&bits, 2, 3), vec!["7", "7"]);
    }

    #[test]
    fn requested_bits_validates() {
        assert_eq!(requested_bits(3, 8).unwrap(), 24);
        assert!(requested_bits(0, 8).is_err());
        assert!(requested_bits(8, 0).is_err());
        assert!(requested_bits(usize::MAX, 2).is_err());
    }

    #[test]
    fn total_failure_is_salvaged() {
        let partial = BitString::from_bytes(&[0xAB; 10]);
        let generated = numbers_from(Err(Error::TotalFailure { partial }), 100, 24).unwrap();
        assert!(generated.total_failure);
        assert_eq!(generated.bits_acquired, 80);
        assert_eq!(generated.numbers, vec!["ABABAB", "ABABAB", "ABABAB"]);
    }

    #[test]
    fn other_errors_pass_through() {
        let err = numbers_from(Err(Error::Cancelled), 1, 8).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
