//! Probe-by-probe bit acquisition with total-failure screening.
//!
//! Raw bytes are pulled in fixed 100-byte probes. Each probe is screened
//! before any of its bits are used: a generator that has locked onto a
//! repetitive pattern shows up as one byte value dominating the probe.

use crate::bits::BitString;
use crate::channel::{ReadLimits, SerialChannel};
use crate::error::{Error, Result};

/// Bytes per probe.
pub const PROBE_SIZE: usize = 100;

/// Most times a single byte value may occur within one probe.
pub const IDENTICAL_BYTE_LIMIT: usize = 6;

const PREALLOCATED_BITS: usize = 64 * PROBE_SIZE * 8;

/// True iff any byte value occurs more than [`IDENTICAL_BYTE_LIMIT`] times.
pub fn is_total_failure(probe: &[u8]) -> bool {
    let mut counts = [0usize; 256];
    for &byte in probe {
        counts[byte as usize] += 1;
        if counts[byte as usize] > IDENTICAL_BYTE_LIMIT {
            return true;
        }
    }
    false
}

/// Read probes from an open, powered channel until `total_length` bits are
/// collected.
///
/// A tripped detector aborts with [`Error::TotalFailure`] carrying the bits
/// of every probe accepted so far. Transport faults, stalls and cancellation
/// discard all progress.
pub(crate) fn acquire_from(
    channel: &mut SerialChannel,
    total_length: usize,
    limits: &ReadLimits,
) -> Result<BitString> {
    if total_length == 0 {
        return Err(Error::InvalidInput("bit length must be at least 1".to_string()));
    }
    // Grows probe by probe past this; the caller bounds the total.
    let mut bits = BitString::with_capacity(total_length.min(PREALLOCATED_BITS));
    while bits.len() < total_length {
        let probe = channel.read_exact(PROBE_SIZE, limits)?;
        if is_total_failure(&probe) {
            return Err(Error::TotalFailure { partial: bits });
        }
        bits.push_bytes(&probe);
    }
    bits.truncate(total_length);
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Behavior, SimulatedTrng};
    use std::time::Duration;

    fn distinct_probe() -> Vec<u8> {
        (0..PROBE_SIZE as u8).collect()
    }

    fn powered(sim: &SimulatedTrng) -> SerialChannel {
        let mut channel = SerialChannel::new(Box::new(sim.connector()));
        channel.open().unwrap();
        channel.write(b"on").unwrap();
        channel
    }

    #[test]
    fn identical_bytes_trip_detector() {
        for value in [0x00u8, 0x55, 0xFF] {
            assert!(is_total_failure(&[value; PROBE_SIZE]));
        }
    }

    #[test]
    fn six_of_each_value_passes() {
        let mut probe = Vec::new();
        for value in 0..16u8 {
            probe.extend(std::iter::repeat_n(value, 6));
        }
        probe.extend([200, 201, 202, 203]);
        assert_eq!(probe.len(), PROBE_SIZE);
        assert!(!is_total_failure(&probe));
        assert!(!is_total_failure(&distinct_probe()));
    }

    #[test]
    fn seventh_repeat_trips() {
        let mut probe = distinct_probe();
        for slot in probe.iter_mut().take(7) {
            *slot = 0x42;
        }
        assert!(is_total_failure(&probe));
    }

    #[test]
    fn acquires_exact_length() {
        let sim = SimulatedTrng::with_seed(Behavior::Healthy, 3);
        let mut channel = powered(&sim);
        let limits = ReadLimits::new(Duration::from_secs(1));
        for len in [1, 7, 800, 801, 5000] {
            let bits = acquire_from(&mut channel, len, &limits).unwrap();
            assert_eq!(bits.len(), len);
        }
    }

    #[test]
    fn stuck_generator_fails_with_no_bits() {
        let sim = SimulatedTrng::new(Behavior::Stuck(0x00));
        let mut channel = powered(&sim);
        let limits = ReadLimits::new(Duration::from_secs(1));
        match acquire_from(&mut channel, 64, &limits) {
            Err(Error::TotalFailure { partial }) => assert!(partial.is_empty()),
            other => panic!("expected total failure, got {other:?}"),
        }
    }

    #[test]
    fn mid_stream_failure_salvages_accepted_probes() {
        // Probes 1 and 2 are clean, probe 3 is half filler.
        let sim = SimulatedTrng::with_seed(Behavior::FailAfter { healthy_bytes: 250 }, 9);
        let mut channel = powered(&sim);
        let limits = ReadLimits::new(Duration::from_secs(1));
        match acquire_from(&mut channel, 10_000, &limits) {
            Err(Error::TotalFailure { partial }) => assert_eq!(partial.len(), 2 * PROBE_SIZE * 8),
            other => panic!("expected total failure, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_is_rejected() {
        let sim = SimulatedTrng::new(Behavior::Healthy);
        let mut channel = powered(&sim);
        let limits = ReadLimits::new(Duration::from_secs(1));
        assert!(matches!(
            acquire_from(&mut channel, 0, &limits),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn connection_fault_discards_progress() {
        let sim = SimulatedTrng::new(Behavior::Healthy);
        let mut channel = powered(&sim);
        sim.unplug();
        let limits = ReadLimits::new(Duration::from_secs(1));
        assert!(matches!(
            acquire_from(&mut channel, 100, &limits),
            Err(Error::Connection { .. })
        ));
    }
}
