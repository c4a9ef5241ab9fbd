//! # hwtrng-core
//!
//! Control and read a hardware true-random-number generator attached over a
//! serial link.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hwtrng_core::{Device, DeviceConfig};
//!
//! let config = DeviceConfig::from_env()?;
//! let device = Device::from_config(&config)?;
//!
//! // Force a known hardware state, then power the generator on.
//! device.boot_probe()?;
//! device.initialize()?.into_result()?;
//!
//! let out = device.generate_numbers(4, 32, &device.read_limits())?;
//! println!("{:?}", out.numbers);
//! # Ok::<(), hwtrng_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Channel → Device (state machine, lock) → Acquisition (probe screening) →
//! hex slicing / file export
//!
//! Every raw 100-byte probe passes through [`is_total_failure`] before its
//! bits are used. No conditioning or whitening is applied: output is the
//! generator's own bitstream.
//!
//! [`sim::SimulatedTrng`] stands in for the hardware when no port is
//! available.

pub mod acquisition;
pub mod bits;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod generation;
pub mod sim;

pub use acquisition::{IDENTICAL_BYTE_LIMIT, PROBE_SIZE, is_total_failure};
pub use bits::{BitString, binary_to_hex};
pub use channel::{CancelToken, Connector, ReadLimits, SerialChannel, SerialConnector, Transport};
pub use config::{DEFAULT_BAUD_RATE, DEFAULT_MAX_BITS, DeviceConfig, Timings};
pub use device::{Device, DeviceState, Transition};
pub use error::{Error, Result};
pub use export::FileFormat;
pub use generation::{Generated, slice_numbers};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
