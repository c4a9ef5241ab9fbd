//! Device configuration, read from the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `PORT` | serial port address | none |
//! | `BAUD_RATE` | link speed | 9600 |
//! | `TRNG_IO_TIMEOUT_MS` | per-call serial I/O timeout | 1000 |
//! | `TRNG_STALL_TIMEOUT_MS` | longest wait for generator bytes | 5000 |
//! | `TRNG_PROBE_SETTLE_MS` | pause after every liveness probe | 3000 |
//! | `TRNG_POWER_ON_SETTLE_MS` | pause after the `on` command | 1000 |

use std::time::Duration;

use crate::channel::SerialConnector;
use crate::error::{Error, Result};

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Largest acquisition a device accepts unless configured otherwise.
/// About 18 minutes of output at 9600 baud.
pub const DEFAULT_MAX_BITS: usize = 1 << 23;

/// Settle delays the device imposes between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait after every liveness probe, whatever its outcome.
    pub probe_settle: Duration,
    /// Wait after powering the generator on.
    pub power_on_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            probe_settle: Duration::from_secs(3),
            power_on_settle: Duration::from_secs(1),
        }
    }
}

impl Timings {
    /// No settle delays, for simulated devices.
    pub fn immediate() -> Self {
        Self {
            probe_settle: Duration::ZERO,
            power_on_settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub io_timeout: Duration,
    pub stall_timeout: Duration,
    pub timings: Timings,
    /// Upper bound on bits per acquisition.
    pub max_bits: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            io_timeout: Duration::from_secs(1),
            stall_timeout: Duration::from_secs(5),
            timings: Timings::default(),
            max_bits: DEFAULT_MAX_BITS,
        }
    }
}

impl DeviceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup, falling back to defaults for unset
    /// keys. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let baud_rate = match get("BAUD_RATE") {
            Some(v) => parse_number::<u32>("BAUD_RATE", &v)?,
            None => defaults.baud_rate,
        };
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(v) => Ok(Duration::from_millis(parse_number::<u64>(key, &v)?)),
                None => Ok(default),
            }
        };

        let max_bits = match get("TRNG_MAX_BITS") {
            Some(v) => parse_number::<usize>("TRNG_MAX_BITS", &v)?,
            None => defaults.max_bits,
        };
        if max_bits == 0 {
            return Err(Error::InvalidInput("TRNG_MAX_BITS must be positive".to_string()));
        }

        Ok(Self {
            port: get("PORT").map(|p| p.trim().to_string()),
            baud_rate,
            io_timeout: millis("TRNG_IO_TIMEOUT_MS", defaults.io_timeout)?,
            stall_timeout: millis("TRNG_STALL_TIMEOUT_MS", defaults.stall_timeout)?,
            timings: Timings {
                probe_settle: millis("TRNG_PROBE_SETTLE_MS", defaults.timings.probe_settle)?,
                power_on_settle: millis(
                    "TRNG_POWER_ON_SETTLE_MS",
                    defaults.timings.power_on_settle,
                )?,
            },
            max_bits,
        })
    }

    /// Build the serial connector for this configuration.
    pub fn serial_connector(&self) -> Result<SerialConnector> {
        let port = self
            .port
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("PORT is not set".to_string()))?;
        if self.baud_rate == 0 {
            return Err(Error::InvalidInput("BAUD_RATE must be positive".to_string()));
        }
        Ok(SerialConnector::new(port, self.baud_rate, self.io_timeout))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key}={value:?} is not a valid number")))
}
