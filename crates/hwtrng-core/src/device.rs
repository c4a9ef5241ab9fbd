//! The generator's power state machine.
//!
//! The hardware reports nothing about itself, so the device tracks its state
//! in software and probes the link before every transition: the cable can be
//! pulled between calls.
//!
//! One mutex guards the channel and the state flag together. Probes,
//! transitions and acquisitions each hold it for their whole duration, so a
//! shutdown can never close the channel under an in-flight read.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use crate::acquisition::acquire_from;
use crate::bits::BitString;
use crate::channel::{Connector, ReadLimits, SerialChannel};
use crate::config::{DEFAULT_MAX_BITS, DeviceConfig, Timings};
use crate::error::{Error, Result};
use crate::export::{self, FileFormat};
use crate::generation::{self, Generated};

const CMD_ON: &[u8] = b"on";
const CMD_OFF: &[u8] = b"off";
const CMD_CHECK: &[u8] = b"check";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Standby,
    On,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standby => write!(f, "standby"),
            Self::On => write!(f, "on"),
        }
    }
}

/// Outcome of a power transition that did not fail.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The requested change was made.
    Applied,
    /// `initialize` found the device already on.
    AlreadyOn,
    /// `shutdown`/`restart` found the device in standby.
    AlreadyOff,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }

    /// Map the no-op outcomes to [`Error::AlreadyOn`] / [`Error::AlreadyOff`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Applied => Ok(()),
            Self::AlreadyOn => Err(Error::AlreadyOn),
            Self::AlreadyOff => Err(Error::AlreadyOff),
        }
    }
}

struct Shared {
    channel: SerialChannel,
    state: DeviceState,
}

/// A serial TRNG and everything needed to drive it.
pub struct Device {
    shared: Mutex<Shared>,
    timings: Timings,
    stall_timeout: Duration,
    max_bits: usize,
}

impl Device {
    pub fn new(connector: Box<dyn Connector>, timings: Timings, stall_timeout: Duration) -> Self {
        Self {
            shared: Mutex::new(Shared {
                channel: SerialChannel::new(connector),
                state: DeviceState::Standby,
            }),
            timings,
            stall_timeout,
            max_bits: DEFAULT_MAX_BITS,
        }
    }

    /// Cap the bits a single acquisition may request.
    pub fn with_max_bits(mut self, max_bits: usize) -> Self {
        self.max_bits = max_bits;
        self
    }

    pub fn max_bits(&self) -> usize {
        self.max_bits
    }

    /// Device on the serial port named by `config`.
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        let connector = config.serial_connector()?;
        Ok(Self::new(Box::new(connector), config.timings, config.stall_timeout)
            .with_max_bits(config.max_bits))
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read limits using this device's stall timeout and a fresh token.
    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits::new(self.stall_timeout)
    }

    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    /// State without waiting; `None` while another call holds the device.
    pub fn try_state(&self) -> Option<DeviceState> {
        match self.shared.try_lock() {
            Ok(shared) => Some(shared.state),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner().state),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == DeviceState::On
    }

    /// Successful channel opens since the device was created.
    pub fn open_count(&self) -> u64 {
        self.lock().channel.open_count()
    }

    /// Force the hardware off at process start, whatever its prior state.
    ///
    /// Opens the port, sends `off` and closes it again. The software state is
    /// left at [`DeviceState::Standby`]. A failure here should abort startup.
    pub fn boot_probe(&self) -> Result<()> {
        let mut shared = self.lock();
        shared.channel.open()?;
        let sent = shared.channel.write(CMD_OFF);
        shared.channel.close();
        sent?;
        shared.state = DeviceState::Standby;
        Ok(())
    }

    /// Write the diagnostic command and report whether the link is alive.
    ///
    /// A dead or absent link demotes the device to standby. The probe settle
    /// delay is always observed before the lock is released.
    pub fn probe_liveness(&self) -> bool {
        let mut shared = self.lock();
        let alive = shared.channel.is_open() && shared.channel.check(CMD_CHECK);
        if !alive {
            shared.channel.close();
            shared.state = DeviceState::Standby;
        }
        std::thread::sleep(self.timings.probe_settle);
        alive
    }

    /// Power the generator on.
    pub fn initialize(&self) -> Result<Transition> {
        self.probe_liveness();
        let mut shared = self.lock();
        if shared.state == DeviceState::On {
            return Ok(Transition::AlreadyOn);
        }
        self.power_on(&mut shared)?;
        Ok(Transition::Applied)
    }

    /// Power the generator off and release the port.
    pub fn shutdown(&self) -> Result<Transition> {
        self.probe_liveness();
        let mut shared = self.lock();
        if shared.state == DeviceState::Standby {
            return Ok(Transition::AlreadyOff);
        }
        Self::power_off(&mut shared)?;
        Ok(Transition::Applied)
    }

    /// Power-cycle a running generator. Both halves run under one lock hold.
    pub fn restart(&self) -> Result<Transition> {
        self.probe_liveness();
        let mut shared = self.lock();
        if shared.state == DeviceState::Standby {
            return Ok(Transition::AlreadyOff);
        }
        Self::power_off(&mut shared)?;
        self.power_on(&mut shared)?;
        Ok(Transition::Applied)
    }

    fn power_on(&self, shared: &mut Shared) -> Result<()> {
        shared.channel.open()?;
        shared.channel.write(CMD_ON)?;
        shared.channel.discard_input()?;
        std::thread::sleep(self.timings.power_on_settle);
        shared.state = DeviceState::On;
        Ok(())
    }

    fn power_off(shared: &mut Shared) -> Result<()> {
        shared.channel.open()?;
        shared.channel.write(CMD_OFF)?;
        shared.channel.close();
        shared.state = DeviceState::Standby;
        Ok(())
    }

    /// Acquire exactly `total_length` screened bits.
    ///
    /// Fails with [`Error::NotReady`] in standby and with
    /// [`Error::TotalFailure`] when a probe trips the failure detector.
    /// Requests above [`max_bits`](Self::max_bits) are [`Error::InvalidInput`].
    pub fn acquire_bits(&self, total_length: usize, limits: &ReadLimits) -> Result<BitString> {
        if total_length > self.max_bits {
            return Err(Error::InvalidInput(format!(
                "{total_length} bits requested, limit is {}",
                self.max_bits
            )));
        }
        let mut shared = self.lock();
        if shared.state != DeviceState::On {
            return Err(Error::NotReady);
        }
        acquire_from(&mut shared.channel, total_length, limits)
    }

    /// `count` hex numbers of `length` bits each.
    ///
    /// After a detector trip the result holds only the numbers that fit in
    /// the bits collected before it, with `total_failure` set.
    pub fn generate_numbers(
        &self,
        count: usize,
        length: usize,
        limits: &ReadLimits,
    ) -> Result<Generated> {
        let total = generation::requested_bits(count, length)?;
        generation::numbers_from(self.acquire_bits(total, limits), count, length)
    }

    /// Acquire `length` bits and write them to a timestamped file in `dir`.
    pub fn generate_to_file(
        &self,
        length: usize,
        format: FileFormat,
        dir: &Path,
        limits: &ReadLimits,
    ) -> Result<PathBuf> {
        let bits = self.acquire_bits(length, limits)?;
        let path = export::export_path(dir, format);
        export::write_bits(&path, &bits, format)?;
        Ok(path)
    }
}
