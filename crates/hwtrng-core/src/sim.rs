//! In-process stand-in for the serial TRNG.
//!
//! Models the hardware closely enough to drive the device state machine and
//! the acquisition loop without a port: it understands the `on`/`off`/`check`
//! commands, emits bytes only while powered, and can be told to misbehave.
//!
//! Healthy output is drawn from successive random permutations of all 256
//! byte values, so no value repeats more than twice inside any 100-byte
//! window and the failure detector never trips on it.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::channel::{Connector, Transport};

/// Bytes reported available per poll while streaming.
const STREAM_CHUNK: usize = 256;

/// Filler emitted once a simulated generator has failed.
const STUCK_FILLER: u8 = 0xAA;

/// How the simulated generator behaves while powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Well-mixed output.
    Healthy,
    /// Emits one byte value forever.
    Stuck(u8),
    /// Healthy for `healthy_bytes`, then stuck.
    FailAfter { healthy_bytes: usize },
    /// Accepts commands but never produces data.
    Stall,
}

struct SimState {
    behavior: Behavior,
    powered: bool,
    unplugged: bool,
    opens: u64,
    commands: Vec<String>,
    emitted: usize,
    rng: StdRng,
    pool: Vec<u8>,
}

impl SimState {
    fn next_mixed(&mut self) -> u8 {
        if self.pool.is_empty() {
            self.pool = (0..=255u8).collect();
            self.pool.shuffle(&mut self.rng);
        }
        self.pool.pop().unwrap_or(0)
    }

    fn next_byte(&mut self) -> u8 {
        let byte = match self.behavior {
            Behavior::Healthy => self.next_mixed(),
            Behavior::Stuck(value) => value,
            Behavior::FailAfter { healthy_bytes } if self.emitted < healthy_bytes => {
                self.next_mixed()
            }
            Behavior::FailAfter { .. } => STUCK_FILLER,
            Behavior::Stall => 0,
        };
        self.emitted += 1;
        byte
    }
}

/// Handle to a simulated generator. Clones share the same device.
#[derive(Clone)]
pub struct SimulatedTrng {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedTrng {
    pub fn new(behavior: Behavior) -> Self {
        Self::with_rng(behavior, StdRng::from_os_rng())
    }

    /// Reproducible output for a given seed.
    pub fn with_seed(behavior: Behavior, seed: u64) -> Self {
        Self::with_rng(behavior, StdRng::seed_from_u64(seed))
    }

    fn with_rng(behavior: Behavior, rng: StdRng) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SimState {
                behavior,
                powered: false,
                unplugged: false,
                opens: 0,
                commands: Vec::new(),
                emitted: 0,
                rng,
                pool: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A connector for [`SerialChannel`](crate::SerialChannel) or
    /// [`Device`](crate::Device).
    pub fn connector(&self) -> SimConnector {
        SimConnector { sim: self.clone() }
    }

    /// Cut the cable: opens and I/O fail until [`replug`](Self::replug).
    pub fn unplug(&self) {
        let mut s = self.state();
        s.unplugged = true;
        s.powered = false;
    }

    pub fn replug(&self) {
        self.state().unplugged = false;
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        let mut s = self.state();
        s.behavior = behavior;
        s.emitted = 0;
    }

    pub fn open_count(&self) -> u64 {
        self.state().opens
    }

    pub fn is_powered(&self) -> bool {
        self.state().powered
    }

    /// Every command written so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Bytes emitted since the behavior was last set.
    pub fn emitted(&self) -> usize {
        self.state().emitted
    }
}

fn unplugged() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "simulated cable unplugged")
}

/// [`Connector`] for a [`SimulatedTrng`].
#[derive(Clone)]
pub struct SimConnector {
    sim: SimulatedTrng,
}

impl Connector for SimConnector {
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let mut s = self.sim.state();
        if s.unplugged {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "simulated port not present",
            ));
        }
        s.opens += 1;
        Ok(Box::new(SimTransport {
            sim: self.sim.clone(),
        }))
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

struct SimTransport {
    sim: SimulatedTrng,
}

impl Transport for SimTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut s = self.sim.state();
        if s.unplugged {
            return Err(unplugged());
        }
        let command = String::from_utf8_lossy(bytes).into_owned();
        match command.as_str() {
            "on" => s.powered = true,
            "off" => s.powered = false,
            _ => {}
        }
        s.commands.push(command);
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let s = self.sim.state();
        if s.unplugged {
            return Err(unplugged());
        }
        if !s.powered || s.behavior == Behavior::Stall {
            return Ok(0);
        }
        Ok(STREAM_CHUNK)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut s = self.sim.state();
        if s.unplugged {
            return Err(unplugged());
        }
        for byte in buf.iter_mut() {
            *byte = s.next_byte();
        }
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        if self.sim.state().unplugged {
            return Err(unplugged());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_only_while_powered() {
        let sim = SimulatedTrng::with_seed(Behavior::Healthy, 7);
        let mut t = sim.connector().connect().unwrap();
        assert_eq!(t.bytes_available().unwrap(), 0);
        t.write_all(b"on").unwrap();
        assert!(sim.is_powered());
        assert!(t.bytes_available().unwrap() > 0);
        t.write_all(b"off").unwrap();
        assert_eq!(t.bytes_available().unwrap(), 0);
        assert_eq!(sim.commands(), vec!["on", "off"]);
    }

    #[test]
    fn healthy_output_never_repeats_more_than_twice_per_window() {
        let sim = SimulatedTrng::with_seed(Behavior::Healthy, 42);
        let mut t = sim.connector().connect().unwrap();
        t.write_all(b"on").unwrap();
        let mut buf = vec![0u8; 4096];
        t.read_exact(&mut buf).unwrap();
        for window in buf.windows(100) {
            let mut counts = [0u8; 256];
            for &b in window {
                counts[b as usize] += 1;
            }
            assert!(counts.iter().all(|&c| c <= 2));
        }
    }

    #[test]
    fn fail_after_switches_to_filler() {
        let sim = SimulatedTrng::with_seed(Behavior::FailAfter { healthy_bytes: 3 }, 1);
        let mut t = sim.connector().connect().unwrap();
        t.write_all(b"on").unwrap();
        let mut buf = [0u8; 6];
        t.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[3..], &[STUCK_FILLER; 3]);
        assert_eq!(sim.emitted(), 6);
    }

    #[test]
    fn unplugged_link_fails_io_and_connect() {
        let sim = SimulatedTrng::new(Behavior::Healthy);
        let mut t = sim.connector().connect().unwrap();
        sim.unplug();
        assert!(t.write_all(b"check").is_err());
        assert!(sim.connector().connect().is_err());
        sim.replug();
        assert!(sim.connector().connect().is_ok());
        assert_eq!(sim.open_count(), 2);
    }
}
