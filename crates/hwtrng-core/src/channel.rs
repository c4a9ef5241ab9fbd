//! The single serial channel to the generator.
//!
//! [`Connector`] opens a link and [`Transport`] is an open link. The
//! [`SerialChannel`] owns at most one transport and maps every transport
//! fault to [`Error::Connection`]. It has no locking of its own: the
//! [`Device`](crate::Device) that owns it holds its mutex around every call.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};

use crate::error::{Error, Result};

/// Polling interval while waiting for generator bytes.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// An open, byte-oriented link to the generator.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Unread bytes currently buffered. Must not block.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Fill `buf` completely. Callers only ask for bytes already reported by
    /// [`bytes_available`](Transport::bytes_available).
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Drop any buffered, unread input.
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Opens transports. One connector lives for the lifetime of a device.
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn Transport>>;

    /// Human-readable link address for error messages.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// serialport backend
// ---------------------------------------------------------------------------

/// Connector for a physical serial port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    io_timeout: Duration,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32, io_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            io_timeout,
        }
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let port = serialport::new(&self.port, self.baud_rate)
            .timeout(self.io_timeout)
            .open()?;
        Ok(Box::new(SerialTransport { port }))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}

struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, bytes)?;
        io::Write::flush(&mut self.port)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        io::Read::read_exact(&mut self.port, buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }
}

// ---------------------------------------------------------------------------
// Cancellation and read limits
// ---------------------------------------------------------------------------

/// Shared flag that aborts an in-flight acquisition.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounds on a blocking read.
#[derive(Debug, Clone)]
pub struct ReadLimits {
    /// Longest wait without receiving a single byte.
    pub stall_timeout: Duration,
    pub cancel: CancelToken,
}

impl ReadLimits {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            stall_timeout,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// The exclusively-owned handle to the generator link, or nothing.
pub struct SerialChannel {
    connector: Box<dyn Connector>,
    handle: Option<Box<dyn Transport>>,
    opened: u64,
}

impl SerialChannel {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            handle: None,
            opened: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of successful opens over the channel's life.
    pub fn open_count(&self) -> u64 {
        self.opened
    }

    /// Open the link. No-op when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let transport = self.connector.connect().map_err(|e| {
            Error::connection(format!("cannot open {}", self.connector.describe()), e)
        })?;
        self.handle = Some(transport);
        self.opened += 1;
        Ok(())
    }

    /// Drop the handle. Later I/O fails with [`Error::Connection`].
    pub fn close(&mut self) {
        self.handle = None;
    }

    fn transport(&mut self, action: &str) -> Result<&mut Box<dyn Transport>> {
        self.handle.as_mut().ok_or_else(|| Error::closed(action))
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport("write")?
            .write_all(bytes)
            .map_err(|e| Error::connection("write failed", e))
    }

    pub fn bytes_available(&mut self) -> Result<usize> {
        self.transport("poll")?
            .bytes_available()
            .map_err(|e| Error::connection("availability check failed", e))
    }

    pub fn discard_input(&mut self) -> Result<()> {
        self.transport("clear input")?
            .clear_input()
            .map_err(|e| Error::connection("input reset failed", e))
    }

    /// Read exactly `n` bytes, waiting for the generator as needed.
    ///
    /// Fails with [`Error::Timeout`] when no byte arrives for
    /// `limits.stall_timeout` and with [`Error::Cancelled`] once the token is
    /// set.
    pub fn read_exact(&mut self, n: usize, limits: &ReadLimits) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        let mut last_progress = Instant::now();
        while filled < n {
            if limits.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let available = self.bytes_available()?;
            if available == 0 {
                let waited = last_progress.elapsed();
                if waited >= limits.stall_timeout {
                    return Err(Error::Timeout { waited });
                }
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }
            let take = available.min(n - filled);
            self.transport("read")?
                .read_exact(&mut buf[filled..filled + take])
                .map_err(|e| Error::connection("read failed", e))?;
            filled += take;
            last_progress = Instant::now();
        }
        Ok(buf)
    }

    /// Send the diagnostic command; true iff the write went through.
    pub(crate) fn check(&mut self, command: &[u8]) -> bool {
        self.write(command).is_ok()
    }
}
