//! Error taxonomy shared by the channel, device and acquisition layers.
//!
//! The core never logs. Every failure is returned as an [`Error`] and the
//! caller (HTTP layer, CLI) decides how to report it.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::bits::BitString;

/// Result alias used throughout `hwtrng-core`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial transport fault, or use of a closed channel.
    #[error("serial connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// `initialize` on a device that is already on.
    #[error("system already on")]
    AlreadyOn,

    /// `shutdown`/`restart` on a device in standby.
    #[error("system already in standby")]
    AlreadyOff,

    /// Acquisition requested while the device is in standby.
    #[error("system not initialized")]
    NotReady,

    /// The failure detector tripped. `partial` holds every bit appended
    /// before the failing probe.
    #[error("total failure detected after {} bits", partial.len())]
    TotalFailure { partial: BitString },

    /// No byte arrived from the generator within the stall window.
    #[error("generator stalled: no data for {waited:?}")]
    Timeout { waited: Duration },

    /// The acquisition was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("acquisition cancelled")]
    Cancelled,

    /// Malformed binary input to the hex encoder.
    #[error("binary to hexadecimal conversion error: {0}")]
    Encoding(String),

    /// Writing generated data to disk failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Out-of-range arguments or malformed configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub(crate) fn connection(message: impl Into<String>, source: io::Error) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn closed(action: &str) -> Self {
        Self::Connection {
            message: format!("cannot {action}: channel is not open"),
            source: None,
        }
    }

    /// True for the idempotency signals (`AlreadyOn`/`AlreadyOff`), which
    /// callers treat as informational rather than as failures.
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::AlreadyOn | Self::AlreadyOff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_classification() {
        assert!(Error::AlreadyOn.is_no_op());
        assert!(Error::AlreadyOff.is_no_op());
        assert!(!Error::NotReady.is_no_op());
        assert!(!Error::closed("write").is_no_op());
    }

    #[test]
    fn total_failure_reports_salvaged_length() {
        let partial = BitString::from_bytes(&[0xFF, 0x00]);
        let err = Error::TotalFailure { partial };
        assert_eq!(err.to_string(), "total failure detected after 16 bits");
    }
}
